//! Slash command registration and handlers

pub mod record;
