//! Subsystem modules for the guruh bot.

pub mod comms;
pub mod memory;
pub mod responder;
pub mod runtime;
