//! The command protocol (C6): the sole inter-component message type.
//!
//! Commands double-dispatch: `execute_on_router` resolves a point command to
//! the one `Node` that owns it, `execute_on_store` runs a command that has
//! already arrived at its terminal node against the local `Store`.

pub mod commands;
pub mod wire;

pub use commands::{Command, CommandReply, Update};
pub use wire::{read_frame, write_frame};
