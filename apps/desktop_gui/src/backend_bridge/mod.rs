//! Bridge between the egui thread and the async raffle client.

pub mod commands;
pub mod runtime;
