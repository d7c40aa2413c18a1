//! UI layer for desktop GUI: app shell and raffle panel.

pub mod app;

pub use app::RaffleGuiApp;
