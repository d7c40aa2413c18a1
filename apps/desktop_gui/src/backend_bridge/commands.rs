//! Backend commands queued from UI to backend worker.

pub enum BackendCommand {
    /// Request wallet access, run the first sync and register listeners.
    Connect,
    Refresh,
    EnterRaffle,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Refresh => "refresh",
            Self::EnterRaffle => "enter_raffle",
        }
    }
}
