use std::fmt;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RaffleState {
    Open,
    Calculating,
}

impl RaffleState {
    /// Only code `0` means open; every other code is treated as calculating.
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            Self::Open
        } else {
            Self::Calculating
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Calculating => "CALCULATING",
        }
    }
}

impl fmt::Display for RaffleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaffleEventKind {
    EntrantJoined,
    WinnerSelected,
}

impl RaffleEventKind {
    pub const ALL: [RaffleEventKind; 2] = [Self::EntrantJoined, Self::WinnerSelected];

    /// Solidity event signature emitted by the deployed contract.
    pub fn signature(self) -> &'static str {
        match self {
            Self::EntrantJoined => "RaffleEntered(address)",
            Self::WinnerSelected => "WinnerPicked(address)",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::EntrantJoined => "entrant_joined",
            Self::WinnerSelected => "winner_selected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RaffleEvent {
    EntrantJoined { player: Address },
    WinnerSelected { winner: Address },
}

impl RaffleEvent {
    pub fn kind(&self) -> RaffleEventKind {
        match self {
            Self::EntrantJoined { .. } => RaffleEventKind::EntrantJoined,
            Self::WinnerSelected { .. } => RaffleEventKind::WinnerSelected,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            Self::EntrantJoined { player } => *player,
            Self::WinnerSelected { winner } => *winner,
        }
    }
}

impl fmt::Display for RaffleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntrantJoined { player } => write!(f, "{player} entered the raffle!"),
            Self::WinnerSelected { winner } => write!(f, "Winner picked: {winner}"),
        }
    }
}

/// The four read-only contract fields refreshed by every synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractField {
    EntranceFee,
    RaffleState,
    RecentWinner,
    LastTimestamp,
}

impl ContractField {
    pub const ALL: [ContractField; 4] = [
        Self::EntranceFee,
        Self::RaffleState,
        Self::RecentWinner,
        Self::LastTimestamp,
    ];

    pub fn getter(self) -> &'static str {
        match self {
            Self::EntranceFee => "getEntranceFee()",
            Self::RaffleState => "getRaffleState()",
            Self::RecentWinner => "getRecentWinner()",
            Self::LastTimestamp => "getLastTimeStamp()",
        }
    }
}

impl fmt::Display for ContractField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EntranceFee => "entrance fee",
            Self::RaffleState => "raffle state",
            Self::RecentWinner => "recent winner",
            Self::LastTimestamp => "last timestamp",
        };
        f.write_str(name)
    }
}
