//! Local projection of the contract state as shown by the display surface.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, U256};
use chrono::{Local, TimeZone};
use shared::{domain::RaffleState, error::ErrorReport};

use crate::units::Denomination;

const TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Renders unix seconds in `tz`. Out-of-range values fall back to the raw
/// number so the display never goes blank.
pub fn format_timestamp<Tz>(seconds: u64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| tz.timestamp_opt(secs, 0).single())
        .map(|at| at.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| seconds.to_string())
}

pub type TimestampFormatter = Arc<dyn Fn(u64) -> String + Send + Sync>;

pub fn local_timestamp_formatter() -> TimestampFormatter {
    Arc::new(|seconds| format_timestamp(seconds, &Local))
}

/// Formatting policy applied when a raw read is committed to the view.
#[derive(Clone)]
pub struct DisplayOptions {
    pub denomination: Denomination,
    pub timestamp_formatter: TimestampFormatter,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            denomination: crate::units::ETHER,
            timestamp_formatter: local_timestamp_formatter(),
        }
    }
}

impl fmt::Debug for DisplayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayOptions")
            .field("denomination", &self.denomination)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaffleView {
    pub account: Option<Address>,
    pub entrance_fee: Option<String>,
    pub entrance_fee_base_units: Option<U256>,
    pub raffle_state: Option<RaffleState>,
    pub recent_winner: Option<Address>,
    pub last_timestamp: Option<String>,
    pub last_timestamp_seconds: Option<u64>,
    pub error: Option<ErrorReport>,
    pub entry_pending: bool,
}

impl RaffleView {
    pub fn raffle_state_label(&self) -> &'static str {
        self.raffle_state.map(RaffleState::label).unwrap_or("")
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Raw values fetched by one synchronization pass. A field stays `None` when
/// the pass aborted before reaching it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPatch {
    pub entrance_fee: Option<U256>,
    pub raffle_state_code: Option<u8>,
    pub recent_winner: Option<Address>,
    pub last_timestamp: Option<u64>,
}

impl SyncPatch {
    pub fn apply(&self, view: &mut RaffleView, options: &DisplayOptions) {
        if let Some(fee) = self.entrance_fee {
            view.entrance_fee = Some(options.denomination.format(fee));
            view.entrance_fee_base_units = Some(fee);
        }
        if let Some(code) = self.raffle_state_code {
            view.raffle_state = Some(RaffleState::from_code(code));
        }
        if let Some(winner) = self.recent_winner {
            view.recent_winner = Some(winner);
        }
        if let Some(seconds) = self.last_timestamp {
            view.last_timestamp = Some((options.timestamp_formatter)(seconds));
            view.last_timestamp_seconds = Some(seconds);
        }
    }
}
