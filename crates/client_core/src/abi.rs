//! Minimal ABI encoding for the raffle contract's fixed interface.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use shared::{
    domain::{RaffleEvent, RaffleEventKind},
    protocol::LogEntry,
};
use thiserror::Error;

pub const ENTER_RAFFLE: &str = "enterRaffle()";

const WORD_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("return data too short: expected {expected} bytes, got {actual}")]
    ShortReturnData { expected: usize, actual: usize },
    #[error("value {0} does not fit in {1}")]
    OutOfRange(U256, &'static str),
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata for a function without arguments.
pub fn encode_call(signature: &str) -> Bytes {
    Bytes::copy_from_slice(&selector(signature))
}

pub fn event_topic(kind: RaffleEventKind) -> B256 {
    keccak256(kind.signature().as_bytes())
}

fn first_word(data: &[u8]) -> Result<U256, AbiError> {
    if data.len() < WORD_LEN {
        return Err(AbiError::ShortReturnData {
            expected: WORD_LEN,
            actual: data.len(),
        });
    }
    Ok(U256::from_be_slice(&data[..WORD_LEN]))
}

pub fn decode_uint256(data: &[u8]) -> Result<U256, AbiError> {
    first_word(data)
}

pub fn decode_uint8(data: &[u8]) -> Result<u8, AbiError> {
    let value = first_word(data)?;
    if value > U256::from(u8::MAX) {
        return Err(AbiError::OutOfRange(value, "uint8"));
    }
    Ok(value.as_limbs()[0] as u8)
}

pub fn decode_u64(data: &[u8]) -> Result<u64, AbiError> {
    let value = first_word(data)?;
    if value > U256::from(u64::MAX) {
        return Err(AbiError::OutOfRange(value, "u64"));
    }
    Ok(value.as_limbs()[0])
}

pub fn decode_address(data: &[u8]) -> Result<Address, AbiError> {
    if data.len() < WORD_LEN {
        return Err(AbiError::ShortReturnData {
            expected: WORD_LEN,
            actual: data.len(),
        });
    }
    Ok(Address::from_slice(&data[WORD_LEN - 20..WORD_LEN]))
}

/// Decodes a raffle event log; the single `address` argument is indexed and
/// therefore carried in `topics[1]`.
pub fn decode_event(log: &LogEntry) -> Option<RaffleEvent> {
    let topic0 = log.topics.first()?;
    let subject = Address::from_word(*log.topics.get(1)?);
    RaffleEventKind::ALL
        .into_iter()
        .find(|kind| event_topic(*kind) == *topic0)
        .map(|kind| match kind {
            RaffleEventKind::EntrantJoined => RaffleEvent::EntrantJoined { player: subject },
            RaffleEventKind::WinnerSelected => RaffleEvent::WinnerSelected { winner: subject },
        })
}
