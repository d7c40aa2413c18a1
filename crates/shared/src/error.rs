use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ContractField;

pub const PROVIDER_UNAVAILABLE_MESSAGE: &str = "Please install a wallet provider!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProviderUnavailable,
    AccountAccessDenied,
    ReadFailure,
    SubscriptionFailure,
    TransactionFailure,
    NotConnected,
    SubmissionInProgress,
    InvalidAmount,
}

#[derive(Debug, Error)]
pub enum RaffleError {
    #[error("Please install a wallet provider!")]
    ProviderUnavailable,
    #[error("account access denied: {0}")]
    AccountAccessDenied(String),
    #[error("failed to read {field}: {message}")]
    ReadFailure {
        field: ContractField,
        message: String,
    },
    #[error("failed to subscribe to contract events: {0}")]
    SubscriptionFailure(String),
    #[error("{0}")]
    TransactionFailure(String),
    #[error("wallet not connected; initialize the client first")]
    NotConnected,
    #[error("an entry transaction is already pending")]
    SubmissionInProgress,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

impl RaffleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ProviderUnavailable => ErrorCode::ProviderUnavailable,
            Self::AccountAccessDenied(_) => ErrorCode::AccountAccessDenied,
            Self::ReadFailure { .. } => ErrorCode::ReadFailure,
            Self::SubscriptionFailure(_) => ErrorCode::SubscriptionFailure,
            Self::TransactionFailure(_) => ErrorCode::TransactionFailure,
            Self::NotConnected => ErrorCode::NotConnected,
            Self::SubmissionInProgress => ErrorCode::SubmissionInProgress,
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
        }
    }
}

/// Operation during which an error was observed; drives the banner prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorContext {
    Initialization,
    StateUpdate,
    EnterRaffle,
}

impl ErrorContext {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Initialization => "Initialization error",
            Self::StateUpdate => "Contract state update error",
            Self::EnterRaffle => "Enter raffle error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub context: ErrorContext,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, context: ErrorContext, message: impl Into<String>) -> Self {
        Self {
            code,
            context,
            message: message.into(),
        }
    }

    pub fn from_error(context: ErrorContext, err: &RaffleError) -> Self {
        Self::new(err.code(), context, err.to_string())
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == ErrorCode::ProviderUnavailable {
            return f.write_str(&self.message);
        }
        write!(f, "{}: {}", self.context.prefix(), self.message)
    }
}
