//! UI/backend events and error modeling for desktop GUI controller.

use client_core::RaffleView;
use shared::{
    domain::RaffleEvent,
    error::{ErrorCode, ErrorContext, ErrorReport},
};

pub enum UiEvent {
    Info(String),
    Connected(String),
    ViewUpdated(RaffleView),
    ContractEvent(RaffleEvent),
    EntrySubmitted(String),
    EntryConfirmed(String),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Wallet,
    Transport,
    Contract,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Initialization,
    StateUpdate,
    EnterRaffle,
}

impl From<ErrorContext> for UiErrorContext {
    fn from(value: ErrorContext) -> Self {
        match value {
            ErrorContext::Initialization => Self::Initialization,
            ErrorContext::StateUpdate => Self::StateUpdate,
            ErrorContext::EnterRaffle => Self::EnterRaffle,
        }
    }
}

pub fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Wallet => "Wallet",
        UiErrorCategory::Transport => "Transport",
        UiErrorCategory::Contract => "Contract",
        UiErrorCategory::Validation => "Validation",
        UiErrorCategory::Unknown => "Unexpected",
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("wallet")
            || message_lower.contains("user rejected")
            || message_lower.contains("user denied")
            || message_lower.contains("account access")
        {
            UiErrorCategory::Wallet
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("provider request failed")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("revert")
            || message_lower.contains("insufficient funds")
            || message_lower.contains("gas")
            || message_lower.contains("execution")
        {
            UiErrorCategory::Contract
        } else if message_lower.contains("invalid")
            || message_lower.contains("malformed")
            || message_lower.contains("not been loaded")
        {
            UiErrorCategory::Validation
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// Uses the client's error code where it settles the category, and falls
    /// back to message inspection for transport-level failures.
    pub fn from_report(report: &ErrorReport) -> Self {
        let context = report.context.into();
        let category = match report.code {
            ErrorCode::ProviderUnavailable
            | ErrorCode::AccountAccessDenied
            | ErrorCode::NotConnected => UiErrorCategory::Wallet,
            ErrorCode::InvalidAmount | ErrorCode::SubmissionInProgress => {
                UiErrorCategory::Validation
            }
            ErrorCode::ReadFailure
            | ErrorCode::SubscriptionFailure
            | ErrorCode::TransactionFailure => {
                return Self::from_message(context, report.to_string());
            }
        };
        Self {
            category,
            context,
            message: report.to_string(),
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
