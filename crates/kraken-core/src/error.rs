//! The typed error taxonomy shared by every component in this crate.
//!
//! Following the same shape as a `thiserror` enum with many `#[from]` arms: resolution and
//! construction errors surface synchronously at the call site, while per-task execution errors
//! never flow through here (they become a `TaskStatus` recorded on the graph instead).

use crate::address::resolver::AddressResolutionError;
use crate::address::Address;
use std::sync::PoisonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KrakenError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    AddressResolution(#[from] Box<AddressResolutionError>),

    #[error("project not found: {0}")]
    ProjectNotFound(Address),

    #[error("[{project}] {message}")]
    ProjectLoaderError { project: Address, message: String },

    #[error("{0}")]
    TaskResolution(String),

    #[error("{property} is empty{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    PropertyEmpty {
        property: String,
        message: Option<String>,
    },

    #[error("the value of {property} will be known at a later time")]
    PropertyDeferred { property: String },

    #[error("{property} is finalized")]
    PropertyFinalized { property: String },

    #[error("a member named {name:?} already exists")]
    DuplicateMember { name: String },

    #[error("{}", format_build_error(.failed))]
    Build { failed: Vec<Address> },

    #[error("interrupted")]
    Interrupted,

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("{0}")]
    Other(String),
}

fn format_build_error(failed: &[Address]) -> String {
    if failed.len() == 1 {
        format!("task \"{}\" failed", failed[0])
    } else {
        let mut names: Vec<String> = failed.iter().map(|a| a.to_string()).collect();
        names.sort();
        format!(
            "tasks {} failed",
            names
                .iter()
                .map(|n| format!("\"{n}\""))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl<T> From<PoisonError<T>> for KrakenError {
    fn from(e: PoisonError<T>) -> Self {
        KrakenError::Lock(e.to_string())
    }
}

impl From<AddressResolutionError> for KrakenError {
    fn from(e: AddressResolutionError) -> Self {
        KrakenError::AddressResolution(Box::new(e))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = KrakenError> = std::result::Result<T, E>;
