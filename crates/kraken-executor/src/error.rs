//! Errors specific to driving a graph to completion; everything upstream (address parsing,
//! property access, graph construction) surfaces as [`kraken_core::KrakenError`] instead.

use kraken_core::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Core(#[from] kraken_core::KrakenError),

    #[error("task {0} was interrupted")]
    Interrupted(Address),

    #[error("worker pool is shut down")]
    PoolShutdown,

    #[error("build did not complete: one or more tasks failed or were never reached")]
    Incomplete,
}

pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
