//! Uniform execution policy for store calls

use super::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;

/// Applies the gateway's query timeout to every call
///
/// The deadline is derived per call, independent of any deadline the caller
/// already runs under; whichever elapses first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executor {
    timeout: Duration,
}

impl Executor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `call`, failing with [`StoreError::Timeout`] once the timeout elapses
    pub async fn run<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{operation} timed out after {:?}", self.timeout);
                Err(StoreError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}
