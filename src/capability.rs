//! Plumbing shared by the guarded capability wrappers.

use std::future::Future;
use std::time::Duration;

/// A capability result that always carries a usable value.
///
/// `fallback_reason` is set when the capability failed and the value came
/// from the documented fallback instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Guarded<T> {
    pub value: T,
    pub fallback_reason: Option<String>,
}

impl<T> Guarded<T> {
    /// Value produced by the capability itself
    pub fn ok(value: T) -> Self {
        Self {
            value,
            fallback_reason: None,
        }
    }

    /// Value produced by a fallback
    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            fallback_reason: Some(reason.into()),
        }
    }

    /// Whether the fallback was used.
    pub fn is_degraded(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Run a fallible capability call under a deadline.
///
/// `on_timeout` builds the error reported when the deadline passes first.
pub(crate) async fn call_with_timeout<T, E, F>(
    timeout: Duration,
    call: F,
    on_timeout: impl FnOnce(u64) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(timeout.as_millis() as u64)),
    }
}
