//! Bounded confirmation polling.
//!
//! After a write, the engine may take a few hundred milliseconds to reflect
//! it in its dump. [`confirm_until`] re-fetches until a predicate holds or
//! the attempt budget runs out. Running out is not an error: the caller
//! shows the last refreshed state and marks it unconfirmed.

use std::future::Future;
use std::time::Duration;
use stompconf::ReconcileConfig;
use stompproto::value::values_match;
use stompproto::Program;
use tracing::debug;

use crate::store::RefreshOutcome;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl ConfirmBudget {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn preset(config: &ReconcileConfig) -> Self {
        Self::new(
            config.preset_attempts,
            Duration::from_millis(config.preset_interval_ms),
        )
    }

    pub fn param(config: &ReconcileConfig) -> Self {
        Self::new(
            config.param_attempts,
            Duration::from_millis(config.param_interval_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { attempts: u32 },
    Unconfirmed { attempts: u32 },
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Confirmation::Confirmed { attempts } | Confirmation::Unconfirmed { attempts } => {
                *attempts
            }
        }
    }
}

/// Poll `fetch` until `predicate` holds on the decoded program.
///
/// Fetch errors and skipped refreshes count as failed attempts. Sleeps
/// `budget.interval` between attempts but not after the last one. A zero
/// budget still makes one attempt.
pub async fn confirm_until<F, Fut, P>(mut fetch: F, predicate: P, budget: ConfirmBudget) -> Confirmation
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RefreshOutcome, TransportError>>,
    P: Fn(&Program) -> bool,
{
    let max_attempts = budget.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match fetch().await {
            Ok(RefreshOutcome::Refreshed(snapshot)) if predicate(&snapshot.program) => {
                return Confirmation::Confirmed { attempts: attempt };
            }
            Ok(RefreshOutcome::Refreshed(_)) => {
                debug!(attempt, max_attempts, "not converged yet");
            }
            Ok(RefreshOutcome::Skipped) => {
                debug!(attempt, max_attempts, "refresh skipped");
            }
            Err(e) => {
                debug!(attempt, max_attempts, error = %e, "confirmation fetch failed");
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(budget.interval).await;
        }
    }

    Confirmation::Unconfirmed {
        attempts: max_attempts,
    }
}

/// The decoded preset name equals `expected`.
pub fn preset_is(expected: &str) -> impl Fn(&Program) -> bool {
    let expected = expected.to_string();
    move |program| program.preset.as_deref() == Some(expected.as_str())
}

/// The decoded value of `plugin.param` matches `expected`.
pub fn param_equals(plugin: &str, param: &str, expected: &str) -> impl Fn(&Program) -> bool {
    let (plugin, param, expected) = (plugin.to_string(), param.to_string(), expected.to_string());
    move |program| {
        program
            .param(&plugin, &param)
            .is_some_and(|observed| values_match(observed, &expected))
    }
}
