//! Last-value-wins write coalescing.
//!
//! Slider drags produce far more values than the engine can absorb. A
//! [`WriteCoalescer`] keeps at most one request in flight and at most one
//! value waiting behind it; a newer value replaces the waiting one instead
//! of queueing after it. The final value is always sent.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::transport::{Transport, TransportError};

/// Destination for coalesced values.
#[async_trait]
pub trait WriteSink<T>: Send + Sync {
    async fn send(&self, value: T) -> Result<(), TransportError>;
}

/// Writes one numeric parameter through `/api/param/set`.
pub struct ParamSink {
    transport: Arc<dyn Transport>,
    plugin: String,
    param: String,
}

impl ParamSink {
    pub fn new(transport: Arc<dyn Transport>, plugin: &str, param: &str) -> Self {
        Self {
            transport,
            plugin: plugin.to_string(),
            param: param.to_string(),
        }
    }
}

#[async_trait]
impl WriteSink<f64> for ParamSink {
    async fn send(&self, value: f64) -> Result<(), TransportError> {
        self.transport
            .set_param(&self.plugin, &self.param, value)
            .await
    }
}

/// A drain that hit at least one failed send.
///
/// `error` is the most recent failure. `landed` is true when the last value
/// the drain sent went through, meaning the failure belongs to a value that
/// was already superseded.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DrainError {
    pub error: TransportError,
    pub landed: bool,
}

struct Slot<T> {
    pending: Option<T>,
    busy: bool,
}

/// Serializes writes for one logical channel.
pub struct WriteCoalescer<T> {
    name: String,
    sink: Arc<dyn WriteSink<T>>,
    slot: Mutex<Slot<T>>,
}

impl<T: Send + 'static> WriteCoalescer<T> {
    pub fn new(name: impl Into<String>, sink: Arc<dyn WriteSink<T>>) -> Self {
        Self {
            name: name.into(),
            sink,
            slot: Mutex::new(Slot {
                pending: None,
                busy: false,
            }),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule `value` to be written.
    ///
    /// If a drain is already running, the value replaces whatever was
    /// waiting and this returns `Ok(())` at once. Otherwise this call drives
    /// the drain: it sends until nothing is pending and returns the most
    /// recent send failure, if any. Failed sends are not retried.
    pub async fn enqueue(&self, value: T) -> Result<(), DrainError> {
        {
            let mut slot = self.lock();
            let superseded = slot.pending.replace(value).is_some();
            if slot.busy {
                if superseded {
                    debug!(channel = %self.name, "superseded pending write");
                }
                return Ok(());
            }
            slot.busy = true;
        }
        let mut drain = DrainGuard {
            coalescer: self,
            armed: true,
        };

        let mut last_error = None;
        let mut landed = true;
        loop {
            // busy is cleared under the same lock that observes the empty slot
            let next = {
                let mut slot = self.lock();
                let next = slot.pending.take();
                if next.is_none() {
                    slot.busy = false;
                }
                next
            };
            let Some(next) = next else {
                drain.armed = false;
                break;
            };

            match self.sink.send(next).await {
                Ok(()) => landed = true,
                Err(e) => {
                    warn!(channel = %self.name, error = %e, "coalesced write failed");
                    last_error = Some(e);
                    landed = false;
                }
            }
        }

        match last_error {
            Some(error) => Err(DrainError { error, landed }),
            None => Ok(()),
        }
    }
}

/// Clears the busy flag if the drain future is dropped mid-send.
struct DrainGuard<'a, T: Send + 'static> {
    coalescer: &'a WriteCoalescer<T>,
    armed: bool,
}

impl<T: Send + 'static> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.coalescer.lock().busy = false;
        }
    }
}
