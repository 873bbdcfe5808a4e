//! stompdeck - control-surface client for a live effects engine
//!
//! The engine is the source of truth. This library decodes its dumps (via
//! `stompproto`), issues best-effort writes, and re-polls until the engine
//! agrees or an attempt budget runs out.
//!
//! - `transport`: `Transport` trait and the reqwest-backed `HttpTransport`
//! - `store`: full-state refresh behind a single reentrancy guard
//! - `coalescer`: last-value-wins write serialization
//! - `confirm`: bounded confirmation polling
//! - `supervisor`: Live/Research background polling
//! - `shadow`: UI state for engine stages absent from the dump
//! - `persist`: last chosen poll mode on disk
//! - `deck`: user actions wiring all of the above together

pub mod coalescer;
pub mod confirm;
pub mod deck;
pub mod error;
pub mod persist;
pub mod shadow;
pub mod store;
pub mod supervisor;
pub mod transport;

pub use coalescer::DrainError;
pub use confirm::{confirm_until, param_equals, preset_is, ConfirmBudget, Confirmation};
pub use deck::{ControlState, Deck, DeckStatus, MoveDirection};
pub use error::{DeckError, Result};
pub use shadow::{ShadowStage, ShadowStore, StageState};
pub use store::{RefreshOutcome, Snapshot, StateStore, UpdateOrigin};
pub use supervisor::{PollMode, StatusStrip, Supervisor};
pub use transport::{HttpTransport, Transport, TransportError};
