//! ============================================================================
//! Stores - One state container per resource domain
//! ============================================================================
//! Every store owns its cache behind a `tokio::sync::RwLock`, talks to the
//! API only through the shared `ApiClient`, and never lets an error escape:
//! actions return a sentinel (`false`, `None`, empty) and leave the message
//! in the store's `error` field.
//!
//! The session (user + tokens) is owned by `SessionManager`; stores read it
//! through the client.
//! ============================================================================

pub mod auth;
pub mod favorites;
pub mod orders;
pub mod prompts;
pub mod review_gate;
pub mod reviews;
pub mod sequence;
pub mod wallet;

pub use auth::{AuthState, AuthStore};
pub use favorites::{FavoriteState, FavoriteStore};
pub use orders::{OrderState, OrderStore, PaymentOutcome, PollConfig};
pub use prompts::{PromptState, PromptStore};
pub use review_gate::ReviewGate;
pub use reviews::{ReviewState, ReviewStore};
pub use sequence::{RequestSequence, Ticket};
pub use wallet::{WalletState, WalletStore};

use tracing::warn;

use crate::error::ApiError;

/// Log a failed store action and produce the message kept in `error`
pub(crate) fn failure(action: &str, err: &ApiError) -> String {
    warn!("{} failed: {}", action, err);
    err.to_string()
}
