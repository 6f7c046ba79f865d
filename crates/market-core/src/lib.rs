//! ============================================================================
//! MARKET-CORE: Prompt Market client state
//! ============================================================================
//! Everything between a prompt-marketplace UI and its REST API:
//! - Authenticated fetch client with one-shot token refresh on 401
//! - Session ownership and durable persistence (redb)
//! - Per-resource stores: auth, prompts, orders, favorites, reviews, wallet
//! - Review-permission gate and SOL payment checks
//!
//! Build one `Marketplace` per application instance and share it.
//! ============================================================================

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod marketplace;
pub mod refresh;
pub mod session;
pub mod sol;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use types::*;
pub use client::{ApiClient, RequestOptions};
pub use config::ClientConfig;
pub use db::SessionDb;
pub use error::ApiError;
pub use marketplace::Marketplace;
pub use session::{Session, SessionEvent, SessionManager};
pub use store::{
    AuthStore, FavoriteStore, OrderStore, PaymentOutcome, PollConfig, PromptStore, ReviewGate, ReviewStore,
    WalletStore,
};
pub use transport::{HttpTransport, ReqwestTransport};
