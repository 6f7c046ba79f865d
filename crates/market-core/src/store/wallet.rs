//! ============================================================================
//! Wallet Store - Connected wallet address and balance
//! ============================================================================
//! The wallet adapter owns keys and signing. Connecting here means saving
//! the address on the user's profile (through the auth store) and reading
//! its balance. Disconnecting is local only.
//! ============================================================================

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::auth::AuthStore;
use super::failure;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::sol;
use crate::types::WalletBalance;

pub const NO_WALLET: &str = "No wallet connected";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletState {
    pub wallet_address: Option<String>,
    pub balance: Option<f64>,
    pub is_connecting: bool,
    pub error: Option<String>,
}

pub struct WalletStore {
    client: Arc<ApiClient>,
    auth: Arc<AuthStore>,
    state: RwLock<WalletState>,
}

impl WalletStore {
    pub fn new(client: Arc<ApiClient>, auth: Arc<AuthStore>) -> Self {
        Self {
            client,
            auth,
            state: RwLock::new(WalletState::default()),
        }
    }

    pub async fn state(&self) -> WalletState {
        self.state.read().await.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    pub async fn reset(&self) {
        *self.state.write().await = WalletState::default();
    }

    async fn set_error(&self, action: &str, err: &ApiError) {
        let mut state = self.state.write().await;
        state.is_connecting = false;
        state.error = Some(failure(action, err));
    }

    /// Adopt the address saved on the user's profile (after a restore)
    pub async fn sync_from_profile(&self) -> Option<String> {
        let address = self.client.session().user().await.and_then(|u| u.wallet_address)?;
        let mut state = self.state.write().await;
        if state.wallet_address.is_none() {
            state.wallet_address = Some(address);
        }
        state.wallet_address.clone()
    }

    /// Save `address` on the profile, then read its balance
    pub async fn connect_wallet(&self, address: &str) -> bool {
        if !self.save_address(address, "Connect wallet", "Failed to connect wallet").await {
            return false;
        }
        info!("Wallet connected: {}", address);
        self.fetch_balance().await;
        true
    }

    /// Save a new address on the profile without reading the balance
    pub async fn update_wallet_address(&self, address: &str) -> bool {
        self.save_address(address, "Update wallet address", "Failed to update wallet address")
            .await
    }

    async fn save_address(&self, address: &str, action: &str, fallback: &str) -> bool {
        let address = address.trim();
        if let Err(e) = sol::validate_address(address) {
            self.set_error(action, &e).await;
            return false;
        }

        {
            let mut state = self.state.write().await;
            state.is_connecting = true;
            state.error = None;
        }

        if self.auth.update_wallet_address(address).await {
            let mut state = self.state.write().await;
            state.wallet_address = Some(address.to_string());
            state.is_connecting = false;
            true
        } else {
            let message = self.auth.error().await.unwrap_or_else(|| fallback.to_string());
            self.set_error(action, &ApiError::Validation(message)).await;
            false
        }
    }

    /// Forget the wallet locally. Nothing is revoked server-side.
    pub async fn disconnect_wallet(&self) {
        let mut state = self.state.write().await;
        state.wallet_address = None;
        state.balance = None;
        info!("Wallet disconnected");
    }

    /// `GET /wallet/balance?address=...`
    pub async fn fetch_balance(&self) -> Option<f64> {
        let connected = self.state.read().await.wallet_address.clone();
        let Some(address) = connected else {
            self.state.write().await.error = Some(NO_WALLET.to_string());
            return None;
        };

        let query = vec![("address".to_string(), address)];
        match self.client.get_with_query::<WalletBalance>("/wallet/balance", query).await {
            Ok(WalletBalance { balance }) => {
                self.state.write().await.balance = Some(balance);
                Some(balance)
            }
            Err(e) => {
                self.set_error("Fetch balance", &e).await;
                None
            }
        }
    }
}
