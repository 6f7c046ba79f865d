//! ============================================================================
//! Order Store - Orders, payment records and settlement polling
//! ============================================================================
//! Payment status is owned by the API. After recording a payment the
//! client polls the order (`await_payment_status`) instead of trusting the
//! wallet adapter's report.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::failure;
use super::sequence::RequestSequence;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::sol;
use crate::types::{Items, NewOrder, Order, Payment, PaymentRequest, WalletAddressResponse};

pub const NO_SELLER_WALLET: &str = "Seller has not set up a wallet address";

/// How `await_payment_status` polls
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Maximum number of order lookups
    pub max_attempts: u32,
    /// Delay between lookups
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval_ms: 2000,
        }
    }
}

/// Where the API says a payment ended up
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Settled(Order),
    Failed(Order),
    /// No terminal status within the polling budget (may still settle)
    Pending,
}

/// Classify an order's payment status
fn outcome_of(order: &Order) -> Option<PaymentOutcome> {
    let status = order
        .payment_status
        .as_deref()
        .unwrap_or(order.status.as_str())
        .to_ascii_lowercase();
    match status.as_str() {
        "completed" | "paid" => Some(PaymentOutcome::Settled(order.clone())),
        "failed" | "refunded" => Some(PaymentOutcome::Failed(order.clone())),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderState {
    pub orders: Vec<Order>,
    pub current_order: Option<Order>,
    pub last_payment: Option<Payment>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl OrderState {
    fn replace(&mut self, order: &Order) {
        if let Some(cached) = self.orders.iter_mut().find(|o| o.id == order.id) {
            *cached = order.clone();
        }
        self.current_order = Some(order.clone());
    }
}

pub struct OrderStore {
    client: Arc<ApiClient>,
    state: RwLock<OrderState>,
    listing: RequestSequence,
}

impl OrderStore {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            state: RwLock::new(OrderState::default()),
            listing: RequestSequence::new(),
        }
    }

    pub async fn state(&self) -> OrderState {
        self.state.read().await.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Drop every cached order (sign-out). In-flight listings are discarded.
    pub async fn reset(&self) {
        self.listing.issue();
        *self.state.write().await = OrderState::default();
    }

    async fn begin(&self) {
        let mut state = self.state.write().await;
        state.is_loading = true;
        state.error = None;
    }

    async fn fail(&self, action: &str, err: &ApiError) {
        let mut state = self.state.write().await;
        state.is_loading = false;
        state.error = Some(failure(action, err));
    }

    /// `GET /orders` (the signed-in user's orders)
    pub async fn fetch_orders(&self) -> Vec<Order> {
        let ticket = self.listing.issue();
        self.begin().await;

        let result = self.client.get::<Items<Order>>("/orders").await;
        let mut state = self.state.write().await;
        let latest = self.listing.is_latest(ticket);
        match result {
            Ok(response) => {
                if latest {
                    state.orders = response.items.clone();
                    state.is_loading = false;
                } else {
                    debug!("Discarding superseded order listing");
                }
                response.items
            }
            Err(e) => {
                if latest {
                    state.is_loading = false;
                    state.error = Some(failure("Fetch orders", &e));
                }
                Vec::new()
            }
        }
    }

    /// `GET /orders/{id}`. Not-found yields None without an error.
    pub async fn fetch_order_by_id(&self, id: i64) -> Option<Order> {
        self.begin().await;
        match self.client.get::<Order>(&format!("/orders/{}", id)).await {
            Ok(order) => {
                let mut state = self.state.write().await;
                state.replace(&order);
                state.is_loading = false;
                Some(order)
            }
            Err(e) if e.is_not_found() => {
                debug!("Order {} not found", id);
                let mut state = self.state.write().await;
                state.current_order = None;
                state.is_loading = false;
                None
            }
            Err(e) => {
                self.fail("Fetch order", &e).await;
                None
            }
        }
    }

    pub async fn create_order(&self, order: NewOrder) -> Option<Order> {
        self.begin().await;
        match self.client.post::<Order, _>("/orders", &order).await {
            Ok(created) => {
                info!(
                    "Created order {} for prompt {} ({})",
                    created.id,
                    created.prompt_id,
                    order.payment_type.as_str()
                );
                let mut state = self.state.write().await;
                state.orders.insert(0, created.clone());
                state.current_order = Some(created.clone());
                state.is_loading = false;
                Some(created)
            }
            Err(e) => {
                self.fail("Create order", &e).await;
                None
            }
        }
    }

    /// `POST /orders/{id}/payments`. SOL payments must carry a 32-byte
    /// payer address and the 64-byte signature the wallet adapter returned.
    pub async fn record_payment(&self, order_id: i64, payment: PaymentRequest) -> Option<Payment> {
        if let PaymentRequest::Sol(sol_payment) = &payment {
            let checked = sol::validate_address(&sol_payment.wallet_address)
                .and_then(|_| sol::validate_signature(&sol_payment.blockchain_tx_id));
            if let Err(e) = checked {
                self.fail("Record payment", &e).await;
                return None;
            }
        }

        self.begin().await;
        let endpoint = format!("/orders/{}/payments", order_id);
        match self.client.post::<Payment, _>(&endpoint, &payment).await {
            Ok(recorded) => {
                info!("Recorded payment for order {} (status {:?})", order_id, recorded.status);
                let mut state = self.state.write().await;
                state.last_payment = Some(recorded.clone());
                state.is_loading = false;
                Some(recorded)
            }
            Err(e) => {
                self.fail("Record payment", &e).await;
                None
            }
        }
    }

    /// `GET /users/{id}/wallet`: where a SOL purchase must be sent
    pub async fn seller_wallet(&self, seller_id: i64) -> Option<String> {
        self.begin().await;
        let endpoint = format!("/users/{}/wallet", seller_id);
        match self.client.get::<WalletAddressResponse>(&endpoint).await {
            Ok(WalletAddressResponse { wallet_address: Some(address) }) if !address.trim().is_empty() => {
                self.state.write().await.is_loading = false;
                Some(address)
            }
            Ok(_) => {
                self.fail("Seller wallet lookup", &ApiError::Validation(NO_SELLER_WALLET.to_string()))
                    .await;
                None
            }
            Err(e) => {
                self.fail("Seller wallet lookup", &e).await;
                None
            }
        }
    }

    /// Poll the order until the API reports a terminal payment status
    pub async fn await_payment_status(&self, order_id: i64, config: PollConfig) -> PaymentOutcome {
        for attempt in 1..=config.max_attempts.max(1) {
            if let Some(order) = self.fetch_order_by_id(order_id).await {
                if let Some(outcome) = outcome_of(&order) {
                    info!("Order {} payment settled as {:?} after {} polls", order_id, order.payment_status, attempt);
                    return outcome;
                }
                debug!(
                    "Order {} payment still {:?} (poll {}/{})",
                    order_id, order.payment_status, attempt, config.max_attempts
                );
            }
            if attempt < config.max_attempts {
                sleep(Duration::from_millis(config.interval_ms)).await;
            }
        }

        warn!("Order {} payment not settled after {} polls", order_id, config.max_attempts);
        PaymentOutcome::Pending
    }
}
