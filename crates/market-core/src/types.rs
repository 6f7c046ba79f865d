//! ============================================================================
//! Core Types for the Prompt Market Client
//! ============================================================================
//! Wire shapes of the marketplace REST API: users, prompts, categories,
//! orders, payments, reviews, favorites and wallet lookups.
//! ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Users
// ============================================================================

/// Account role. The API has used both casings over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    #[serde(alias = "USER")]
    User,
    #[serde(alias = "SELLER")]
    Seller,
    #[serde(alias = "ADMIN")]
    Admin,
}

/// Profile of the signed-in user. Owned by the session; other stores
/// only read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// Fields for `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterFields {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// Partial profile update for `PATCH /users/me`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.full_name.is_none()
    }
}

/// Response of login / register
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Response of `POST /auth/refresh-token`
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Access + refresh credential pair
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

// ============================================================================
// Prompts & Categories
// ============================================================================

/// How a prompt is paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    #[default]
    Fiat,
    Sol,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Fiat => "fiat",
            PaymentType::Sol => "sol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerRef {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Category listing entry from `GET /categories`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt_count: Option<u64>,
}

/// A prompt template listed on the marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Hidden by the API until purchased
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub views_count: u64,
    #[serde(default)]
    pub sales_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_favorited: Option<bool>,
    #[serde(default)]
    pub payment_type: Option<PaymentType>,
    #[serde(default)]
    pub sol_price: Option<f64>,
    #[serde(default)]
    pub preview_result: Option<String>,
    #[serde(default)]
    pub seller_id: Option<i64>,
    #[serde(default)]
    pub seller: Option<SellerRef>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
}

fn default_true() -> bool {
    true
}

impl Prompt {
    /// Category id from either the flat field or the embedded category
    pub fn category_id(&self) -> Option<i64> {
        self.category_id.or_else(|| self.category.as_ref().map(|c| c.id))
    }

    /// Seller id from either the flat field or the embedded seller
    pub fn seller_id(&self) -> Option<i64> {
        self.seller_id.or_else(|| self.seller.as_ref().map(|s| s.id))
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type.unwrap_or_default()
    }
}

/// Create / update payload for prompts. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<PaymentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sol_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Filters for the prompt listing. Unset fields are omitted from the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptFilter {
    pub search: Option<String>,
    pub category_id: Option<i64>,
    /// "field:direction", e.g. "price:asc"
    pub sort: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub featured: Option<bool>,
}

impl PromptFilter {
    /// Overlay every set field of `other` onto `self`
    pub fn merge(&mut self, other: &PromptFilter) {
        if other.search.is_some() {
            self.search = other.search.clone();
        }
        if other.category_id.is_some() {
            self.category_id = other.category_id;
        }
        if other.sort.is_some() {
            self.sort = other.sort.clone();
        }
        if other.min_price.is_some() {
            self.min_price = other.min_price;
        }
        if other.max_price.is_some() {
            self.max_price = other.max_price;
        }
        if other.page.is_some() {
            self.page = other.page;
        }
        if other.page_size.is_some() {
            self.page_size = other.page_size;
        }
        if other.featured.is_some() {
            self.featured = other.featured;
        }
    }

    /// Query parameters in the order the API documents them.
    /// `page` and `page_size` are always present.
    pub fn to_query(&self, default_page_size: u32) -> Vec<(String, String)> {
        let mut query = Vec::new();

        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            query.push(("search".to_string(), search.trim().to_string()));
        }
        if let Some(category_id) = self.category_id {
            query.push(("category_id".to_string(), category_id.to_string()));
        }
        if let Some(sort) = self.sort.as_deref().filter(|s| !s.is_empty()) {
            let (sort_by, sort_order) = match sort.split_once(':') {
                Some((by, order)) => (by, order),
                None => (sort, "desc"),
            };
            query.push(("sort_by".to_string(), sort_by.to_string()));
            query.push(("sort_order".to_string(), sort_order.to_string()));
        }
        if let Some(min) = self.min_price {
            query.push(("min_price".to_string(), min.to_string()));
        }
        if let Some(max) = self.max_price {
            query.push(("max_price".to_string(), max.to_string()));
        }
        if let Some(true) = self.featured {
            query.push(("featured".to_string(), "true".to_string()));
        }
        query.push(("page".to_string(), self.page.unwrap_or(1).max(1).to_string()));
        query.push((
            "page_size".to_string(),
            self.page_size.unwrap_or(default_page_size).to_string(),
        ));

        query
    }
}

/// Paginated list envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total_pages: u32,
}

fn first_page() -> u32 {
    1
}

impl<T> Page<T> {
    pub fn empty(page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            page_size,
            total_pages: 0,
        }
    }
}

/// Unpaginated `{ items: [...] }` envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Items<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Pagination metadata kept by list stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl Pagination {
    pub fn initial(page_size: u32) -> Self {
        Self {
            total: 0,
            page: 1,
            page_size,
            total_pages: 0,
        }
    }

    pub fn from_page<T>(page: &Page<T>) -> Self {
        Self {
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

// ============================================================================
// Orders & Payments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "amount")]
    pub total_amount: f64,
    pub prompt_id: i64,
    #[serde(default)]
    pub prompt_title: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<PaymentType>,
    #[serde(default)]
    pub sol_amount: Option<f64>,
}

/// Payload for `POST /orders`
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub prompt_id: i64,
    pub amount: f64,
    pub payment_type: PaymentType,
    pub sol_amount: f64,
}

impl NewOrder {
    /// Order for a prompt at its listed price
    pub fn for_prompt(prompt: &Prompt) -> Self {
        Self {
            prompt_id: prompt.id,
            amount: prompt.price,
            payment_type: prompt.payment_type(),
            sol_amount: prompt.sol_price.unwrap_or(0.0),
        }
    }
}

/// Card / bank payment record
#[derive(Debug, Clone, Serialize)]
pub struct FiatPayment {
    pub method: String,
    /// JSON-encoded details blob, passed through to the API
    pub payment_details: String,
}

/// On-chain payment record. `blockchain_tx_id` is the signature the wallet
/// adapter returned after submitting the transfer.
#[derive(Debug, Clone, Serialize)]
pub struct SolPayment {
    pub method: String,
    pub wallet_address: String,
    pub blockchain_tx_id: String,
}

impl SolPayment {
    pub fn new(wallet_address: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            method: "sol".to_string(),
            wallet_address: wallet_address.into(),
            blockchain_tx_id: signature.into(),
        }
    }
}

/// Body of `POST /orders/{id}/payments`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PaymentRequest {
    Fiat(FiatPayment),
    Sol(SolPayment),
}

/// Payment as acknowledged by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub blockchain_tx_id: Option<String>,
}

// ============================================================================
// Reviews
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    pub user_id: i64,
    pub prompt_id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub user_username: Option<String>,
    #[serde(default)]
    pub user_full_name: Option<String>,
}

// ============================================================================
// Favorites
// ============================================================================

/// A favorited prompt. `id` is the prompt id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoritePrompt {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_true")]
    pub is_favorited: bool,
}

impl FavoritePrompt {
    /// Local stand-in until the favorites list is refetched
    pub fn placeholder(prompt_id: i64) -> Self {
        Self {
            id: prompt_id,
            title: String::new(),
            description: String::new(),
            price: 0.0,
            is_favorited: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteCheck {
    pub is_favorited: bool,
}

// ============================================================================
// Wallet
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WalletBalance {
    pub balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletAddressResponse {
    #[serde(default)]
    pub wallet_address: Option<String>,
}
