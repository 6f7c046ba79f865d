//! ============================================================================
//! Review Store - Per-prompt reviews, the user's own review, permission
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::failure;
use super::review_gate::{PurchaseCheck, ReviewGate};
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::types::Review;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewState {
    /// Reviews by prompt id
    pub prompt_reviews: HashMap<i64, Vec<Review>>,
    pub user_review: Option<Review>,
    pub has_review_permission: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

fn validate_rating(rating: u8) -> Result<(), ApiError> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(ApiError::Validation("Rating must be between 1 and 5".to_string()))
    }
}

fn comment_value(comment: &str) -> serde_json::Value {
    match comment.trim() {
        "" => serde_json::Value::Null,
        text => json!(text),
    }
}

pub struct ReviewStore {
    client: Arc<ApiClient>,
    state: RwLock<ReviewState>,
}

impl ReviewStore {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            state: RwLock::new(ReviewState::default()),
        }
    }

    pub async fn state(&self) -> ReviewState {
        self.state.read().await.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Forget the user's review and purchase verdict along with the cache
    pub async fn reset(&self) {
        *self.state.write().await = ReviewState::default();
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

    pub async fn fetch_prompt_reviews(&self, prompt_id: i64) -> Vec<Review> {
        self.begin().await;
        match self.client.get::<Vec<Review>>(&format!("/reviews/prompt/{}", prompt_id)).await {
            Ok(reviews) => {
                let mut state = self.state.write().await;
                state.prompt_reviews.insert(prompt_id, reviews.clone());
                state.is_loading = false;
                reviews
            }
            Err(e) => {
                self.fail("Fetch reviews", &e).await;
                Vec::new()
            }
        }
    }

    /// The signed-in user's review of a prompt. Any failure means
    /// "no review" and is not reported as an error.
    pub async fn fetch_user_review(&self, prompt_id: i64) -> Option<Review> {
        self.begin().await;
        let review = match self
            .client
            .get::<Option<Review>>(&format!("/reviews/user/me/prompt/{}", prompt_id))
            .await
        {
            Ok(review) => review,
            Err(e) => {
                debug!("No review of prompt {} for current user: {}", prompt_id, e);
                None
            }
        };

        let mut state = self.state.write().await;
        state.user_review = review.clone();
        state.is_loading = false;
        review
    }

    pub async fn create_review(&self, prompt_id: i64, rating: u8, comment: &str) -> Option<Review> {
        if let Err(e) = validate_rating(rating) {
            self.fail("Create review", &e).await;
            return None;
        }

        self.begin().await;
        let body = json!({ "prompt_id": prompt_id, "rating": rating, "comment": comment_value(comment) });
        match self.client.post::<Review, _>("/reviews", &body).await {
            Ok(review) => {
                info!("Created review {} for prompt {}", review.id, prompt_id);
                let mut state = self.state.write().await;
                state.prompt_reviews.entry(prompt_id).or_default().push(review.clone());
                state.user_review = Some(review.clone());
                state.is_loading = false;
                Some(review)
            }
            Err(e) => {
                self.fail("Create review", &e).await;
                None
            }
        }
    }

    /// `PUT /reviews/{id}`; the prompt list and `user_review` are updated together
    pub async fn update_review(&self, review_id: i64, rating: u8, comment: &str) -> Option<Review> {
        if let Err(e) = validate_rating(rating) {
            self.fail("Update review", &e).await;
            return None;
        }

        self.begin().await;
        let body = json!({ "rating": rating, "comment": comment_value(comment) });
        match self.client.put::<Review, _>(&format!("/reviews/{}", review_id), &body).await {
            Ok(review) => {
                let mut state = self.state.write().await;
                if let Some(reviews) = state.prompt_reviews.get_mut(&review.prompt_id) {
                    for cached in reviews.iter_mut().filter(|r| r.id == review_id) {
                        *cached = review.clone();
                    }
                }
                if state.user_review.as_ref().map(|r| r.id) == Some(review_id) {
                    state.user_review = Some(review.clone());
                }
                state.is_loading = false;
                Some(review)
            }
            Err(e) => {
                self.fail("Update review", &e).await;
                None
            }
        }
    }

    pub async fn delete_review(&self, review_id: i64) -> bool {
        self.begin().await;
        match self.client.delete(&format!("/reviews/{}", review_id)).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                if state.user_review.as_ref().map(|r| r.id) == Some(review_id) {
                    state.user_review = None;
                }
                for reviews in state.prompt_reviews.values_mut() {
                    reviews.retain(|r| r.id != review_id);
                }
                state.is_loading = false;
                info!("Deleted review {}", review_id);
                true
            }
            Err(e) => {
                self.fail("Delete review", &e).await;
                false
            }
        }
    }

    /// Ask the API whether the user bought the prompt. A failed check
    /// means no permission, without an error banner.
    pub async fn check_purchase_status(&self, prompt_id: i64) -> bool {
        self.begin().await;
        let purchased = match self
            .client
            .get::<PurchaseCheck>(&format!("/reviews/check-purchase/{}", prompt_id))
            .await
        {
            Ok(check) => check.has_purchased(),
            Err(e) => {
                debug!("Purchase check for prompt {} failed: {}", prompt_id, e);
                false
            }
        };

        let mut state = self.state.write().await;
        state.has_review_permission = purchased;
        state.is_loading = false;
        purchased
    }

    /// Everything the UI needs to decide whether to show the review form
    pub async fn review_gate(&self, prompt_id: i64) -> ReviewGate {
        if !self.client.session().is_authenticated().await {
            self.state.write().await.has_review_permission = false;
            return ReviewGate::SignInRequired;
        }

        let existing = self.fetch_user_review(prompt_id).await;
        let purchased = match existing {
            Some(_) => self.state.read().await.has_review_permission,
            None => self.check_purchase_status(prompt_id).await,
        };
        ReviewGate::derive(true, existing, purchased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{anonymous_client, signed_in_client, StubTransport};
    use crate::transport::Method;

    fn review_json(id: i64, prompt_id: i64, rating: u8) -> serde_json::Value {
        json!({"id": id, "rating": rating, "comment": "ok", "user_id": 1, "prompt_id": prompt_id, "created_at": "2024-05-01T10:00:00"})
    }

    #[tokio::test]
    async fn test_create_review_forbidden_keeps_user_review() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/reviews/user/me/prompt/7", 404, json!({"detail": "Review not found"}));
        stub.on(
            Method::Post,
            "/reviews",
            403,
            json!({"detail": "You must purchase this prompt before reviewing"}),
        );
        let store = ReviewStore::new(signed_in_client(&stub).await);

        store.fetch_user_review(7).await;
        let before = store.state().await.user_review;

        assert!(store.create_review(7, 5, "great").await.is_none());
        let state = store.state().await;
        assert!(state.error.unwrap().contains("purchase"));
        assert_eq!(state.user_review, before);
        assert!(state.prompt_reviews.get(&7).is_none());
    }

    #[tokio::test]
    async fn test_create_review_appends_and_sets_user_review() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/reviews/prompt/7", 200, json!([review_json(1, 7, 4)]));
        stub.on(Method::Post, "/reviews", 201, review_json(2, 7, 5));
        let store = ReviewStore::new(signed_in_client(&stub).await);

        store.fetch_prompt_reviews(7).await;
        let created = store.create_review(7, 5, "great").await.unwrap();

        let state = store.state().await;
        assert_eq!(state.prompt_reviews[&7].len(), 2);
        assert_eq!(state.user_review, Some(created));

        let body: serde_json::Value =
            serde_json::from_str(stub.requests_to(Method::Post, "/reviews")[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"prompt_id": 7, "rating": 5, "comment": "great"}));
    }

    #[tokio::test]
    async fn test_rating_out_of_range_rejected_locally() {
        let stub = StubTransport::new();
        let store = ReviewStore::new(signed_in_client(&stub).await);

        assert!(store.create_review(7, 0, "").await.is_none());
        assert!(store.update_review(1, 6, "").await.is_none());
        assert!(store.state().await.error.unwrap().contains("between 1 and 5"));
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_update_review_replaces_everywhere() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/reviews/prompt/7", 200, json!([review_json(1, 7, 4), review_json(2, 7, 2)]));
        stub.on(Method::Get, "/reviews/user/me/prompt/7", 200, review_json(2, 7, 2));
        stub.on(Method::Put, "/reviews/2", 200, review_json(2, 7, 5));
        let store = ReviewStore::new(signed_in_client(&stub).await);

        store.fetch_prompt_reviews(7).await;
        store.fetch_user_review(7).await;
        store.update_review(2, 5, "better now").await.unwrap();

        let state = store.state().await;
        assert_eq!(state.user_review.unwrap().rating, 5);
        assert_eq!(state.prompt_reviews[&7][1].rating, 5);
        assert_eq!(state.prompt_reviews[&7][0].rating, 4);
    }

    #[tokio::test]
    async fn test_delete_review_removes_everywhere() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/reviews/prompt/7", 200, json!([review_json(1, 7, 4), review_json(2, 7, 2)]));
        stub.on(Method::Get, "/reviews/user/me/prompt/7", 200, review_json(2, 7, 2));
        stub.on_raw(Method::Delete, "/reviews/2", 204, "");
        let store = ReviewStore::new(signed_in_client(&stub).await);

        store.fetch_prompt_reviews(7).await;
        store.fetch_user_review(7).await;
        assert!(store.delete_review(2).await);

        let state = store.state().await;
        assert!(state.user_review.is_none());
        assert_eq!(state.prompt_reviews[&7].len(), 1);
    }

    #[tokio::test]
    async fn test_user_review_failure_is_silent() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/reviews/user/me/prompt/7", 500, json!({"detail": "boom"}));
        let store = ReviewStore::new(signed_in_client(&stub).await);

        assert!(store.fetch_user_review(7).await.is_none());
        assert!(store.state().await.error.is_none());
    }

    #[tokio::test]
    async fn test_purchase_check_sets_permission() {
        let stub = StubTransport::new();
        stub.on_raw(Method::Get, "/reviews/check-purchase/7", 200, "true");
        stub.on(Method::Get, "/reviews/check-purchase/8", 500, json!({}));
        let store = ReviewStore::new(signed_in_client(&stub).await);

        assert!(store.check_purchase_status(7).await);
        assert!(store.state().await.has_review_permission);
        assert!(!store.check_purchase_status(8).await);
        let state = store.state().await;
        assert!(!state.has_review_permission);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_review_gate_states() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/reviews/user/me/prompt/7", 404, json!({}));
        stub.on_raw(Method::Get, "/reviews/check-purchase/7", 200, "false");
        stub.on(Method::Get, "/reviews/user/me/prompt/8", 404, json!({}));
        stub.on_raw(Method::Get, "/reviews/check-purchase/8", 200, "true");
        stub.on(Method::Get, "/reviews/user/me/prompt/9", 200, review_json(3, 9, 4));

        let anonymous = ReviewStore::new(anonymous_client(&stub));
        assert_eq!(anonymous.review_gate(7).await, ReviewGate::SignInRequired);

        let store = ReviewStore::new(signed_in_client(&stub).await);
        assert_eq!(store.review_gate(7).await, ReviewGate::PurchaseRequired);
        assert_eq!(store.review_gate(8).await, ReviewGate::Allowed);
        assert!(matches!(store.review_gate(9).await, ReviewGate::AlreadyReviewed(r) if r.id == 3));
    }
}
