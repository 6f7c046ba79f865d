//! Whether the current user may submit a review for a prompt.
//! The API's purchase check is the source of truth; this only derives
//! what the UI shows from it.

use serde::Deserialize;

use crate::types::Review;

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewGate {
    SignInRequired,
    PurchaseRequired,
    AlreadyReviewed(Review),
    Allowed,
}

impl ReviewGate {
    /// Precedence: signed out, then an existing review, then purchase
    pub fn derive(is_authenticated: bool, existing: Option<Review>, has_purchased: bool) -> Self {
        match (is_authenticated, existing) {
            (false, _) => ReviewGate::SignInRequired,
            (true, Some(review)) => ReviewGate::AlreadyReviewed(review),
            (true, None) if !has_purchased => ReviewGate::PurchaseRequired,
            (true, None) => ReviewGate::Allowed,
        }
    }

    /// Show the review form?
    pub fn can_submit(&self) -> bool {
        matches!(self, ReviewGate::Allowed)
    }

    /// Text shown in place of (or above) the form
    pub fn message(&self) -> &'static str {
        match self {
            ReviewGate::SignInRequired => "Sign in to leave a review",
            ReviewGate::PurchaseRequired => "You need to purchase this prompt before you can review it",
            ReviewGate::AlreadyReviewed(_) => "You have already reviewed this prompt",
            ReviewGate::Allowed => "Share your experience with this prompt",
        }
    }
}

/// `GET /reviews/check-purchase/{id}` answers a bare boolean; older API
/// versions wrapped it in an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum PurchaseCheck {
    Flag(bool),
    Object {
        #[serde(alias = "can_review", alias = "purchased")]
        has_purchased: bool,
    },
}

impl PurchaseCheck {
    pub(crate) fn has_purchased(&self) -> bool {
        match self {
            PurchaseCheck::Flag(flag) => *flag,
            PurchaseCheck::Object { has_purchased } => *has_purchased,
        }
    }
}
