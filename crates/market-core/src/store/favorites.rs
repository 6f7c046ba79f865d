//! ============================================================================
//! Favorite Store - Optimistic favorite toggling
//! ============================================================================
//! A toggle updates the cached list before the request goes out. The entry
//! it touched is remembered; if the request fails that entry alone is put
//! back where it was, leaving concurrent changes to other prompts intact.
//! ============================================================================

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::failure;
use super::sequence::RequestSequence;
use crate::client::{ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::types::{FavoriteCheck, FavoritePrompt, Items};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteState {
    pub favorites: Vec<FavoritePrompt>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl FavoriteState {
    fn contains(&self, prompt_id: i64) -> bool {
        self.favorites.iter().any(|f| f.id == prompt_id)
    }
}

/// Pre-toggle snapshot of one favorite entry
#[derive(Debug, Clone)]
struct OptimisticToggle {
    prompt_id: i64,
    /// The removed entry and its position; None when the toggle added
    original: Option<(usize, FavoritePrompt)>,
}

impl OptimisticToggle {
    /// Apply the toggle to `state` and remember how to undo it
    fn apply(state: &mut FavoriteState, prompt_id: i64) -> Self {
        match state.favorites.iter().position(|f| f.id == prompt_id) {
            Some(index) => {
                let removed = state.favorites.remove(index);
                Self { prompt_id, original: Some((index, removed)) }
            }
            None => {
                state.favorites.push(FavoritePrompt::placeholder(prompt_id));
                Self { prompt_id, original: None }
            }
        }
    }

    fn was_favorited(&self) -> bool {
        self.original.is_some()
    }

    fn rollback(self, state: &mut FavoriteState) {
        match self.original {
            Some((index, entry)) => {
                if !state.contains(self.prompt_id) {
                    let index = index.min(state.favorites.len());
                    state.favorites.insert(index, entry);
                }
            }
            None => state.favorites.retain(|f| f.id != self.prompt_id),
        }
    }
}

pub struct FavoriteStore {
    client: Arc<ApiClient>,
    state: RwLock<FavoriteState>,
    listing: RequestSequence,
}

impl FavoriteStore {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            state: RwLock::new(FavoriteState::default()),
            listing: RequestSequence::new(),
        }
    }

    pub async fn state(&self) -> FavoriteState {
        self.state.read().await.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Drop the cached favorites (sign-out). In-flight listings are discarded.
    pub async fn reset(&self) {
        self.listing.issue();
        *self.state.write().await = FavoriteState::default();
    }

    pub async fn is_favorited(&self, prompt_id: i64) -> bool {
        self.state.read().await.contains(prompt_id)
    }

    /// `GET /favorites`
    pub async fn fetch_favorites(&self) -> Vec<FavoritePrompt> {
        let ticket = self.listing.issue();
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let result = self.client.get::<Items<FavoritePrompt>>("/favorites").await;
        let mut state = self.state.write().await;
        let latest = self.listing.is_latest(ticket);
        match result {
            Ok(response) => {
                if latest {
                    state.favorites = response.items.clone();
                    state.is_loading = false;
                } else {
                    debug!("Discarding superseded favorites listing");
                }
                response.items
            }
            Err(e) => {
                if latest {
                    state.is_loading = false;
                    state.error = Some(failure("Fetch favorites", &e));
                }
                Vec::new()
            }
        }
    }

    /// Flip the favorite state of a prompt. Returns the resulting state;
    /// on failure the cache is rolled back and the previous state returned.
    pub async fn toggle_favorite(&self, prompt_id: i64) -> bool {
        let toggle = {
            let mut state = self.state.write().await;
            state.error = None;
            OptimisticToggle::apply(&mut state, prompt_id)
        };
        let was_favorited = toggle.was_favorited();

        let endpoint = format!("/favorites/{}", prompt_id);
        let options = if was_favorited { RequestOptions::delete() } else { RequestOptions::post(None) };
        let result = self.client.request::<serde_json::Value>(&endpoint, options).await;

        match result {
            Ok(_) => {
                info!(
                    "Prompt {} {} favorites",
                    prompt_id,
                    if was_favorited { "removed from" } else { "added to" }
                );
                if !was_favorited {
                    // replace the placeholder with the full entry
                    self.fetch_favorites().await;
                }
                !was_favorited
            }
            Err(e) => {
                let mut state = self.state.write().await;
                toggle.rollback(&mut state);
                state.error = Some(failure("Toggle favorite", &e));
                warn!("Rolled back favorite toggle for prompt {}", prompt_id);
                was_favorited
            }
        }
    }

    /// `GET /favorites/check/{id}`; the cache is reconciled with the answer
    pub async fn check_favorite(&self, prompt_id: i64) -> bool {
        let endpoint = format!("/favorites/check/{}", prompt_id);
        match self.client.get::<FavoriteCheck>(&endpoint).await {
            Ok(FavoriteCheck { is_favorited }) => {
                let mut state = self.state.write().await;
                match (is_favorited, state.contains(prompt_id)) {
                    (true, false) => state.favorites.push(FavoritePrompt::placeholder(prompt_id)),
                    (false, true) => state.favorites.retain(|f| f.id != prompt_id),
                    _ => {}
                }
                is_favorited
            }
            Err(e) => self.keep_cached(prompt_id, &e).await,
        }
    }

    async fn keep_cached(&self, prompt_id: i64, err: &ApiError) -> bool {
        let mut state = self.state.write().await;
        state.error = Some(failure("Check favorite", err));
        state.contains(prompt_id)
    }
}
