//! ============================================================================
//! Prompt Store - Listing, filtering, detail and authoring of prompts
//! ============================================================================
//! Listings are sequenced: when filters change faster than responses
//! arrive, only the most recently issued listing writes the cache.
//! ============================================================================

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::failure;
use super::sequence::RequestSequence;
use crate::client::ApiClient;
use crate::types::{Category, Items, Page, Pagination, Prompt, PromptDraft, PromptFilter};

#[derive(Debug, Clone, PartialEq)]
pub struct PromptState {
    pub prompts: Vec<Prompt>,
    pub featured_prompts: Vec<Prompt>,
    pub current_prompt: Option<Prompt>,
    pub categories: Vec<Category>,
    pub filters: PromptFilter,
    pub pagination: Pagination,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl PromptState {
    fn initial(page_size: u32) -> Self {
        Self {
            prompts: Vec::new(),
            featured_prompts: Vec::new(),
            current_prompt: None,
            categories: Vec::new(),
            filters: PromptFilter {
                page: Some(1),
                page_size: Some(page_size),
                ..Default::default()
            },
            pagination: Pagination::initial(page_size),
            is_loading: false,
            error: None,
        }
    }

    /// Replace `prompt` wherever it is cached
    fn replace(&mut self, prompt: &Prompt) {
        for cached in self.prompts.iter_mut().chain(self.featured_prompts.iter_mut()) {
            if cached.id == prompt.id {
                *cached = prompt.clone();
            }
        }
        if self.current_prompt.as_ref().map(|p| p.id) == Some(prompt.id) {
            self.current_prompt = Some(prompt.clone());
        }
    }
}

pub struct PromptStore {
    client: Arc<ApiClient>,
    state: RwLock<PromptState>,
    listing: RequestSequence,
    page_size: u32,
}

impl PromptStore {
    pub fn new(client: Arc<ApiClient>, page_size: u32) -> Self {
        Self {
            client,
            state: RwLock::new(PromptState::initial(page_size)),
            listing: RequestSequence::new(),
            page_size,
        }
    }

    pub async fn state(&self) -> PromptState {
        self.state.read().await.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    async fn begin(&self) {
        let mut state = self.state.write().await;
        state.is_loading = true;
        state.error = None;
    }

    async fn fail(&self, action: &str, err: &crate::error::ApiError) {
        let mut state = self.state.write().await;
        state.is_loading = false;
        state.error = Some(failure(action, err));
    }

    /// Overlay `filters` onto the stored filters without fetching
    pub async fn set_filters(&self, filters: PromptFilter) {
        self.state.write().await.filters.merge(&filters);
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// `GET /prompts` with the given filters. Replaces the list cache and
    /// pagination unless a newer listing was issued meanwhile. On failure
    /// returns an empty page.
    pub async fn get_filtered_prompts(&self, filters: PromptFilter) -> Page<Prompt> {
        let ticket = self.listing.issue();
        self.begin().await;

        let query = filters.to_query(self.page_size);
        let result = self.client.get_with_query::<Page<Prompt>>("/prompts", query).await;

        let mut state = self.state.write().await;
        let latest = self.listing.is_latest(ticket);
        match result {
            Ok(page) => {
                if latest {
                    state.prompts = page.items.clone();
                    state.pagination = Pagination::from_page(&page);
                    state.filters.merge(&filters);
                    state.is_loading = false;
                } else {
                    debug!("Discarding superseded prompt listing ({} items)", page.items.len());
                }
                page
            }
            Err(e) => {
                if latest {
                    state.is_loading = false;
                    state.error = Some(failure("Fetch prompts", &e));
                }
                Page::empty(filters.page_size.unwrap_or(self.page_size))
            }
        }
    }

    /// First page, optionally restricted to one category
    pub async fn fetch_prompts(&self, category_id: Option<i64>) -> Vec<Prompt> {
        self.get_filtered_prompts(PromptFilter {
            category_id,
            page: Some(1),
            page_size: Some(self.page_size),
            ..Default::default()
        })
        .await
        .items
    }

    pub async fn search_prompts(&self, query: &str) -> Vec<Prompt> {
        self.get_filtered_prompts(PromptFilter {
            search: Some(query.to_string()),
            page: Some(1),
            page_size: Some(self.page_size),
            ..Default::default()
        })
        .await
        .items
    }

    pub async fn fetch_featured_prompts(&self) -> Vec<Prompt> {
        self.begin().await;
        let query = vec![("featured".to_string(), "true".to_string())];
        match self.client.get_with_query::<Items<Prompt>>("/prompts", query).await {
            Ok(response) => {
                let mut state = self.state.write().await;
                state.featured_prompts = response.items.clone();
                state.is_loading = false;
                response.items
            }
            Err(e) => {
                self.fail("Fetch featured prompts", &e).await;
                Vec::new()
            }
        }
    }

    pub async fn fetch_categories(&self) -> Vec<Category> {
        self.begin().await;
        match self.client.get::<Vec<Category>>("/categories").await {
            Ok(categories) => {
                let mut state = self.state.write().await;
                state.categories = categories.clone();
                state.is_loading = false;
                categories
            }
            Err(e) => {
                self.fail("Fetch categories", &e).await;
                Vec::new()
            }
        }
    }

    // ========================================================================
    // Detail & authoring
    // ========================================================================

    /// `GET /prompts/{id}`. Not-found yields None without an error.
    pub async fn fetch_prompt_by_id(&self, id: i64) -> Option<Prompt> {
        self.begin().await;
        match self.client.get::<Prompt>(&format!("/prompts/{}", id)).await {
            Ok(prompt) => {
                let mut state = self.state.write().await;
                state.current_prompt = Some(prompt.clone());
                state.is_loading = false;
                Some(prompt)
            }
            Err(e) if e.is_not_found() => {
                debug!("Prompt {} not found", id);
                let mut state = self.state.write().await;
                state.current_prompt = None;
                state.is_loading = false;
                None
            }
            Err(e) => {
                self.fail("Fetch prompt", &e).await;
                None
            }
        }
    }

    pub async fn create_prompt(&self, draft: PromptDraft) -> Option<Prompt> {
        self.begin().await;
        match self.client.post::<Prompt, _>("/prompts", &draft).await {
            Ok(prompt) => {
                info!("Created prompt {} ({})", prompt.id, prompt.title);
                let mut state = self.state.write().await;
                state.prompts.insert(0, prompt.clone());
                state.is_loading = false;
                Some(prompt)
            }
            Err(e) => {
                self.fail("Create prompt", &e).await;
                None
            }
        }
    }

    /// `PATCH /prompts/{id}`; list, featured and detail caches are updated together
    pub async fn update_prompt(&self, id: i64, draft: PromptDraft) -> Option<Prompt> {
        self.begin().await;
        match self.client.patch::<Prompt, _>(&format!("/prompts/{}", id), &draft).await {
            Ok(prompt) => {
                let mut state = self.state.write().await;
                state.replace(&prompt);
                state.is_loading = false;
                Some(prompt)
            }
            Err(e) => {
                self.fail("Update prompt", &e).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{anonymous_client, prompt_json, query_param, signed_in_client, StubTransport};
    use crate::transport::Method;
    use serde_json::json;
    use std::time::Duration;

    /// Stub listing that honours category_id / page like the real API
    fn filtering_stub() -> Arc<StubTransport> {
        let stub = StubTransport::new();
        stub.on_fn(Method::Get, "/prompts", |req| {
            let category: i64 = query_param(req, "category_id").and_then(|c| c.parse().ok()).unwrap_or(1);
            let page: u32 = query_param(req, "page").and_then(|p| p.parse().ok()).unwrap_or(1);
            let first = i64::from(page) * 10;
            (
                200,
                json!({
                    "items": [prompt_json(first, category), prompt_json(first + 1, category)],
                    "total": 30,
                    "page": page,
                    "page_size": 12,
                    "total_pages": 3
                }),
            )
        });
        stub
    }

    #[tokio::test]
    async fn test_filtered_listing_honours_filters() {
        let stub = filtering_stub();
        let store = PromptStore::new(anonymous_client(&stub), 12);

        let page = store
            .get_filtered_prompts(PromptFilter {
                category_id: Some(3),
                page: Some(2),
                ..Default::default()
            })
            .await;
        assert_eq!(page.items.len(), 2);

        let state = store.state().await;
        assert_eq!(state.pagination.page, 2);
        assert!(state.prompts.iter().all(|p| p.category_id() == Some(3)));
        assert_eq!(state.filters.category_id, Some(3));
        assert_eq!(state.filters.page_size, Some(12));

        let sent = &stub.requests()[0];
        assert_eq!(query_param(sent, "category_id").as_deref(), Some("3"));
        assert_eq!(query_param(sent, "page").as_deref(), Some("2"));
        assert_eq!(query_param(sent, "page_size").as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_failed_listing_returns_empty_page() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/prompts", 500, json!({"detail": "down"}));
        let store = PromptStore::new(anonymous_client(&stub), 12);

        let page = store.get_filtered_prompts(PromptFilter::default()).await;
        assert_eq!(page, Page::empty(12));
        let state = store.state().await;
        assert!(state.error.unwrap().contains("down"));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_superseded_listing_is_discarded() {
        let stub = filtering_stub();
        stub.delay_when(
            Method::Get,
            "/prompts",
            |req| query_param(req, "category_id").as_deref() == Some("1"),
            Duration::from_millis(80),
        );
        let store = PromptStore::new(anonymous_client(&stub), 12);

        let (slow, fast) = tokio::join!(store.fetch_prompts(Some(1)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.fetch_prompts(Some(2)).await
        });

        // each caller still receives its own data
        assert!(slow.iter().all(|p| p.category_id() == Some(1)));
        assert!(fast.iter().all(|p| p.category_id() == Some(2)));

        let state = store.state().await;
        assert!(state.prompts.iter().all(|p| p.category_id() == Some(2)));
        assert_eq!(state.filters.category_id, Some(2));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_search_sends_trimmed_query() {
        let stub = filtering_stub();
        let store = PromptStore::new(anonymous_client(&stub), 12);

        store.search_prompts(" cold email ").await;
        assert_eq!(query_param(&stub.requests()[0], "search").as_deref(), Some("cold email"));
    }

    #[tokio::test]
    async fn test_featured_prompts() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/prompts", 200, json!({"items": [prompt_json(1, 2)]}));
        let store = PromptStore::new(anonymous_client(&stub), 12);

        assert_eq!(store.fetch_featured_prompts().await.len(), 1);
        assert_eq!(query_param(&stub.requests()[0], "featured").as_deref(), Some("true"));
        assert_eq!(store.state().await.featured_prompts.len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_not_found_is_not_an_error() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/prompts/99", 404, json!({"detail": "Prompt not found"}));
        let store = PromptStore::new(anonymous_client(&stub), 12);

        assert!(store.fetch_prompt_by_id(99).await.is_none());
        let state = store.state().await;
        assert!(state.current_prompt.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_list_and_detail() {
        let stub = filtering_stub();
        stub.on(Method::Get, "/prompts/10", 200, prompt_json(10, 3));
        let mut updated = prompt_json(10, 3);
        updated["title"] = json!("Renamed");
        stub.on(Method::Patch, "/prompts/10", 200, updated);
        let store = PromptStore::new(signed_in_client(&stub).await, 12);

        store.fetch_prompts(Some(3)).await;
        store.fetch_prompt_by_id(10).await;
        let draft = PromptDraft { title: Some("Renamed".into()), ..Default::default() };
        assert!(store.update_prompt(10, draft).await.is_some());

        let state = store.state().await;
        assert_eq!(state.current_prompt.unwrap().title, "Renamed");
        assert_eq!(state.prompts.iter().find(|p| p.id == 10).unwrap().title, "Renamed");

        let patch = &stub.requests_to(Method::Patch, "/prompts/10")[0];
        assert_eq!(patch.body.as_deref(), Some(r#"{"title":"Renamed"}"#));
    }

    #[tokio::test]
    async fn test_create_prepends() {
        let stub = filtering_stub();
        stub.on(Method::Post, "/prompts", 201, prompt_json(77, 3));
        let store = PromptStore::new(signed_in_client(&stub).await, 12);

        store.fetch_prompts(None).await;
        store.create_prompt(PromptDraft { title: Some("New".into()), ..Default::default() }).await;
        assert_eq!(store.state().await.prompts[0].id, 77);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_cache() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/prompts/10", 200, prompt_json(10, 3));
        stub.on(Method::Patch, "/prompts/10", 403, json!({"detail": "Not the seller"}));
        let store = PromptStore::new(signed_in_client(&stub).await, 12);

        store.fetch_prompt_by_id(10).await;
        assert!(store.update_prompt(10, PromptDraft::default()).await.is_none());
        let state = store.state().await;
        assert_eq!(state.current_prompt.unwrap().title, "Prompt 10");
        assert!(state.error.unwrap().contains("Not the seller"));
    }

    #[tokio::test]
    async fn test_set_filters_merges() {
        let store = PromptStore::new(anonymous_client(&StubTransport::new()), 12);
        store.set_filters(PromptFilter { sort: Some("price:asc".into()), ..Default::default() }).await;
        let filters = store.state().await.filters;
        assert_eq!(filters.sort.as_deref(), Some("price:asc"));
        assert_eq!(filters.page, Some(1));
    }

    #[tokio::test]
    async fn test_categories_cached() {
        let stub = StubTransport::new();
        stub.on(Method::Get, "/categories", 200, json!([{"id": 3, "name": "Marketing", "slug": "marketing"}]));
        let store = PromptStore::new(anonymous_client(&stub), 12);

        assert_eq!(store.fetch_categories().await.len(), 1);
        assert_eq!(store.state().await.categories[0].slug.as_deref(), Some("marketing"));
    }
}
