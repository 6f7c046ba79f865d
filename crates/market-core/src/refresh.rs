//! ============================================================================
//! Token Refresh - 401 interception with a single replay
//! ============================================================================
//! A request answered with 401 that has not been retried yet triggers one
//! refresh of the access token and one replay. A failed refresh clears the
//! session and emits `SessionEvent::Expired` with the login redirect; the
//! caller gets the original 401.
//!
//! Concurrent 401s share one refresh: the lock holder refreshes, waiters
//! see the rotated token and replay without refreshing again. Expiry also
//! happens under the lock, so a failed refresh redirects once.
//!
//! Tokens minted for a session that was signed out (or replaced) while the
//! refresh was in flight are dropped; nothing is expired in that case.
//! ============================================================================

use tracing::{debug, info, warn};

use crate::client::{decode, ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::transport::HttpResponse;
use crate::types::{RefreshResponse, TokenPair};

pub const REFRESH_ENDPOINT: &str = "/auth/refresh-token";

impl ApiClient {
    /// Send `options` to `endpoint`, refreshing and replaying once on 401
    pub(crate) async fn execute(&self, endpoint: &str, mut options: RequestOptions) -> Result<HttpResponse, ApiError> {
        loop {
            let token = self.session().access_token().await;
            let response = self.send_once(endpoint, &options, token.clone()).await?;

            let stale = match token {
                Some(token) if response.status == 401 && options.refresh_on_unauthorized && !options.retried => token,
                _ => return Ok(response),
            };

            let original = ApiError::from_response(response.status, &response.body);
            options.retried = true;
            debug!("401 on {}, refreshing access token", endpoint);

            if !self.refresh_after_unauthorized(&stale, options.origin.clone()).await {
                return Err(original);
            }
        }
    }

    /// Refresh unless another request already rotated away from `stale`.
    /// Returns whether the request should be replayed.
    async fn refresh_after_unauthorized(&self, stale: &str, origin: Option<String>) -> bool {
        let _guard = self.refresh_lock.lock().await;

        match self.session().access_token().await {
            Some(current) if current != stale => {
                debug!("Access token already rotated, replaying");
                true
            }
            // signed out, or a concurrent refresh failed and expired the session
            None => false,
            Some(_) => match self.perform_refresh().await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Token refresh failed: {}", e);
                    let origin = origin.or_else(|| self.current_origin());
                    self.session().expire(stale, origin.as_deref()).await;
                    false
                }
            },
        }
    }

    /// Exchange the refresh token for a new access token.
    /// Fails without a network call when no refresh token is held.
    pub async fn refresh_access_token(&self) -> Result<TokenPair, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        self.perform_refresh().await
    }

    async fn perform_refresh(&self) -> Result<TokenPair, ApiError> {
        let refresh_token = self
            .session()
            .refresh_token()
            .await
            .ok_or(ApiError::NotAuthenticated)?;

        let options = RequestOptions::post(None).without_refresh();
        let response = self.send_once(REFRESH_ENDPOINT, &options, Some(refresh_token.clone())).await?;
        let body: RefreshResponse = decode(response)?;

        let tokens = TokenPair {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
        };
        if !self.session().rotate(&refresh_token, tokens.clone()).await {
            return Err(ApiError::NotAuthenticated);
        }
        info!("Access token refreshed");
        Ok(tokens)
    }
}
