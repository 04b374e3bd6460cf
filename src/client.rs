//! The shared backend client handle.
//!
//! One `SupabaseClient` exists per process (see [`crate::state::AppState`]).
//! It owns the HTTP client with the fixed `apikey` / `x-client-info` headers,
//! the resolved config, and the in-memory auth session slot.

use chrono::Utc;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::RwLock;

use crate::auth::{self, AuthSession};
use crate::config::SupabaseConfig;
use crate::error::{Error, Result};
use crate::persistence;

/// Construction options, mirroring the browser client defaults.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Write the session to disk and restore it on the next start.
    pub persist_session: bool,
    /// Refresh an expired access token transparently from the refresh token.
    pub auto_refresh_token: bool,
    /// Allow turning an OAuth redirect URL carrying tokens into a session.
    pub detect_session_in_url: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
            auto_refresh_token: true,
            detect_session_in_url: true,
        }
    }
}

#[derive(Debug)]
pub struct SupabaseClient {
    http: reqwest::Client,
    config: SupabaseConfig,
    options: ClientOptions,
    session: RwLock<Option<AuthSession>>,
}

impl SupabaseClient {
    /// Builds the underlying HTTP client. A builder failure means the
    /// transport stack itself is unusable, which is fatal and not retried.
    pub fn new(config: SupabaseConfig, options: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(&config.anon_key)
            .map_err(|e| Error::SdkUnavailable(format!("anon key is not a valid header: {e}")))?;
        headers.insert("apikey", apikey);
        headers.insert(
            "x-client-info",
            HeaderValue::from_static(concat!("cereal-client/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::SdkUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            config,
            options,
            session: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.config.base_url())
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.base_url())
    }

    /// Restore a previously persisted session. Best effort; a corrupt or
    /// missing file never blocks construction.
    pub(crate) async fn restore_persisted_session(&self) {
        if !self.options.persist_session {
            return;
        }
        match persistence::load_session() {
            Ok(Some(session)) => {
                debug!("restored persisted session for {:?}", session.user_email);
                *self.session.write().await = Some(session);
            }
            Ok(None) => {}
            Err(e) => warn!("failed to restore persisted session: {e}"),
        }
    }

    /// Replaces the in-memory session and keeps the persisted copy in step.
    /// Persistence failures are logged, never surfaced.
    pub(crate) async fn store_session(&self, session: Option<AuthSession>) {
        if self.options.persist_session {
            let result = match &session {
                Some(s) => persistence::save_session(s),
                None => persistence::clear_session(),
            };
            if let Err(e) = result {
                warn!("failed to persist session change: {e}");
            }
        }
        *self.session.write().await = session;
    }

    pub async fn session_snapshot(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// Valid access token: fast path while the token is live, refresh path
    /// once it expires. A failed refresh clears the session.
    pub(crate) async fn valid_access_token(&self) -> Option<String> {
        let refresh_token = {
            let guard = self.session.read().await;
            match guard.as_ref() {
                Some(s) if Utc::now() < s.expires_at => return Some(s.access_token.clone()),
                Some(s) if self.options.auto_refresh_token => s.refresh_token.clone(),
                _ => return None,
            }
        };
        match auth::refresh_access_token(self, &refresh_token).await {
            Ok(session) => Some(session.access_token),
            Err(e) => {
                warn!("session refresh failed, clearing local session: {e}");
                self.store_session(None).await;
                None
            }
        }
    }

    /// Bearer token for REST calls: the user token when signed in, the anon
    /// key otherwise. Row-level security decides what each may see.
    pub(crate) async fn bearer_token(&self) -> String {
        self.valid_access_token()
            .await
            .unwrap_or_else(|| self.config.anon_key.clone())
    }
}

/// Uniform error contract for delegated calls: non-2xx becomes
/// [`Error::Backend`] with the body preserved verbatim.
pub(crate) async fn ok_or_backend(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let message = resp.text().await.unwrap_or_default();
    Err(Error::Backend { status, message })
}
