//! Supabase Auth (GoTrue) flows.
//!
//! Security model:
//! - URL + anon key are PUBLIC; row-level security and JWTs do the enforcing.
//! - The service_role key is never handled by this crate.
//! - Sessions live in memory on the client; disk persistence is optional and
//!   handled by the `persistence` module.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use rand::RngCore;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::client::{ok_or_backend, SupabaseClient};
use crate::error::{Error, Result};
use crate::query::SelectQuery;
use crate::types::Profile;

/// Fixed administrator identity used for the privileged-routing shortcut.
pub const ADMIN_EMAIL: &str = "seerealthesis@gmail.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenResponseUser {
    id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    token_type: String,
    user: Option<TokenResponseUser>,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        if !self.token_type.eq_ignore_ascii_case("bearer") {
            warn!("unexpected token_type: {}", self.token_type);
        }
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: compute_expires_at(self.expires_in),
            user_id: self.user.as_ref().and_then(|u| u.id.clone()),
            user_email: self.user.and_then(|u| u.email),
        }
    }
}

// Small margin so a token is never presented right at its expiry edge.
fn compute_expires_at(expires_in: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(expires_in.saturating_sub(30).max(0))
}

async fn token_request(
    client: &SupabaseClient,
    grant_type: &str,
    body: serde_json::Value,
) -> Result<AuthSession> {
    let endpoint = format!("{}?grant_type={grant_type}", client.auth_url("token"));
    let resp = client
        .http()
        .post(endpoint)
        .header(
            AUTHORIZATION,
            format!("Bearer {}", client.config().anon_key),
        )
        .json(&body)
        .send()
        .await?;
    let resp = ok_or_backend(resp).await?;
    let tok: TokenResponse = resp.json().await?;
    Ok(tok.into_session())
}

/// Credential sign-in. The session is stored on the client (and persisted
/// when enabled).
pub async fn sign_in_with_password(
    client: &SupabaseClient,
    email: &str,
    password: &str,
) -> Result<AuthSession> {
    let session = token_request(
        client,
        "password",
        json!({ "email": email, "password": password }),
    )
    .await?;
    client.store_session(Some(session.clone())).await;
    debug!("signed in as {:?}", session.user_email);
    Ok(session)
}

/// `grant_type=refresh_token`. The rotated session replaces the stored one
/// immediately so the new refresh token is never lost.
pub async fn refresh_access_token(
    client: &SupabaseClient,
    refresh_token: &str,
) -> Result<AuthSession> {
    let session = token_request(
        client,
        "refresh_token",
        json!({ "refresh_token": refresh_token }),
    )
    .await?;
    client.store_session(Some(session.clone())).await;
    Ok(session)
}

/// Session retrieval: the live session as-is, an expired one refreshed
/// transparently when the client allows it, `None` when signed out.
pub async fn current_session(client: &SupabaseClient) -> Result<Option<AuthSession>> {
    if let Some(session) = client.session_snapshot().await {
        if Utc::now() < session.expires_at {
            return Ok(Some(session));
        }
        if client.options().auto_refresh_token {
            match refresh_access_token(client, &session.refresh_token).await {
                Ok(fresh) => return Ok(Some(fresh)),
                Err(e) => {
                    debug!("stale session could not be refreshed: {e}");
                    client.store_session(None).await;
                }
            }
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, Deserialize)]
struct SignUpResponse {
    // Auto-confirm deployments answer with a full session; deployments that
    // require e-mail confirmation answer with just the user record.
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: Option<TokenResponseUser>,
    id: Option<String>,
    email: Option<String>,
}

/// Registers an account with the display name attached as user metadata.
/// Returns the session when the backend auto-confirms, `None` while e-mail
/// confirmation is pending.
pub async fn sign_up(
    client: &SupabaseClient,
    name: &str,
    email: &str,
    password: &str,
) -> Result<Option<AuthSession>> {
    let body = json!({
        "email": email,
        "password": password,
        "data": { "name": name },
    });
    let resp = client
        .http()
        .post(client.auth_url("signup"))
        .header(
            AUTHORIZATION,
            format!("Bearer {}", client.config().anon_key),
        )
        .json(&body)
        .send()
        .await?;
    let resp = ok_or_backend(resp).await?;
    let out: SignUpResponse = resp.json().await?;

    match (out.access_token, out.refresh_token) {
        (Some(access_token), Some(refresh_token)) => {
            let session = AuthSession {
                access_token,
                refresh_token,
                expires_at: compute_expires_at(out.expires_in.unwrap_or(3600)),
                user_id: out.user.as_ref().and_then(|u| u.id.clone()).or(out.id),
                user_email: out.user.and_then(|u| u.email).or(out.email),
            };
            client.store_session(Some(session.clone())).await;
            Ok(Some(session))
        }
        _ => Ok(None),
    }
}

/// Revokes the session server-side, then clears local state whether or not
/// the revocation call went through.
pub async fn sign_out(client: &SupabaseClient) -> Result<()> {
    let mut result = Ok(());
    if let Some(session) = client.session_snapshot().await {
        result = async {
            let resp = client
                .http()
                .post(client.auth_url("logout"))
                .header(AUTHORIZATION, format!("Bearer {}", session.access_token))
                .send()
                .await?;
            ok_or_backend(resp).await?;
            Ok(())
        }
        .await;
    }
    client.store_session(None).await;
    result
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// `GET /auth/v1/user` with the current access token.
pub async fn fetch_user(client: &SupabaseClient) -> Result<AuthUser> {
    let token = client.valid_access_token().await.ok_or(Error::NotSignedIn)?;
    let resp = client
        .http()
        .get(client.auth_url("user"))
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .send()
        .await?;
    let resp = ok_or_backend(resp).await?;
    Ok(resp.json().await?)
}

/// Own `profiles` row, keyed by the session's user id. Falls back to
/// `/auth/v1/user` when the token endpoint did not echo the user record.
pub async fn fetch_my_profile(client: &SupabaseClient) -> Result<Option<Profile>> {
    let user_id = match client.session_snapshot().await.and_then(|s| s.user_id) {
        Some(id) => id,
        None => fetch_user(client).await?.id,
    };
    SelectQuery::new("profiles")
        .columns("id,email,name,role,points,avatar_url,rfid_uid")
        .eq("id", &user_id)
        .fetch_optional(client)
        .await
}

fn base64url_no_pad(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// RFC 7636 pair: 32 random bytes give a 43-char verifier; challenge is the
/// S256 digest.
fn generate_pkce_pair() -> (String, String) {
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    let verifier = base64url_no_pad(&buf);
    let challenge = base64url_no_pad(&Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

/// A PKCE authorize flow: send the user to `url`, then hand the redirect's
/// `code` together with `verifier` to [`exchange_code`].
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    pub url: String,
    pub verifier: String,
}

/// Provider sign-in. Building the authorize URL is local; the actual
/// authentication happens on the backend after the redirect.
pub fn sign_in_with_oauth(client: &SupabaseClient, provider: &str, redirect_to: &str) -> OAuthFlow {
    let (verifier, challenge) = generate_pkce_pair();
    let url = format!(
        "{}?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256",
        client.auth_url("authorize"),
        urlencoding::encode(provider),
        urlencoding::encode(redirect_to),
        urlencoding::encode(&challenge),
    );
    OAuthFlow { url, verifier }
}

/// Finishes a PKCE flow: exchanges the redirect `code` for a session.
pub async fn exchange_code(
    client: &SupabaseClient,
    code: &str,
    verifier: &str,
) -> Result<AuthSession> {
    let session = token_request(
        client,
        "pkce",
        json!({ "auth_code": code, "code_verifier": verifier }),
    )
    .await?;
    client.store_session(Some(session.clone())).await;
    Ok(session)
}

/// Minimal key lookup over a URL query or fragment component. Handles '+'
/// and %xx escapes, which is all GoTrue emits.
fn url_component_param(component: &str, key: &str) -> Option<String> {
    for part in component.split('&') {
        let mut it = part.splitn(2, '=');
        let Some(k) = it.next() else { continue };
        let v = it.next().unwrap_or("");
        if k == key {
            let v = v.replace('+', "%20");
            return urlencoding::decode(&v).ok().map(|s| s.to_string());
        }
    }
    None
}

/// Pulls an implicit-flow session out of an OAuth redirect URL. GoTrue puts
/// the tokens in the fragment: `#access_token=...&refresh_token=...`.
pub fn parse_redirect_session(url: &str) -> Option<AuthSession> {
    let fragment = url.split_once('#').map(|(_, f)| f)?;
    let access_token = url_component_param(fragment, "access_token")?;
    let refresh_token = url_component_param(fragment, "refresh_token")?;
    let expires_in = url_component_param(fragment, "expires_in")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(3600);
    Some(AuthSession {
        access_token,
        refresh_token,
        expires_at: compute_expires_at(expires_in),
        user_id: None,
        user_email: None,
    })
}

/// Applies [`parse_redirect_session`] and stores the result. A no-op unless
/// the client was built with `detect_session_in_url`.
pub async fn session_from_redirect_url(
    client: &SupabaseClient,
    url: &str,
) -> Option<AuthSession> {
    if !client.options().detect_session_in_url {
        return None;
    }
    let session = parse_redirect_session(url)?;
    client.store_session(Some(session.clone())).await;
    Some(session)
}

/// Post-login landing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingPage {
    AdminDashboard,
    UserDashboard,
}

impl LandingPage {
    pub fn as_path(&self) -> &'static str {
        match self {
            LandingPage::AdminDashboard => "pages/admin/admin-dashboard.html",
            LandingPage::UserDashboard => "pages/user-dashboard.html",
        }
    }
}

/// The administrator e-mail wins outright; the stored profile role is only
/// the fallback.
pub fn landing_for(email: Option<&str>, profile_role: Option<&str>) -> LandingPage {
    if email == Some(ADMIN_EMAIL) {
        return LandingPage::AdminDashboard;
    }
    if profile_role == Some("admin") {
        return LandingPage::AdminDashboard;
    }
    LandingPage::UserDashboard
}

/// Resolves where the signed-in account should land. The profile row is only
/// consulted when the e-mail shortcut does not apply.
pub async fn determine_home(client: &SupabaseClient) -> Result<LandingPage> {
    let user = fetch_user(client).await?;
    if user.email.as_deref() == Some(ADMIN_EMAIL) {
        return Ok(LandingPage::AdminDashboard);
    }
    let role = fetch_my_profile(client).await?.and_then(|p| p.role);
    Ok(landing_for(user.email.as_deref(), role.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_email_wins_regardless_of_stored_role() {
        assert_eq!(
            landing_for(Some(ADMIN_EMAIL), Some("user")),
            LandingPage::AdminDashboard
        );
        assert_eq!(
            landing_for(Some(ADMIN_EMAIL), None),
            LandingPage::AdminDashboard
        );
    }

    #[test]
    fn profile_role_is_the_fallback() {
        assert_eq!(
            landing_for(Some("someone@example.com"), Some("admin")),
            LandingPage::AdminDashboard
        );
        assert_eq!(
            landing_for(Some("someone@example.com"), Some("user")),
            LandingPage::UserDashboard
        );
        assert_eq!(landing_for(None, None), LandingPage::UserDashboard);
    }

    #[test]
    fn landing_paths_match_the_dashboards() {
        assert_eq!(
            LandingPage::AdminDashboard.as_path(),
            "pages/admin/admin-dashboard.html"
        );
        assert_eq!(LandingPage::UserDashboard.as_path(), "pages/user-dashboard.html");
    }

    #[test]
    fn redirect_fragment_yields_a_session() {
        let url = "https://app.test/pages/user-dashboard.html\
                   #access_token=at-1&refresh_token=rt-1&expires_in=7200&token_type=bearer";
        let session = parse_redirect_session(url).unwrap();
        assert_eq!(session.access_token, "at-1");
        assert_eq!(session.refresh_token, "rt-1");
        assert!(session.expires_at > Utc::now() + Duration::seconds(7000));
    }

    #[test]
    fn redirect_without_tokens_is_not_a_session() {
        assert!(parse_redirect_session("https://app.test/index.html").is_none());
        assert!(parse_redirect_session("https://app.test/#error=access_denied").is_none());
        assert!(
            parse_redirect_session("https://app.test/#access_token=at-only").is_none(),
            "refresh token is required"
        );
    }

    #[test]
    fn url_component_param_decodes_escapes() {
        let component = "code=abc%2Fdef&state=a+b";
        assert_eq!(
            url_component_param(component, "code").as_deref(),
            Some("abc/def")
        );
        assert_eq!(
            url_component_param(component, "state").as_deref(),
            Some("a b")
        );
        assert_eq!(url_component_param(component, "missing"), None);
    }

    #[test]
    fn pkce_verifier_has_rfc7636_shape() {
        let (verifier, challenge) = generate_pkce_pair();
        assert_eq!(verifier.len(), 43);
        assert_ne!(verifier, challenge);
        assert!(verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
