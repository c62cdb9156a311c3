// Cookie-backed login sessions. A session token carries the username and an
// expiry, signed with HMAC-SHA256 under the configured secret; nothing is
// stored server-side.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::AppState;

const COOKIE_NAME: &str = "lh_session";
const SESSION_TTL_SECS: i64 = 7 * 24 * 3600; // 7 days

/// A decoded, verified session.
///
/// Token layout is `expiry.signature.username`, dot-separated. The first two
/// segments are digits and hex, so the username — which may itself contain
/// dots — always parses unambiguously as the remainder.
#[derive(Debug, PartialEq)]
pub struct Session {
    pub username: String,
    pub expires_at: i64,
}

impl Session {
    /// Start a session for `username`, expiring after the standard TTL.
    pub fn issue(username: &str) -> Self {
        Self {
            username: username.to_string(),
            expires_at: chrono::Utc::now().timestamp() + SESSION_TTL_SECS,
        }
    }

    fn encode(&self, secret: &str) -> String {
        let sig = signature(&self.username, self.expires_at, secret);
        format!("{}.{sig}.{}", self.expires_at, self.username)
    }

    /// Decode and verify a token. Returns None for malformed, forged, or
    /// expired tokens.
    pub fn decode(token: &str, secret: &str) -> Option<Self> {
        let mut segments = token.splitn(3, '.');
        let expires_at: i64 = segments.next()?.parse().ok()?;
        let sig = segments.next()?;
        let username = segments.next()?;

        let expected = signature(username, expires_at, secret);
        if !constant_time_eq(sig.as_bytes(), expected.as_bytes()) {
            return None;
        }
        if chrono::Utc::now().timestamp() > expires_at {
            return None;
        }

        Some(Self {
            username: username.to_string(),
            expires_at,
        })
    }
}

fn signature(username: &str, expires_at: i64, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(username.as_bytes());
    mac.update(b"\n");
    mac.update(expires_at.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Length-guarded XOR fold; never short-circuits on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .fold(0u8, |diff, (x, y)| diff | (x ^ y))
            == 0
}

// --- Cookie plumbing ---

/// Set-Cookie value establishing a session after login.
/// Release builds add `Secure` so the token never crosses plain HTTP.
pub fn login_cookie(username: &str, secret: &str) -> String {
    let token = Session::issue(username).encode(secret);
    let secure = if cfg!(debug_assertions) { "" } else { "; Secure" };
    format!(
        "{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_TTL_SECS}{secure}"
    )
}

/// Set-Cookie value that discards the session.
pub fn logout_cookie() -> String {
    format!("{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

// --- Extractor ---

/// The logged-in user, for handlers behind a login. A missing or invalid
/// session cookie redirects to /signin instead of rendering the page.
pub struct UserSession {
    pub username: String,
}

impl FromRequestParts<Arc<AppState>> for UserSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|header| cookie_value(header, COOKIE_NAME))
            .and_then(|token| Session::decode(token, &state.config.session_secret))
            .map(|session| UserSession {
                username: session.username,
            })
            .ok_or_else(|| Redirect::to("/signin").into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn issued_token_decodes_to_same_user() {
        let token = Session::issue("alice").encode(SECRET);
        let session = Session::decode(&token, SECRET).unwrap();
        assert_eq!(session.username, "alice");
        assert!(session.expires_at > chrono::Utc::now().timestamp());
    }

    #[test]
    fn username_containing_delimiter_survives() {
        let token = Session::issue("dr.jones").encode(SECRET);
        let session = Session::decode(&token, SECRET).unwrap();
        assert_eq!(session.username, "dr.jones");
    }

    #[test]
    fn forged_username_is_rejected() {
        let token = Session::issue("alice").encode(SECRET);
        let forged = token.replace("alice", "mallory");
        assert_eq!(Session::decode(&forged, SECRET), None);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = Session::issue("alice").encode("other-secret");
        assert_eq!(Session::decode(&token, SECRET), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let stale = Session {
            username: "alice".to_string(),
            expires_at: chrono::Utc::now().timestamp() - 1,
        };
        let token = stale.encode(SECRET);
        assert_eq!(Session::decode(&token, SECRET), None);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert_eq!(Session::decode("", SECRET), None);
        assert_eq!(Session::decode("no-dots-here", SECRET), None);
        assert_eq!(Session::decode("notanumber.aa.alice", SECRET), None);
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        assert_eq!(
            cookie_value("lh_session=tok; theme=dark", "lh_session"),
            Some("tok")
        );
        assert_eq!(
            cookie_value("theme=dark; lh_session=tok", "lh_session"),
            Some("tok")
        );
        assert_eq!(cookie_value("theme=dark", "lh_session"), None);
    }
}
