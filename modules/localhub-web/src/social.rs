// Social-login completion: the external auth pipeline calls us after a
// successful third-party login, and we reconcile the account and its profile.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use localhub_store::{Account, Result as StoreResult, Store};

use crate::session;
use crate::AppState;

/// Social-auth providers we resolve avatars for. Anything else fails parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Facebook,
    Twitter,
    GoogleOauth2,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Facebook => "facebook",
            Provider::Twitter => "twitter",
            Provider::GoogleOauth2 => "google-oauth2",
        }
    }
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(Provider::Facebook),
            "twitter" => Ok(Provider::Twitter),
            "google-oauth2" => Ok(Provider::GoogleOauth2),
            _ => Err(()),
        }
    }
}

/// The provider's stable user id, as a string. Providers disagree on whether
/// it arrives as a string or a number.
fn payload_id(payload: &Value) -> Option<String> {
    match payload.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract an avatar URL from the provider's raw profile payload.
/// Returns None when the payload doesn't carry one.
pub fn resolve_avatar(provider: Provider, payload: &Value) -> Option<String> {
    let url = match provider {
        Provider::Facebook => {
            let id = payload_id(payload)?;
            format!("http://graph.facebook.com/{id}/picture?type=large")
        }
        Provider::Twitter => payload
            .get("profile_image_url")
            .and_then(Value::as_str)?
            .replace("_normal", ""),
        Provider::GoogleOauth2 => payload
            .get("image")
            .and_then(|image| image.get("url"))
            .and_then(Value::as_str)?
            .to_string(),
    };

    if url.is_empty() {
        None
    } else {
        Some(url)
    }
}

/// The username the provider reported, with whitespace removed.
pub fn normalized_username(details: &Value) -> Option<String> {
    details
        .get("username")
        .and_then(Value::as_str)
        .map(|u| u.replace(' ', ""))
}

/// Decide whether a freshly created account should yield to another
/// username. Returns the provider-reported username when it normalizes to
/// something different from the created account's; None means keep the
/// created account as-is.
pub fn reconciliation_target(account_username: &str, details: &Value) -> Option<String> {
    let target = normalized_username(details)?;
    if target == account_username {
        None
    } else {
        Some(target)
    }
}

/// Complete a social login for an already-resolved account.
///
/// When the pipeline just created `account` but the provider reports a
/// username that belongs to a pre-existing account, the new duplicate is
/// deleted and the login continues as the pre-existing account. A username
/// with no existing match keeps the created account unchanged.
///
/// Returns the (possibly substituted) account.
pub async fn complete_social_login(
    store: &Store,
    provider: Provider,
    mut account: Account,
    payload: &Value,
    is_new: bool,
    details: &Value,
) -> StoreResult<Account> {
    let avatar = resolve_avatar(provider, payload);

    if is_new {
        if let Some(target) = reconciliation_target(&account.username, details) {
            match store.account_by_username(&target).await? {
                Some(existing) => {
                    store.delete_account(account.id).await?;
                    account = existing;
                }
                None => {
                    debug!(username = %target, "No existing account to reconcile with");
                }
            }
        }
    }

    let profile = store.get_or_create_profile(&account).await?;
    if let Some(url) = &avatar {
        store.set_avatar(profile.id, url).await?;
    }

    if let Some(uid) = payload_id(payload) {
        store
            .link_identity(account.id, provider.as_str(), &uid)
            .await?;
    }

    Ok(account)
}

// --- HTTP carrier ---

#[derive(Deserialize)]
pub struct AuthCompleteRequest {
    provider: String,
    username: String,
    #[serde(default)]
    is_new: bool,
    #[serde(default)]
    details: Value,
    #[serde(default)]
    response: Value,
}

pub async fn api_auth_complete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AuthCompleteRequest>,
) -> Response {
    let Ok(provider) = Provider::from_str(&body.provider) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": format!("Unknown provider: {}", body.provider)})),
        )
            .into_response();
    };

    let account = match state.store.get_or_create_account(&body.username).await {
        Ok(account) => account,
        Err(e) => {
            warn!(error = %e, "Failed to resolve account for social login");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match complete_social_login(
        &state.store,
        provider,
        account,
        &body.response,
        body.is_new,
        &body.details,
    )
    .await
    {
        Ok(account) => {
            let cookie = session::login_cookie(&account.username, &state.config.session_secret);
            (
                StatusCode::OK,
                [(header::SET_COOKIE, cookie)],
                Json(serde_json::json!({
                    "id": account.id,
                    "username": account.username,
                })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to complete social login");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn facebook_avatar_from_id() {
        let payload = json!({"id": "12345"});
        assert_eq!(
            resolve_avatar(Provider::Facebook, &payload),
            Some("http://graph.facebook.com/12345/picture?type=large".to_string())
        );
    }

    #[test]
    fn facebook_numeric_id_works() {
        let payload = json!({"id": 12345});
        assert_eq!(
            resolve_avatar(Provider::Facebook, &payload),
            Some("http://graph.facebook.com/12345/picture?type=large".to_string())
        );
    }

    #[test]
    fn twitter_avatar_strips_normal_suffix() {
        let payload = json!({"profile_image_url": "https://pbs.twimg.com/pic_normal.jpg"});
        assert_eq!(
            resolve_avatar(Provider::Twitter, &payload),
            Some("https://pbs.twimg.com/pic.jpg".to_string())
        );
    }

    #[test]
    fn google_avatar_is_nested() {
        let payload = json!({"image": {"url": "https://lh3.example.com/photo.jpg"}});
        assert_eq!(
            resolve_avatar(Provider::GoogleOauth2, &payload),
            Some("https://lh3.example.com/photo.jpg".to_string())
        );
    }

    #[test]
    fn unresolvable_payload_leaves_avatar_unset() {
        assert_eq!(resolve_avatar(Provider::Facebook, &json!({})), None);
        assert_eq!(resolve_avatar(Provider::Twitter, &json!({})), None);
        assert_eq!(resolve_avatar(Provider::GoogleOauth2, &json!({})), None);
        assert_eq!(
            resolve_avatar(Provider::Twitter, &json!({"profile_image_url": ""})),
            None
        );
    }

    #[test]
    fn provider_parse_is_closed() {
        assert_eq!(Provider::from_str("facebook"), Ok(Provider::Facebook));
        assert_eq!(Provider::from_str("twitter"), Ok(Provider::Twitter));
        assert_eq!(Provider::from_str("google-oauth2"), Ok(Provider::GoogleOauth2));
        assert!(Provider::from_str("github").is_err());
        assert!(Provider::from_str("Facebook").is_err());
    }

    #[test]
    fn username_is_normalized_by_removing_spaces() {
        let details = json!({"username": "Alice Smith"});
        assert_eq!(normalized_username(&details), Some("AliceSmith".to_string()));
        assert_eq!(normalized_username(&json!({})), None);
    }

    #[test]
    fn differing_username_triggers_a_swap() {
        let details = json!({"username": "alice"});
        assert_eq!(
            reconciliation_target("alice_87234", &details),
            Some("alice".to_string())
        );
    }

    #[test]
    fn matching_username_keeps_created_account() {
        // Matches after whitespace removal, so no swap.
        let details = json!({"username": "ali ce"});
        assert_eq!(reconciliation_target("alice", &details), None);
    }

    #[test]
    fn missing_username_keeps_created_account() {
        assert_eq!(reconciliation_target("alice", &json!({})), None);
        assert_eq!(reconciliation_target("alice", &json!({"username": 7})), None);
    }
}
