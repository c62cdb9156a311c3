use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use localhub_store::{StoreError, UserUpdate};

use crate::session::{self, UserSession};
use crate::templates::{render_own_profile, render_profile, render_signin, ProfileView};
use crate::AppState;

// --- Activity feed API ---

#[derive(Deserialize)]
pub struct UpdatesQuery {
    user: String,
    date: Option<String>,
}

/// GET /api/updates?user=<username>&date=<rfc3339>
///
/// The cutoff defaults to now; every returned entry is strictly older.
pub async fn api_user_updates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UpdatesQuery>,
) -> Response {
    let cutoff = match &params.date {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(date) => date.with_timezone(&Utc),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "date must be an RFC 3339 timestamp"})),
                )
                    .into_response();
            }
        },
        None => Utc::now(),
    };

    let account = match state.store.require_account(&params.user).await {
        Ok(account) => account,
        Err(StoreError::AccountNotFound(_)) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to look up account");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state.store.user_updates(&account, cutoff).await {
        Ok(updates) => Json(feed_body(&updates)).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to aggregate user updates");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The feed response body: updates under the fixed `last_update` key.
fn feed_body(updates: &[UserUpdate]) -> serde_json::Value {
    serde_json::json!({ "last_update": updates })
}

// --- Pages ---

/// The logged-in user's own profile, with their linked providers.
pub async fn own_profile_page(
    State(state): State<Arc<AppState>>,
    session: UserSession,
) -> Response {
    let account = match state.store.account_by_username(&session.username).await {
        Ok(Some(account)) => account,
        // Session for an account that no longer exists; start over.
        Ok(None) => return Redirect::to("/signin").into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to load account for session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let providers = match state.store.linked_providers(account.id).await {
        Ok(providers) => providers,
        Err(e) => {
            warn!(error = %e, "Failed to load linked providers");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    Html(render_own_profile(&account.username, &providers)).into_response()
}

/// Public profile page for any username. Creates the profile row on first
/// view if the account has none yet.
pub async fn profile_page(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Response {
    let account = match state.store.account_by_username(&username).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, Html("User not found".to_string())).into_response();
        }
        Err(e) => {
            warn!(error = %e, "Failed to look up account");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state.store.get_or_create_profile(&account).await {
        Ok(profile) => {
            let view = ProfileView {
                username: account.username,
                screen_name: profile.screen_name,
                avatar_url: profile.avatar_url,
            };
            Html(render_profile(&view)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to load profile");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn signin_page() -> impl IntoResponse {
    Html(render_signin())
}

/// Clear the session cookie and return to the site root.
pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, session::logout_cookie())],
        Redirect::to("/"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn empty_feed_serializes_under_last_update_key() {
        let body = feed_body(&[]);
        assert_eq!(body.to_string(), r#"{"last_update":[]}"#);
    }

    #[test]
    fn feed_entries_carry_the_editor_nickname() {
        let update = UserUpdate {
            changeset: Uuid::new_v4(),
            created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            username: "alice".to_string(),
            version: 1,
            edit_count: 2,
            locality_id: Some(42),
            nickname: "Alice".to_string(),
        };
        let body = feed_body(&[update]);
        let entries = body["last_update"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["nickname"], "Alice");
        assert_eq!(entries[0]["locality_id"], 42);
    }
}
