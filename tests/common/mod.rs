//! A small stateful stand-in for the Discord REST API.
//!
//! Serves just enough of v10 for the verification flow and records every
//! mutating request so tests can assert on what reached "Discord".

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const GUILD: &str = "g1";
pub const BOT: &str = "bot-1";

/// VIEW | SEND | MANAGE_MESSAGES | ADD_REACTIONS | EMBED | ATTACH | MANAGE_ROLES
pub const BOT_ROLE_PERMISSIONS: &str = "268495936";

/// Messages in the `intro` channel; the one with id 7 is by `alice`.
pub const INTRO_MESSAGES: u64 = 250;

#[derive(Default)]
pub struct Recorded {
    pub members: HashMap<String, Vec<String>>,
    /// Mutations in arrival order, e.g. `PUT role alice member`.
    pub log: Vec<String>,
    pub audit_reasons: Vec<String>,
    pub reaction_paths: Vec<String>,
    pub sent: Vec<(String, Value)>,
    pub history_requests: usize,
    pub authorization: Vec<String>,
    next_id: u64,
}

#[derive(Clone)]
pub struct MockDiscord {
    pub base_url: String,
    pub state: Arc<Mutex<Recorded>>,
}

impl MockDiscord {
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn member_roles(&self, user: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .members
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    /// Poll until `pred` holds on the log or the timeout expires.
    pub async fn wait_for_log(&self, pred: impl Fn(&[String]) -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pred(&self.log()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

type Shared = Arc<Mutex<Recorded>>;

fn record_auth(state: &Shared, headers: &HeaderMap) {
    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.lock().unwrap().authorization.push(v.to_string());
    }
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": format!("Unknown {what}"), "code": 10000})),
    )
        .into_response()
}

async fn current_user(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record_auth(&state, &headers);
    Json(json!({"id": BOT, "username": "gatekeeper", "bot": true})).into_response()
}

async fn guild(Path(guild_id): Path<String>) -> Response {
    match guild_id.as_str() {
        GUILD => Json(json!({
            "id": GUILD,
            "name": "Rust Hideout",
            "owner_id": "owner",
            "roles": [
                {"id": GUILD, "name": "@everyone", "position": 0, "permissions": "1024"},
                {"id": "unverified", "name": "Unverified", "position": 1, "permissions": "0"},
                {"id": "member", "name": "Member", "position": 2, "permissions": "0"},
                {"id": "bot-role", "name": "Gatekeeper", "position": 5, "permissions": BOT_ROLE_PERMISSIONS},
                {"id": "admin", "name": "Admin", "position": 9, "permissions": "8"}
            ]
        }))
        .into_response(),
        "forbidden" => (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "Missing Access", "code": 50001})),
        )
            .into_response(),
        "ratelimited" => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"message": "You are being rate limited.", "retry_after": 1.5, "global": false})),
        )
            .into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        _ => not_found("Guild"),
    }
}

async fn member(
    State(state): State<Shared>,
    Path((_guild_id, user_id)): Path<(String, String)>,
) -> Response {
    let roles = state.lock().unwrap().members.get(&user_id).cloned();
    match roles {
        Some(roles) => Json(json!({
            "user": {"id": user_id, "username": user_id},
            "roles": roles
        }))
        .into_response(),
        None => not_found("Member"),
    }
}

async fn channel(Path(channel_id): Path<String>) -> Response {
    let overwrites = match channel_id.as_str() {
        "verify" => json!([
            {"id": GUILD, "type": 0, "allow": "0", "deny": "2048"},
            {"id": "bot-role", "type": 0, "allow": "2048", "deny": "0"}
        ]),
        "locked" => json!([
            {"id": BOT, "type": 1, "allow": "0", "deny": "1024"}
        ]),
        "welcome" | "intro" | "general" => json!([]),
        _ => return not_found("Channel"),
    };
    Json(json!({
        "id": channel_id,
        "guild_id": GUILD,
        "permission_overwrites": overwrites
    }))
    .into_response()
}

async fn history(
    State(state): State<Shared>,
    Path(channel_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if channel_id != "intro" {
        return Json(json!([])).into_response();
    }
    state.lock().unwrap().history_requests += 1;

    let limit: u64 = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(50);
    let start = query
        .get("before")
        .and_then(|b| b.parse::<u64>().ok())
        .map(|b| b - 1)
        .unwrap_or(INTRO_MESSAGES);

    let page: Vec<Value> = (1..=start)
        .rev()
        .take(limit as usize)
        .map(|id| {
            let author = if id == 7 { "alice" } else { "bob" };
            json!({"id": id.to_string(), "author": {"id": author, "username": author}})
        })
        .collect();
    Json(Value::Array(page)).into_response()
}

async fn send_message(
    State(state): State<Shared>,
    Path(channel_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.next_id += 1;
    let id = format!("new-{}", s.next_id);
    s.log.push(format!("POST message {channel_id}"));
    s.sent.push((channel_id, body));
    Json(json!({"id": id})).into_response()
}

async fn delete_message(
    State(state): State<Shared>,
    Path((channel_id, message_id)): Path<(String, String)>,
) -> Response {
    if message_id == "gone" {
        return not_found("Message");
    }
    state
        .lock()
        .unwrap()
        .log
        .push(format!("DELETE message {channel_id} {message_id}"));
    StatusCode::NO_CONTENT.into_response()
}

async fn add_reaction(
    State(state): State<Shared>,
    Path((_channel_id, message_id, _emoji)): Path<(String, String, String)>,
    uri: Uri,
) -> Response {
    let mut s = state.lock().unwrap();
    s.reaction_paths.push(uri.path().to_string());
    s.log.push(format!("PUT reaction {message_id}"));
    StatusCode::NO_CONTENT.into_response()
}

async fn remove_reaction(
    State(state): State<Shared>,
    Path((_channel_id, message_id, _emoji)): Path<(String, String, String)>,
) -> Response {
    state
        .lock()
        .unwrap()
        .log
        .push(format!("DELETE reaction {message_id}"));
    StatusCode::NO_CONTENT.into_response()
}

fn audit_reason(headers: &HeaderMap) -> String {
    headers
        .get("x-audit-log-reason")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn add_role(
    State(state): State<Shared>,
    Path((_guild_id, user_id, role_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut s = state.lock().unwrap();
    s.audit_reasons.push(audit_reason(&headers));
    s.log.push(format!("PUT role {user_id} {role_id}"));
    let roles = s.members.entry(user_id).or_default();
    if !roles.contains(&role_id) {
        roles.push(role_id);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn remove_role(
    State(state): State<Shared>,
    Path((_guild_id, user_id, role_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut s = state.lock().unwrap();
    s.audit_reasons.push(audit_reason(&headers));
    s.log.push(format!("DELETE role {user_id} {role_id}"));
    if let Some(roles) = s.members.get_mut(&user_id) {
        roles.retain(|r| r != &role_id);
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Start the mock on a random port.
pub async fn start_mock_discord() -> MockDiscord {
    let state: Shared = Arc::new(Mutex::new(Recorded::default()));
    {
        let mut s = state.lock().unwrap();
        s.members.insert(BOT.into(), vec!["bot-role".into()]);
        s.members.insert("alice".into(), vec!["unverified".into()]);
    }

    let app = Router::new()
        .route("/users/@me", get(current_user))
        .route("/guilds/{guild_id}", get(guild))
        .route("/guilds/{guild_id}/members/{user_id}", get(member))
        .route(
            "/guilds/{guild_id}/members/{user_id}/roles/{role_id}",
            put(add_role).delete(remove_role),
        )
        .route("/channels/{channel_id}", get(channel))
        .route(
            "/channels/{channel_id}/messages",
            get(history).post(send_message),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}",
            axum::routing::delete(delete_message),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me",
            put(add_reaction).delete(remove_reaction),
        )
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockDiscord {
        base_url: format!("http://127.0.0.1:{port}"),
        state,
    }
}
