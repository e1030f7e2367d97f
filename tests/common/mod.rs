//! In-process fake portal for integration tests.
//!
//! Mirrors the flow the HTTP driver speaks: cookie session on the sign-in
//! page, login form POST, access-code form POST, and a JSON data endpoint
//! that answers with whatever program the session's code unlocked.

#![allow(dead_code)]

use axum::Router;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const USER: &str = "patient@example.com";
pub const PASS: &str = "correct horse";
pub const DATA_PATH: &str = "/api/v4/plus/episode/episode_with_video_urls";
pub const EPISODES_PATH: &str = "/api/v4/plus/episodes/";

const SIGN_IN_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<form id="patient-signin-form" action="/sign_in" method="post">
  <input type="hidden" name="authenticity_token" value="csrf-abc">
  <input type="text" name="patient[username]">
  <input type="password" name="patient[password]">
  <input type="submit" value="Sign In">
</form>
</body></html>"#;

const ACCESS_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<form id="program-access-token" action="/register_token" method="post">
  <input type="hidden" name="authenticity_token" value="csrf-def">
  <input type="text" name="token">
  <input type="submit" name="verify_access_code" value="Verify Access Code">
</form>
</body></html>"#;

#[derive(Debug, Clone)]
pub struct FakeProgram {
    pub program_id: u64,
    pub episode_id: u64,
    pub name: String,
    pub exercises: usize,
}

impl FakeProgram {
    pub fn new(program_id: u64, episode_id: u64, name: &str, exercises: usize) -> Self {
        Self {
            program_id,
            episode_id,
            name: name.to_string(),
            exercises,
        }
    }

    fn body(&self) -> serde_json::Value {
        let exercises: Vec<_> = (1..=self.exercises)
            .map(|i| {
                json!({
                    "name": format!("{} exercise {}", self.name, i),
                    "description": format!("<p>Step {}</p>", i),
                    "note": "",
                    "min_sets": 2,
                    "min_reps": 10,
                    "program_exercise_attributes": [
                        { "type": "sets", "value": 3 },
                        { "type": "hold", "value": "5 seconds" }
                    ]
                })
            })
            .collect();
        json!({
            "episode": { "id": self.episode_id, "name": self.name },
            "program": {
                "id": self.program_id,
                "name": format!("{} program", self.name),
                "program_exercises": exercises
            }
        })
    }
}

/// How the portal tells the client which episode a redeemed code unlocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EpisodeHint {
    /// A bootstrap script on the page the code lands on.
    #[default]
    PageScript,
    /// A query parameter on an intermediate redirect only.
    RedirectQuery,
    /// Nowhere; the client has to ask the episodes listing.
    EpisodesListing,
}

#[derive(Debug, Default)]
struct SessionData {
    logged_in: bool,
    program: Option<FakeProgram>,
}

#[derive(Debug, Default)]
struct PortalState {
    next_sid: u64,
    sessions: HashMap<u64, SessionData>,
    codes: HashMap<String, FakeProgram>,
    /// Every session gets the first program any session redeemed.
    sticky: bool,
    first_bound: Option<FakeProgram>,
    logins: usize,
    redeemed: usize,
    /// Codes that send the client to a verification page.
    verify_codes: HashSet<String>,
    /// Send successful logins to the same port on another host name.
    offsite_login: bool,
    hint: EpisodeHint,
    listings: usize,
}

/// Shared handle to the fake portal's state.
#[derive(Debug, Clone, Default)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(self, code: &str, program: FakeProgram) -> Self {
        self.lock().codes.insert(code.to_string(), program);
        self
    }

    /// Reproduce the portal binding later sessions to an earlier program.
    pub fn sticky(self) -> Self {
        self.lock().sticky = true;
        self
    }

    pub fn with_verify_code(self, code: &str) -> Self {
        self.lock().verify_codes.insert(code.to_string());
        self
    }

    pub fn offsite_login(self) -> Self {
        self.lock().offsite_login = true;
        self
    }

    /// Anything but the page script also makes the data endpoint demand the
    /// matching `episode_id`.
    pub fn episode_hint(self, hint: EpisodeHint) -> Self {
        self.lock().hint = hint;
        self
    }

    /// Requests to the episodes listing.
    pub fn listings(&self) -> usize {
        self.lock().listings
    }

    /// Successful logins, one per session.
    pub fn logins(&self) -> usize {
        self.lock().logins
    }

    /// Distinct sessions that saw a cookie.
    pub fn sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn redeemed(&self) -> usize {
        self.lock().redeemed
    }

    fn lock(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/sign_in", get(sign_in_page).post(sign_in))
            .route("/access_token", get(access_page))
            .route("/register_token", axum::routing::post(register_token))
            .route("/home", get(home))
            .route("/activate", get(activate))
            .route("/dashboard", get(dashboard))
            .route("/verify_access_code", get(verify_page))
            .route(EPISODES_PATH, get(episodes))
            .route(DATA_PATH, get(data))
            .with_state(self.clone())
    }

    /// Serve on an ephemeral port and return the base URL.
    pub async fn spawn(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

fn session_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix("sid="))
        .find_map(|id| id.parse().ok())
}

async fn sign_in_page(State(portal): State<FakePortal>, headers: HeaderMap) -> Response {
    let mut guard = portal.lock();
    let state = &mut *guard;
    if session_id(&headers).is_some_and(|id| state.sessions.contains_key(&id)) {
        return Html(SIGN_IN_PAGE).into_response();
    }
    state.next_sid += 1;
    let sid = state.next_sid;
    state.sessions.insert(sid, SessionData::default());
    (
        [(header::SET_COOKIE, format!("sid={}; Path=/; HttpOnly", sid))],
        Html(SIGN_IN_PAGE),
    )
        .into_response()
}

async fn sign_in(
    State(portal): State<FakePortal>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut guard = portal.lock();
    let state = &mut *guard;
    let valid = form.get("patient[username]").map(String::as_str) == Some(USER)
        && form.get("patient[password]").map(String::as_str) == Some(PASS)
        && form.contains_key("authenticity_token");
    let session = match session_id(&headers) {
        Some(id) => state.sessions.get_mut(&id),
        None => None,
    };
    match session {
        Some(session) if valid => {
            session.logged_in = true;
            state.logins += 1;
            if state.offsite_login {
                let port = headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .and_then(|h| h.rsplit(':').next())
                    .unwrap_or("80");
                return Redirect::to(&format!("http://127.0.0.1:{}/home", port)).into_response();
            }
            Redirect::to("/home").into_response()
        }
        _ => Html(SIGN_IN_PAGE).into_response(),
    }
}

async fn access_page(State(portal): State<FakePortal>, headers: HeaderMap) -> Response {
    let state = portal.lock();
    let logged_in = session_id(&headers)
        .and_then(|id| state.sessions.get(&id))
        .is_some_and(|s| s.logged_in);
    if logged_in {
        Html(ACCESS_PAGE).into_response()
    } else {
        Redirect::to("/sign_in").into_response()
    }
}

async fn register_token(
    State(portal): State<FakePortal>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut guard = portal.lock();
    let state = &mut *guard;
    let session = match session_id(&headers) {
        Some(id) => state.sessions.get_mut(&id),
        None => None,
    };
    let Some(session) = session.filter(|s| s.logged_in) else {
        return Redirect::to("/sign_in").into_response();
    };
    let code = form.get("token").cloned().unwrap_or_default();
    if state.verify_codes.contains(&code) {
        return Redirect::to("/verify_access_code").into_response();
    }
    let program = state.codes.get(&code);
    let Some(program) = program else {
        return Redirect::to("/access_token").into_response();
    };

    let bound = match (&state.first_bound, state.sticky) {
        (Some(first), true) => first.clone(),
        _ => program.clone(),
    };
    if state.first_bound.is_none() {
        state.first_bound = Some(bound.clone());
    }
    let episode_id = bound.episode_id;
    session.program = Some(bound);
    state.redeemed += 1;
    match state.hint {
        EpisodeHint::PageScript => Redirect::to("/home").into_response(),
        EpisodeHint::RedirectQuery => {
            Redirect::to(&format!("/activate?episode_id={}", episode_id)).into_response()
        }
        EpisodeHint::EpisodesListing => Redirect::to("/dashboard").into_response(),
    }
}

async fn activate() -> Response {
    Redirect::to("/dashboard").into_response()
}

async fn dashboard() -> Response {
    Html("<html><body>Your program is ready</body></html>").into_response()
}

async fn verify_page() -> Response {
    Html("<html><body>Please verify your access code</body></html>").into_response()
}

async fn episodes(State(portal): State<FakePortal>, headers: HeaderMap) -> Response {
    let mut guard = portal.lock();
    let state = &mut *guard;
    state.listings += 1;
    let program = session_id(&headers)
        .and_then(|id| state.sessions.get(&id))
        .and_then(|s| s.program.as_ref());
    let listed: Vec<_> = program
        .map(|p| json!({ "id": p.episode_id, "name": p.name }))
        .into_iter()
        .collect();
    axum::Json(json!({ "episodes": listed })).into_response()
}

async fn home(State(portal): State<FakePortal>, headers: HeaderMap) -> Response {
    let state = portal.lock();
    let program = session_id(&headers)
        .and_then(|id| state.sessions.get(&id))
        .and_then(|s| s.program.as_ref());
    match program {
        Some(p) => Html(format!(
            r#"<html><body><div id="app"></div><script>window.bootstrap = {{"episode_id": {}}};</script></body></html>"#,
            p.episode_id
        ))
        .into_response(),
        None => Html("<html><body>Welcome</body></html>".to_string()).into_response(),
    }
}

async fn data(
    State(portal): State<FakePortal>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let state = portal.lock();
    let program = session_id(&headers)
        .and_then(|id| state.sessions.get(&id))
        .and_then(|s| s.program.as_ref());
    let requested = query.get("episode_id").and_then(|id| id.parse::<u64>().ok());
    match program {
        Some(p) if state.hint != EpisodeHint::PageScript && requested != Some(p.episode_id) => {
            (StatusCode::NOT_FOUND, "episode_id required").into_response()
        }
        Some(p) => axum::Json(p.body()).into_response(),
        None => (StatusCode::NOT_FOUND, "no program").into_response(),
    }
}
