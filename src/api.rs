// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! HTTP client for the sync backend.
//!
//! Every request carries the bearer token from [`SessionStore`]. A 401
//! triggers one token refresh shared by all threads that hit it at the same
//! time, after which the original request is retried once.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::ApiConfig;
use crate::error::{SyncError, SyncResult, message_or_fallback};
use crate::models::{AuthSession, CloudStatus, SyncJob, UploadPayload, UploadResults};
use crate::poller::JobStatusSource;
use crate::session::SessionStore;
use crate::utils::http_client;

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<UploadResults>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadResponse {
    pub success: bool,
    /// Left untyped so the structural guard can run before decoding.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullSyncResults {
    #[serde(default)]
    pub upload: Option<UploadResults>,
    #[serde(default)]
    pub download: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullSyncResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<FullSyncResults>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub status: Option<CloudStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JobResponse {
    success: bool,
    #[serde(default)]
    job: Option<SyncJob>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    user: Option<Value>,
    #[serde(default)]
    session: Option<WireSession>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// The remote side of a sync, as seen by the orchestrator.
pub trait RemoteApi {
    fn upload(&self, payload: &UploadPayload) -> SyncResult<UploadResponse>;
    fn download(&self) -> SyncResult<DownloadResponse>;
    fn full_sync(&self, payload: &UploadPayload) -> SyncResult<FullSyncResponse>;
    fn status(&self) -> SyncResult<StatusResponse>;
}

impl<T: RemoteApi + ?Sized> RemoteApi for Arc<T> {
    fn upload(&self, payload: &UploadPayload) -> SyncResult<UploadResponse> {
        (**self).upload(payload)
    }
    fn download(&self) -> SyncResult<DownloadResponse> {
        (**self).download()
    }
    fn full_sync(&self, payload: &UploadPayload) -> SyncResult<FullSyncResponse> {
        (**self).full_sync(payload)
    }
    fn status(&self) -> SyncResult<StatusResponse> {
        (**self).status()
    }
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: bool,
    generation: u64,
    outcome: Option<Result<String, String>>,
}

/// Single-flight coordination for token refresh: one caller performs the
/// refresh, everyone arriving meanwhile waits for and shares its outcome.
#[derive(Debug, Default)]
pub struct RefreshGate {
    state: Mutex<GateState>,
    done: Condvar,
}

impl RefreshGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `already_fresh` is checked under the gate lock so a caller that lost
    /// the race to a finished refresh reuses its token instead of starting
    /// another one.
    pub fn run<C, F>(&self, already_fresh: C, refresh: F) -> SyncResult<String>
    where
        C: FnOnce() -> Option<String>,
        F: FnOnce() -> SyncResult<String>,
    {
        let mut st = self.lock();
        if st.in_flight {
            let generation = st.generation;
            while st.in_flight && st.generation == generation {
                st = self.done.wait(st).unwrap_or_else(|e| e.into_inner());
            }
            return match st.outcome.clone() {
                Some(Ok(token)) => Ok(token),
                Some(Err(msg)) => Err(SyncError::Auth(msg)),
                None => Err(SyncError::Auth("token refresh did not complete".into())),
            };
        }
        if let Some(token) = already_fresh() {
            return Ok(token);
        }
        st.in_flight = true;
        drop(st);

        let result = refresh();

        let mut st = self.lock();
        st.in_flight = false;
        st.generation += 1;
        st.outcome = Some(match &result {
            Ok(token) => Ok(token.clone()),
            Err(e) => Err(e.to_string()),
        });
        self.done.notify_all();
        result
    }
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Arc<SessionStore>,
    refresh: RefreshGate,
}

impl ApiClient {
    pub fn new(cfg: &ApiConfig, session: Arc<SessionStore>) -> SyncResult<Self> {
        Ok(Self {
            http: http_client(cfg.request_timeout())?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            session,
            refresh: RefreshGate::default(),
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> SyncResult<Response> {
        let mut req = self.http.request(method.clone(), self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send()?)
    }

    /// Authenticated request with the refresh-and-retry-once behaviour.
    fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<T> {
        let used = self.session.token();
        debug!("{} {}", method, path);
        let resp = self.send_once(&method, path, body, used.as_deref())?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return decode(resp);
        }

        let original = error_message(resp);
        warn!("{} {} unauthorized, refreshing session", method, path);
        let token = self
            .refresh
            .run(
                || self.session.token().filter(|t| Some(t) != used.as_ref()),
                || self.refresh_session(),
            )
            .map_err(|e| {
                debug!("refresh failed: {}", e);
                SyncError::Auth(original.clone())
            })?;

        let resp = self.send_once(&method, path, body, Some(&token))?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth(error_message(resp)));
        }
        decode(resp)
    }

    /// POSTs the stored refresh token. Any failure clears the session.
    fn refresh_session(&self) -> SyncResult<String> {
        let result = self.try_refresh();
        if result.is_err() {
            warn!("token refresh failed, clearing session");
            self.session.clear()?;
        }
        result
    }

    fn try_refresh(&self) -> SyncResult<String> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| SyncError::Auth("no refresh token stored".into()))?;
        let body = json!({ "refresh_token": refresh_token });
        let resp = self.send_once(&Method::POST, "/auth/refresh", Some(&body), None)?;
        if !resp.status().is_success() {
            return Err(SyncError::Auth(error_message(resp)));
        }
        let auth: AuthResponse = resp.json()?;
        let session = auth.session.ok_or_else(|| {
            SyncError::Auth(message_or_fallback(auth.message.as_deref()))
        })?;
        let token = session.access_token.clone();
        self.session
            .update_tokens(session.access_token, session.refresh_token, session.expires_at)?;
        info!("session refreshed");
        Ok(token)
    }

    fn public_post(&self, path: &str, body: &Value) -> SyncResult<AuthResponse> {
        let resp = self.send_once(&Method::POST, path, Some(body), None)?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth(error_message(resp)));
        }
        decode(resp)
    }

    fn establish(&self, email: &str, auth: AuthResponse) -> SyncResult<AuthSession> {
        let wire = auth.session.ok_or_else(|| {
            SyncError::Auth(message_or_fallback(auth.message.as_deref()))
        })?;
        let id = auth
            .user
            .as_ref()
            .and_then(|u| u.get("id"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let session = AuthSession {
            id,
            email: email.trim().to_string(),
            token: wire.access_token,
            refresh_token: wire.refresh_token,
            expires_at: wire.expires_at,
        };
        self.session.save(session.clone())?;
        self.session.set_last_email(email)?;
        Ok(session)
    }

    pub fn login(&self, email: &str, password: &str) -> SyncResult<AuthSession> {
        let auth = self.public_post(
            "/auth/login",
            &json!({ "email": email.trim(), "password": password }),
        )?;
        self.establish(email, auth)
    }

    pub fn register(&self, email: &str, password: &str) -> SyncResult<Option<AuthSession>> {
        let auth = self.public_post(
            "/auth/register",
            &json!({ "email": email.trim(), "password": password }),
        )?;
        // some backends require email confirmation and return no session
        if auth.session.is_none() {
            return Ok(None);
        }
        self.establish(email, auth).map(Some)
    }

    pub fn forgot_password(&self, email: &str) -> SyncResult<String> {
        let auth = self.public_post("/auth/forgot-password", &json!({ "email": email.trim() }))?;
        Ok(message_or_fallback(auth.message.as_deref()))
    }

    pub fn logout(&self) -> SyncResult<()> {
        self.session.clear()
    }

    pub fn get_job(&self, job_id: &str) -> SyncResult<SyncJob> {
        let resp: JobResponse = self.request(Method::GET, &format!("/jobs/{}/status", job_id), None)?;
        match (resp.success, resp.job) {
            (true, Some(job)) => Ok(job),
            (_, _) => Err(SyncError::Rejected(message_or_fallback(resp.message.as_deref()))),
        }
    }
}

impl RemoteApi for ApiClient {
    fn upload(&self, payload: &UploadPayload) -> SyncResult<UploadResponse> {
        let body = serde_json::to_value(payload)?;
        self.request(Method::POST, "/api/sync/upload", Some(&body))
    }

    fn download(&self) -> SyncResult<DownloadResponse> {
        self.request(Method::GET, "/api/sync/download", None)
    }

    fn full_sync(&self, payload: &UploadPayload) -> SyncResult<FullSyncResponse> {
        let body = serde_json::to_value(payload)?;
        self.request(Method::POST, "/api/sync/full", Some(&body))
    }

    fn status(&self) -> SyncResult<StatusResponse> {
        self.request(Method::GET, "/api/sync/status", None)
    }
}

impl JobStatusSource for ApiClient {
    fn job_status(&self, job_id: &str) -> SyncResult<SyncJob> {
        self.get_job(job_id)
    }
}

fn decode<T: DeserializeOwned>(resp: Response) -> SyncResult<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(SyncError::Api {
            status: status.as_u16(),
            message: error_message(resp),
        });
    }
    let bytes = resp.bytes()?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn error_message(resp: Response) -> String {
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
    let msg = body.and_then(|b| b.message.or(b.error));
    match msg {
        Some(m) if !m.trim().is_empty() => m,
        _ => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| message_or_fallback(None)),
    }
}
