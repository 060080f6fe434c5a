use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    Backend, Error, Result,
    api::{
        ActionReply, ActivityLog, Combination, CombinationInput, DashboardStats, ListenerStatus,
        Message, MessageInput, Pattern, PatternInput, PeriodStats, Settings, WindowList,
    },
};

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/api";

/// [`Backend`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Base URL without a trailing slash.
    base: String,
    /// Shared connection pool.
    client: Client,
}

impl HttpBackend {
    /// Create a client for `base_url` whose requests give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unreachable {
                endpoint: base_url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Issue one request and decode the JSON reply.
    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let endpoint = format!("{method} {path}");
        let url = format!("{}{}", self.base, path);
        debug!(%endpoint, "backend request");
        let mut req = self.client.request(method, &url);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| {
            warn!(%endpoint, error = %e, "backend unreachable");
            Error::Unreachable {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            }
        })?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| Error::Unreachable {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(status_error(&endpoint, status, &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode {
            endpoint,
            message: e.to_string(),
        })
    }

    /// Request whose reply is an [`ActionReply`]; `success: false` becomes an error.
    async fn action<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<ActionReply>
    where
        B: Serialize + ?Sized + Sync,
    {
        let endpoint = format!("{method} {path}");
        let reply: ActionReply = self.call(method, path, body).await?;
        if reply.success {
            Ok(reply)
        } else {
            Err(Error::Status {
                endpoint,
                status: StatusCode::OK.as_u16(),
                message: reply.error.unwrap_or_else(|| "operation failed".into()),
            })
        }
    }

    /// GET with no body.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call::<(), T>(Method::GET, path, None).await
    }

    /// Mutating request without a body.
    async fn post_empty(&self, path: &str) -> Result<ActionReply> {
        self.action::<()>(Method::POST, path, None).await
    }

    /// Id of a created record.
    fn created_id(path: &str, reply: ActionReply) -> Result<i64> {
        reply.id.ok_or_else(|| Error::Decode {
            endpoint: format!("POST {path}"),
            message: "reply carries no id".into(),
        })
    }
}

/// Build a status error, preferring the backend's own `error` text.
fn status_error(endpoint: &str, status: StatusCode, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<ActionReply>(body)
        .ok()
        .and_then(|r| r.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    warn!(%endpoint, status = status.as_u16(), %message, "backend error");
    Error::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
    }
}

/// Percent-encode a query value.
fn encode_query(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[async_trait]
impl Backend for HttpBackend {
    async fn messages(&self, search: Option<&str>) -> Result<Vec<Message>> {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(q) => self.get(&format!("/messages?search={}", encode_query(q))).await,
            None => self.get("/messages").await,
        }
    }

    async fn message(&self, id: i64) -> Result<Message> {
        self.get(&format!("/messages/{id}")).await
    }

    async fn create_message(&self, input: &MessageInput) -> Result<i64> {
        let reply = self.action(Method::POST, "/messages", Some(input)).await?;
        Self::created_id("/messages", reply)
    }

    async fn update_message(&self, id: i64, input: &MessageInput) -> Result<()> {
        self.action(Method::PUT, &format!("/messages/{id}"), Some(input))
            .await
            .map(drop)
    }

    async fn delete_message(&self, id: i64) -> Result<()> {
        self.action::<()>(Method::DELETE, &format!("/messages/{id}"), None)
            .await
            .map(drop)
    }

    async fn combinations(&self) -> Result<Vec<Combination>> {
        self.get("/combinations").await
    }

    async fn combination(&self, id: i64) -> Result<Combination> {
        self.get(&format!("/combinations/{id}")).await
    }

    async fn create_combination(&self, input: &CombinationInput) -> Result<i64> {
        let reply = self.action(Method::POST, "/combinations", Some(input)).await?;
        Self::created_id("/combinations", reply)
    }

    async fn update_combination(&self, id: i64, input: &CombinationInput) -> Result<()> {
        self.action(Method::PUT, &format!("/combinations/{id}"), Some(input))
            .await
            .map(drop)
    }

    async fn delete_combination(&self, id: i64) -> Result<()> {
        self.action::<()>(Method::DELETE, &format!("/combinations/{id}"), None)
            .await
            .map(drop)
    }

    async fn patterns(&self) -> Result<Vec<Pattern>> {
        self.get("/patterns").await
    }

    async fn create_pattern(&self, input: &PatternInput) -> Result<i64> {
        let reply = self.action(Method::POST, "/patterns", Some(input)).await?;
        Self::created_id("/patterns", reply)
    }

    async fn update_pattern(&self, id: i64, input: &PatternInput) -> Result<()> {
        self.action(Method::PUT, &format!("/patterns/{id}"), Some(input))
            .await
            .map(drop)
    }

    async fn delete_pattern(&self, id: i64) -> Result<()> {
        self.action::<()>(Method::DELETE, &format!("/patterns/{id}"), None)
            .await
            .map(drop)
    }

    async fn settings(&self) -> Result<Settings> {
        self.get("/settings").await
    }

    async fn update_settings(&self, patch: &Settings) -> Result<()> {
        self.action(Method::POST, "/settings", Some(patch))
            .await
            .map(drop)
    }

    async fn windows(&self) -> Result<WindowList> {
        self.get("/windows").await
    }

    async fn send_message(&self, id: i64) -> Result<()> {
        self.post_empty(&format!("/send-message/{id}")).await.map(drop)
    }

    async fn send_combination(&self, id: i64) -> Result<()> {
        self.post_empty(&format!("/send-combination/{id}"))
            .await
            .map(drop)
    }

    async fn listener_status(&self) -> Result<ListenerStatus> {
        self.get("/listener/status").await
    }

    async fn start_listener(&self) -> Result<bool> {
        let reply = self.post_empty("/listener/start").await?;
        Ok(reply.active.unwrap_or(true))
    }

    async fn stop_listener(&self) -> Result<bool> {
        let reply = self.post_empty("/listener/stop").await?;
        Ok(reply.active.unwrap_or(false))
    }

    async fn refresh_listener(&self) -> Result<bool> {
        let reply = self.post_empty("/listener/refresh").await?;
        Ok(reply.active.unwrap_or(false))
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.get("/dashboard/stats").await
    }

    async fn dashboard_period(&self, days: u32) -> Result<PeriodStats> {
        self.get(&format!("/dashboard/period?days={days}")).await
    }

    async fn dashboard_logs(&self, limit: u32) -> Result<Vec<ActivityLog>> {
        self.get(&format!("/dashboard/logs?limit={limit}")).await
    }
}
