//! kenflow-backend: async client for the kenflow backend service.
//!
//! The backend owns messages, combinations, patterns and settings and performs
//! keystroke delivery. Everything in this crate goes through the [`Backend`]
//! trait so surfaces and tests can swap the HTTP client for the in-memory
//! [`MockBackend`].

mod error;
pub use error::{Error, Result};

mod http;
pub use http::HttpBackend;

mod ready;
pub use ready::{Readiness, wait_until_ready};

#[cfg(any(test, feature = "test-utils"))]
mod mock;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockBackend;

use async_trait::async_trait;
pub use kenflow_protocol::api;
use kenflow_protocol::{
    ItemKind,
    api::{
        ActivityLog, Combination, CombinationInput, DashboardStats, ListenerStatus, Message,
        MessageInput, Pattern, PatternInput, PeriodStats, Settings, WindowList,
    },
};

/// Request/response contract of the backend service.
#[async_trait]
pub trait Backend: Send + Sync {
    /// List messages, optionally filtered by a search string.
    async fn messages(&self, search: Option<&str>) -> Result<Vec<Message>>;
    /// Fetch one message.
    async fn message(&self, id: i64) -> Result<Message>;
    /// Create a message, returning its id.
    async fn create_message(&self, input: &MessageInput) -> Result<i64>;
    /// Replace a message.
    async fn update_message(&self, id: i64, input: &MessageInput) -> Result<()>;
    /// Delete a message.
    async fn delete_message(&self, id: i64) -> Result<()>;

    /// List combinations.
    async fn combinations(&self) -> Result<Vec<Combination>>;
    /// Fetch one combination.
    async fn combination(&self, id: i64) -> Result<Combination>;
    /// Create a combination, returning its id.
    async fn create_combination(&self, input: &CombinationInput) -> Result<i64>;
    /// Replace a combination.
    async fn update_combination(&self, id: i64, input: &CombinationInput) -> Result<()>;
    /// Delete a combination.
    async fn delete_combination(&self, id: i64) -> Result<()>;

    /// List patterns.
    async fn patterns(&self) -> Result<Vec<Pattern>>;
    /// Create a pattern, returning its id.
    async fn create_pattern(&self, input: &PatternInput) -> Result<i64>;
    /// Replace a pattern.
    async fn update_pattern(&self, id: i64, input: &PatternInput) -> Result<()>;
    /// Delete a pattern.
    async fn delete_pattern(&self, id: i64) -> Result<()>;

    /// Read all settings.
    async fn settings(&self) -> Result<Settings>;
    /// Write the keys present in `patch`; other keys are untouched.
    async fn update_settings(&self, patch: &Settings) -> Result<()>;

    /// Titles of the OS windows currently open.
    async fn windows(&self) -> Result<WindowList>;

    /// Type a message into the target window.
    async fn send_message(&self, id: i64) -> Result<()>;
    /// Type a combination into the target window.
    async fn send_combination(&self, id: i64) -> Result<()>;

    /// Current listener state.
    async fn listener_status(&self) -> Result<ListenerStatus>;
    /// Register global hotkeys; returns the new active flag.
    async fn start_listener(&self) -> Result<bool>;
    /// Unregister global hotkeys; returns the new active flag.
    async fn stop_listener(&self) -> Result<bool>;
    /// Reload hotkeys after an assignment change; returns the active flag.
    async fn refresh_listener(&self) -> Result<bool>;

    /// Aggregate counters.
    async fn dashboard_stats(&self) -> Result<DashboardStats>;
    /// Per-day send counts over the last `days` days.
    async fn dashboard_period(&self, days: u32) -> Result<PeriodStats>;
    /// Most recent activity rows.
    async fn dashboard_logs(&self, limit: u32) -> Result<Vec<ActivityLog>>;

    /// Send either kind of item.
    async fn send_item(&self, kind: ItemKind, id: i64) -> Result<()> {
        match kind {
            ItemKind::Message => self.send_message(id).await,
            ItemKind::Combination => self.send_combination(id).await,
        }
    }
}
