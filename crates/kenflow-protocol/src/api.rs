//! JSON payloads of the backend service.
//!
//! The backend stores messages, combinations, patterns and settings and
//! performs the actual keystroke delivery. These types only describe what goes
//! over the wire; unknown fields are ignored so the backend can grow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ItemKind;

/// Settings key holding the "press enter after sending" flag.
pub const SETTING_ENTER_ENABLED: &str = "enter_enabled";
/// Settings key holding the JSON-encoded target window list.
pub const SETTING_TARGET_WINDOWS: &str = "target_windows";

/// One template of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Backend id.
    #[serde(default)]
    pub id: i64,
    /// Raw template text (may contain `{pattern}` references).
    pub content: String,
}

/// A message as returned by `GET /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Backend id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Assigned hotkey, if any.
    #[serde(default)]
    pub trigger_key: Option<String>,
    /// Optional icon class shown instead of the name.
    #[serde(default)]
    pub icon: Option<String>,
    /// Templates, one of which is picked per send.
    #[serde(default)]
    pub templates: Vec<Template>,
}

impl Message {
    /// Request body that recreates this message with a different hotkey.
    pub fn to_input_with_key(&self, trigger_key: Option<String>) -> MessageInput {
        MessageInput {
            name: self.name.clone(),
            templates: self.templates.iter().map(|t| t.content.clone()).collect(),
            trigger_key,
            icon: self.icon.clone(),
        }
    }
}

/// Body of `POST /messages` and `PUT /messages/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInput {
    /// Display name.
    pub name: String,
    /// Template texts.
    pub templates: Vec<String>,
    /// Hotkey, `None` clears it.
    pub trigger_key: Option<String>,
    /// Optional icon class.
    pub icon: Option<String>,
}

/// One message slot inside a combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationItem {
    /// Referenced message id.
    pub message_id: i64,
    /// Position inside the combination.
    #[serde(default)]
    pub order_index: i64,
    /// Name of the referenced message, joined by the backend.
    #[serde(default)]
    pub message_name: Option<String>,
}

/// Default delay between messages of a combination, in milliseconds.
pub const DEFAULT_COMBINATION_DELAY_MS: u64 = 500;

/// Serde default for [`Combination::delay_ms`].
fn default_delay_ms() -> u64 {
    DEFAULT_COMBINATION_DELAY_MS
}

/// A combination as returned by `GET /combinations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    /// Backend id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Assigned hotkey, if any.
    #[serde(default)]
    pub trigger_key: Option<String>,
    /// Optional icon class.
    #[serde(default)]
    pub icon: Option<String>,
    /// Delay between messages in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Ordered message slots.
    #[serde(default)]
    pub items: Vec<CombinationItem>,
}

impl Combination {
    /// Request body that recreates this combination with a different hotkey.
    pub fn to_input_with_key(&self, trigger_key: Option<String>) -> CombinationInput {
        let mut items = self.items.clone();
        items.sort_by_key(|i| i.order_index);
        CombinationInput {
            name: self.name.clone(),
            message_ids: items.iter().map(|i| i.message_id).collect(),
            trigger_key,
            delay_ms: self.delay_ms,
            icon: self.icon.clone(),
        }
    }
}

/// Body of `POST /combinations` and `PUT /combinations/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationInput {
    /// Display name.
    pub name: String,
    /// Ordered message ids.
    pub message_ids: Vec<i64>,
    /// Hotkey, `None` clears it.
    pub trigger_key: Option<String>,
    /// Delay between messages in milliseconds.
    pub delay_ms: u64,
    /// Optional icon class.
    pub icon: Option<String>,
}

/// One value of a pattern list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternItem {
    /// Backend id.
    #[serde(default)]
    pub id: i64,
    /// The substituted value.
    pub value: String,
}

/// A pattern list as returned by `GET /patterns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    /// Backend id.
    pub id: i64,
    /// Pattern name referenced as `{name}` in templates.
    pub name: String,
    /// Candidate values.
    #[serde(default)]
    pub items: Vec<PatternItem>,
}

/// Body of `POST /patterns` and `PUT /patterns/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInput {
    /// Pattern name.
    pub name: String,
    /// Candidate values.
    pub items: Vec<String>,
}

/// Backend settings: a flat string-to-string map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(pub BTreeMap<String, String>);

impl Settings {
    /// Raw value of a setting.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether enter is pressed after a message is typed. Missing means on.
    pub fn enter_enabled(&self) -> bool {
        self.get(SETTING_ENTER_ENABLED)
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true)
    }

    /// Decoded target window titles. Missing or malformed values decode to the
    /// empty (unrestricted) set.
    pub fn target_windows(&self) -> Vec<String> {
        self.get(SETTING_TARGET_WINDOWS)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }

    /// A settings patch that sets only the enter flag.
    pub fn enter_patch(enabled: bool) -> Self {
        let mut m = BTreeMap::new();
        m.insert(
            SETTING_ENTER_ENABLED.to_string(),
            if enabled { "true" } else { "false" }.to_string(),
        );
        Self(m)
    }

    /// A settings patch that sets only the target window list.
    pub fn targets_patch(targets: &[String]) -> Self {
        let encoded = serde_json::to_string(targets).unwrap_or_else(|_| "[]".to_string());
        let mut m = BTreeMap::new();
        m.insert(SETTING_TARGET_WINDOWS.to_string(), encoded);
        Self(m)
    }

    /// Overlay the keys of `patch` onto this map.
    pub fn merge(&mut self, patch: &Self) {
        for (k, v) in &patch.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

/// Reply of `GET /listener/status` and the listener control endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerStatus {
    /// Whether global hotkeys are currently registered.
    #[serde(default)]
    pub active: bool,
    /// Number of registered hotkeys.
    #[serde(default)]
    pub hotkey_count: usize,
}

/// Generic `{success, error, id, active}` reply of mutating endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReply {
    /// Whether the operation succeeded. Missing means yes.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Error message on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// Id of a created record.
    #[serde(default)]
    pub id: Option<i64>,
    /// Listener state, for listener endpoints.
    #[serde(default)]
    pub active: Option<bool>,
}

/// Serde default for [`ActionReply::success`].
fn default_success() -> bool {
    true
}

/// Reply of `GET /windows`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowList {
    /// Titles of the OS windows currently open.
    #[serde(default)]
    pub windows: Vec<String>,
    /// Set when the backend could not enumerate windows.
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of `GET /dashboard/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    /// Number of messages.
    pub total_messages: u64,
    /// Number of templates.
    pub total_templates: u64,
    /// Number of patterns.
    pub total_patterns: u64,
    /// Number of combinations.
    pub total_combinations: u64,
    /// Sends today.
    pub today_sent: u64,
    /// Sends in the last seven days.
    pub week_sent: u64,
    /// Sends in the last thirty days.
    pub month_sent: u64,
    /// Sends overall.
    pub total_sent: u64,
    /// Messages and combinations with a hotkey.
    pub active_hotkeys: u64,
    /// Favourite messages.
    pub favorites_count: u64,
}

/// One bar of the period chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    /// ISO date.
    pub day: String,
    /// Sends on that day.
    pub count: u64,
}

/// Reply of `GET /dashboard/period?days=N`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodStats {
    /// Per-day counts in ascending order.
    pub stats: Vec<DayCount>,
    /// Total over the period.
    pub total: u64,
}

/// One row of `GET /dashboard/logs?limit=N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    /// Backend id.
    #[serde(default)]
    pub id: i64,
    /// What happened (`sent`, `created`, `edited`, `deleted`).
    pub activity_type: String,
    /// `message` or `combination`.
    pub item_type: String,
    /// Referenced item, when it still exists.
    #[serde(default)]
    pub item_id: Option<i64>,
    /// Name of the item at the time of the activity.
    pub item_name: String,
    /// Free-form details.
    #[serde(default)]
    pub details: Option<String>,
    /// Backend timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Anything that can own a hotkey.
pub trait HotkeyHolder {
    /// Kind of the holder.
    fn kind(&self) -> ItemKind;
    /// Backend id.
    fn id(&self) -> i64;
    /// Display name.
    fn name(&self) -> &str;
    /// Assigned hotkey, if any.
    fn trigger_key(&self) -> Option<&str>;
}

impl HotkeyHolder for Message {
    fn kind(&self) -> ItemKind {
        ItemKind::Message
    }
    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn trigger_key(&self) -> Option<&str> {
        self.trigger_key.as_deref()
    }
}

impl HotkeyHolder for Combination {
    fn kind(&self) -> ItemKind {
        ItemKind::Combination
    }
    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn trigger_key(&self) -> Option<&str> {
        self.trigger_key.as_deref()
    }
}
