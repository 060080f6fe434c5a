//! In-memory backend for tests and offline sessions.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    Backend, Error, Result,
    api::{
        ActivityLog, Combination, CombinationInput, CombinationItem, DEFAULT_COMBINATION_DELAY_MS,
        DashboardStats, DayCount, ListenerStatus, Message, MessageInput, Pattern, PatternInput,
        PatternItem, PeriodStats, Settings, Template, WindowList,
    },
};

/// Mutable state behind the mock.
#[derive(Debug, Default)]
struct State {
    /// Stored messages.
    messages: Vec<Message>,
    /// Stored combinations.
    combinations: Vec<Combination>,
    /// Stored patterns.
    patterns: Vec<Pattern>,
    /// Stored settings.
    settings: Settings,
    /// Window titles returned by `/windows`.
    windows: Vec<String>,
    /// Listener flag.
    listener_active: bool,
    /// Next id handed out on create.
    next_id: i64,
    /// Recorded calls in `METHOD /path` form.
    calls: Vec<String>,
    /// Activity rows recorded for sends and edits.
    logs: Vec<ActivityLog>,
    /// When set, every call fails as unreachable.
    unreachable: bool,
    /// Endpoints (`METHOD /path`) forced to fail with a 500.
    failing: HashSet<String>,
}

/// [`Backend`] that keeps everything in memory and records each call.
#[derive(Debug, Default)]
pub struct MockBackend {
    /// Shared state.
    state: Mutex<State>,
}

impl MockBackend {
    /// Empty backend.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().next_id = 1;
        mock
    }

    /// Make every following call fail (or succeed again) at the transport level.
    pub fn set_unreachable(&self, on: bool) {
        self.state.lock().unreachable = on;
    }

    /// Force `endpoint` (e.g. `POST /listener/start`) to answer with a 500.
    pub fn fail_endpoint(&self, endpoint: &str) {
        self.state.lock().failing.insert(endpoint.to_string());
    }

    /// Undo [`fail_endpoint`](Self::fail_endpoint).
    pub fn heal_endpoint(&self, endpoint: &str) {
        self.state.lock().failing.remove(endpoint);
    }

    /// Replace the window titles reported by `/windows`.
    pub fn set_windows<S: Into<String>>(&self, titles: impl IntoIterator<Item = S>) {
        self.state.lock().windows = titles.into_iter().map(Into::into).collect();
    }

    /// Seed a message with a single template; returns its id.
    pub fn add_message(&self, name: &str, trigger_key: Option<&str>) -> i64 {
        let mut s = self.state.lock();
        let id = s.alloc();
        s.messages.push(Message {
            id,
            name: name.to_string(),
            trigger_key: trigger_key.map(str::to_string),
            icon: None,
            templates: vec![Template {
                id,
                content: format!("{name} text"),
            }],
        });
        id
    }

    /// Seed a combination; returns its id.
    pub fn add_combination(
        &self,
        name: &str,
        trigger_key: Option<&str>,
        message_ids: &[i64],
    ) -> i64 {
        let mut s = self.state.lock();
        let id = s.alloc();
        let items = s.items_for(message_ids);
        s.combinations.push(Combination {
            id,
            name: name.to_string(),
            trigger_key: trigger_key.map(str::to_string),
            icon: None,
            delay_ms: DEFAULT_COMBINATION_DELAY_MS,
            items,
        });
        id
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls equal to `endpoint`.
    pub fn call_count(&self, endpoint: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == endpoint).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Current listener flag.
    pub fn listener_active(&self) -> bool {
        self.state.lock().listener_active
    }

    /// Snapshot of a stored message.
    pub fn stored_message(&self, id: i64) -> Option<Message> {
        self.state.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    /// Snapshot of a stored combination.
    pub fn stored_combination(&self, id: i64) -> Option<Combination> {
        self.state
            .lock()
            .combinations
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Snapshot of the stored settings.
    pub fn stored_settings(&self) -> Settings {
        self.state.lock().settings.clone()
    }

    /// Record `endpoint` and run `f` against the state unless a failure is armed.
    fn with<T>(&self, endpoint: String, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut s = self.state.lock();
        s.calls.push(endpoint.clone());
        if s.unreachable {
            return Err(Error::Unreachable {
                endpoint,
                message: "connection refused".into(),
            });
        }
        if s.failing.contains(&endpoint) {
            return Err(Error::Status {
                endpoint,
                status: 500,
                message: "forced failure".into(),
            });
        }
        f(&mut s)
    }
}

/// 404 for a missing record.
fn not_found(endpoint: &str, what: &str) -> Error {
    Error::Status {
        endpoint: endpoint.to_string(),
        status: 404,
        message: format!("{what} not found"),
    }
}

impl State {
    /// Hand out the next id.
    fn alloc(&mut self) -> i64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// Combination items for `ids`, with joined names.
    fn items_for(&self, ids: &[i64]) -> Vec<CombinationItem> {
        ids.iter()
            .enumerate()
            .map(|(i, mid)| CombinationItem {
                message_id: *mid,
                order_index: i as i64,
                message_name: self
                    .messages
                    .iter()
                    .find(|m| m.id == *mid)
                    .map(|m| m.name.clone()),
            })
            .collect()
    }

    /// Templates for a message input.
    fn templates(id: i64, input: &MessageInput) -> Vec<Template> {
        input
            .templates
            .iter()
            .map(|t| Template {
                id,
                content: t.clone(),
            })
            .collect()
    }

    /// Append an activity row.
    fn log(&mut self, activity: &str, item_type: &str, id: i64, name: &str) {
        let row = ActivityLog {
            id: self.logs.len() as i64 + 1,
            activity_type: activity.to_string(),
            item_type: item_type.to_string(),
            item_id: Some(id),
            item_name: name.to_string(),
            details: None,
            created_at: None,
        };
        self.logs.push(row);
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn messages(&self, search: Option<&str>) -> Result<Vec<Message>> {
        self.with("GET /messages".into(), |s| {
            let needle = search.map(str::to_lowercase).unwrap_or_default();
            Ok(s.messages
                .iter()
                .filter(|m| {
                    needle.is_empty()
                        || m.name.to_lowercase().contains(&needle)
                        || m.templates
                            .iter()
                            .any(|t| t.content.to_lowercase().contains(&needle))
                })
                .cloned()
                .collect())
        })
    }

    async fn message(&self, id: i64) -> Result<Message> {
        let ep = format!("GET /messages/{id}");
        self.with(ep.clone(), |s| {
            s.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| not_found(&ep, "Message"))
        })
    }

    async fn create_message(&self, input: &MessageInput) -> Result<i64> {
        self.with("POST /messages".into(), |s| {
            let id = s.alloc();
            s.messages.push(Message {
                id,
                name: input.name.clone(),
                trigger_key: input.trigger_key.clone(),
                icon: input.icon.clone(),
                templates: State::templates(id, input),
            });
            s.log("created", "message", id, &input.name);
            Ok(id)
        })
    }

    async fn update_message(&self, id: i64, input: &MessageInput) -> Result<()> {
        let ep = format!("PUT /messages/{id}");
        self.with(ep.clone(), |s| {
            let m = s
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| not_found(&ep, "Message"))?;
            m.name = input.name.clone();
            m.trigger_key = input.trigger_key.clone();
            m.icon = input.icon.clone();
            m.templates = State::templates(id, input);
            s.log("edited", "message", id, &input.name);
            Ok(())
        })
    }

    async fn delete_message(&self, id: i64) -> Result<()> {
        self.with(format!("DELETE /messages/{id}"), |s| {
            s.messages.retain(|m| m.id != id);
            for c in &mut s.combinations {
                c.items.retain(|i| i.message_id != id);
            }
            Ok(())
        })
    }

    async fn combinations(&self) -> Result<Vec<Combination>> {
        self.with("GET /combinations".into(), |s| Ok(s.combinations.clone()))
    }

    async fn combination(&self, id: i64) -> Result<Combination> {
        let ep = format!("GET /combinations/{id}");
        self.with(ep.clone(), |s| {
            s.combinations
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| not_found(&ep, "Combination"))
        })
    }

    async fn create_combination(&self, input: &CombinationInput) -> Result<i64> {
        self.with("POST /combinations".into(), |s| {
            let id = s.alloc();
            let items = s.items_for(&input.message_ids);
            s.combinations.push(Combination {
                id,
                name: input.name.clone(),
                trigger_key: input.trigger_key.clone(),
                icon: input.icon.clone(),
                delay_ms: input.delay_ms,
                items,
            });
            s.log("created", "combination", id, &input.name);
            Ok(id)
        })
    }

    async fn update_combination(&self, id: i64, input: &CombinationInput) -> Result<()> {
        let ep = format!("PUT /combinations/{id}");
        self.with(ep.clone(), |s| {
            let items = s.items_for(&input.message_ids);
            let c = s
                .combinations
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| not_found(&ep, "Combination"))?;
            c.name = input.name.clone();
            c.trigger_key = input.trigger_key.clone();
            c.icon = input.icon.clone();
            c.delay_ms = input.delay_ms;
            c.items = items;
            s.log("edited", "combination", id, &input.name);
            Ok(())
        })
    }

    async fn delete_combination(&self, id: i64) -> Result<()> {
        self.with(format!("DELETE /combinations/{id}"), |s| {
            s.combinations.retain(|c| c.id != id);
            Ok(())
        })
    }

    async fn patterns(&self) -> Result<Vec<Pattern>> {
        self.with("GET /patterns".into(), |s| Ok(s.patterns.clone()))
    }

    async fn create_pattern(&self, input: &PatternInput) -> Result<i64> {
        self.with("POST /patterns".into(), |s| {
            if s.patterns.iter().any(|p| p.name == input.name) {
                return Err(Error::Status {
                    endpoint: "POST /patterns".into(),
                    status: 400,
                    message: format!("pattern '{}' already exists", input.name),
                });
            }
            let id = s.alloc();
            s.patterns.push(Pattern {
                id,
                name: input.name.clone(),
                items: input
                    .items
                    .iter()
                    .map(|v| PatternItem {
                        id,
                        value: v.clone(),
                    })
                    .collect(),
            });
            Ok(id)
        })
    }

    async fn update_pattern(&self, id: i64, input: &PatternInput) -> Result<()> {
        let ep = format!("PUT /patterns/{id}");
        self.with(ep.clone(), |s| {
            let p = s
                .patterns
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| not_found(&ep, "Pattern"))?;
            p.name = input.name.clone();
            p.items = input
                .items
                .iter()
                .map(|v| PatternItem {
                    id,
                    value: v.clone(),
                })
                .collect();
            Ok(())
        })
    }

    async fn delete_pattern(&self, id: i64) -> Result<()> {
        self.with(format!("DELETE /patterns/{id}"), |s| {
            s.patterns.retain(|p| p.id != id);
            Ok(())
        })
    }

    async fn settings(&self) -> Result<Settings> {
        self.with("GET /settings".into(), |s| Ok(s.settings.clone()))
    }

    async fn update_settings(&self, patch: &Settings) -> Result<()> {
        self.with("POST /settings".into(), |s| {
            s.settings.merge(patch);
            Ok(())
        })
    }

    async fn windows(&self) -> Result<WindowList> {
        self.with("GET /windows".into(), |s| {
            Ok(WindowList {
                windows: s.windows.clone(),
                error: None,
            })
        })
    }

    async fn send_message(&self, id: i64) -> Result<()> {
        let ep = format!("POST /send-message/{id}");
        self.with(ep.clone(), |s| {
            let name = s
                .messages
                .iter()
                .find(|m| m.id == id)
                .map(|m| m.name.clone())
                .ok_or_else(|| not_found(&ep, "Message"))?;
            s.log("sent", "message", id, &name);
            Ok(())
        })
    }

    async fn send_combination(&self, id: i64) -> Result<()> {
        let ep = format!("POST /send-combination/{id}");
        self.with(ep.clone(), |s| {
            let name = s
                .combinations
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone())
                .ok_or_else(|| not_found(&ep, "Combination"))?;
            s.log("sent", "combination", id, &name);
            Ok(())
        })
    }

    async fn listener_status(&self) -> Result<ListenerStatus> {
        self.with("GET /listener/status".into(), |s| {
            let hotkeys = s
                .messages
                .iter()
                .filter(|m| m.trigger_key.is_some())
                .count()
                + s.combinations
                    .iter()
                    .filter(|c| c.trigger_key.is_some())
                    .count();
            Ok(ListenerStatus {
                active: s.listener_active,
                hotkey_count: if s.listener_active { hotkeys } else { 0 },
            })
        })
    }

    async fn start_listener(&self) -> Result<bool> {
        self.with("POST /listener/start".into(), |s| {
            s.listener_active = true;
            Ok(true)
        })
    }

    async fn stop_listener(&self) -> Result<bool> {
        self.with("POST /listener/stop".into(), |s| {
            s.listener_active = false;
            Ok(false)
        })
    }

    async fn refresh_listener(&self) -> Result<bool> {
        self.with("POST /listener/refresh".into(), |s| Ok(s.listener_active))
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.with("GET /dashboard/stats".into(), |s| {
            let sent = s.logs.iter().filter(|l| l.activity_type == "sent").count() as u64;
            Ok(DashboardStats {
                total_messages: s.messages.len() as u64,
                total_templates: s.messages.iter().map(|m| m.templates.len() as u64).sum(),
                total_patterns: s.patterns.len() as u64,
                total_combinations: s.combinations.len() as u64,
                today_sent: sent,
                week_sent: sent,
                month_sent: sent,
                total_sent: sent,
                active_hotkeys: s
                    .messages
                    .iter()
                    .filter(|m| m.trigger_key.is_some())
                    .count() as u64
                    + s.combinations
                        .iter()
                        .filter(|c| c.trigger_key.is_some())
                        .count() as u64,
                favorites_count: 0,
            })
        })
    }

    async fn dashboard_period(&self, days: u32) -> Result<PeriodStats> {
        self.with(format!("GET /dashboard/period?days={days}"), |s| {
            let total = s.logs.iter().filter(|l| l.activity_type == "sent").count() as u64;
            let stats = if total > 0 {
                vec![DayCount {
                    day: "today".into(),
                    count: total,
                }]
            } else {
                Vec::new()
            };
            Ok(PeriodStats { stats, total })
        })
    }

    async fn dashboard_logs(&self, limit: u32) -> Result<Vec<ActivityLog>> {
        self.with(format!("GET /dashboard/logs?limit={limit}"), |s| {
            Ok(s.logs
                .iter()
                .rev()
                .take(limit as usize)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_fails_on_demand() {
        let b = MockBackend::new();
        let id = b.add_message("Hello", Some("ctrl+1"));
        assert_eq!(b.message(id).await.expect("message").name, "Hello");

        b.fail_endpoint("POST /listener/start");
        let err = b.start_listener().await.expect_err("forced");
        assert!(!err.is_unreachable());
        assert!(!b.listener_active());

        b.set_unreachable(true);
        assert!(b.settings().await.expect_err("down").is_unreachable());
        assert_eq!(
            b.calls(),
            vec![
                format!("GET /messages/{id}"),
                "POST /listener/start".to_string(),
                "GET /settings".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn deleting_a_message_drops_it_from_combinations() {
        let b = MockBackend::new();
        let a = b.add_message("A", None);
        let c = b.add_message("C", None);
        let combo = b.add_combination("A+C", None, &[a, c]);
        assert_eq!(
            b.stored_combination(combo).expect("combo").items[1]
                .message_name
                .as_deref(),
            Some("C")
        );
        b.delete_message(a).await.expect("delete");
        let items = b.stored_combination(combo).expect("combo").items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].message_id, c);
    }
}
