//! Shared types exchanged between KenFlow surfaces, the coordination layer and
//! the backend client.
//!
//! Nothing in this crate performs I/O. The [`api`] module mirrors the JSON
//! payloads of the backend service; the rest describes the coordination layer
//! itself: which windows exist, what the quick-access list holds, and which
//! signals travel over the broadcast bus.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod api;

/// Kind of item that can be triggered: a single message or an ordered
/// combination of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A single message with one or more templates.
    Message,
    /// An ordered sequence of messages sent with a delay between them.
    Combination,
}

impl ItemKind {
    /// Stable lowercase name, also used as the wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Combination => "combination",
        }
    }

    /// Parse a kind name (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "message" | "msg" | "m" => Some(Self::Message),
            "combination" | "combo" | "c" => Some(Self::Combination),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the quick-access list shown in the overlay.
///
/// Entries are unique by `(item_id, item_type)`; the list order decides render
/// order in the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionEntry {
    /// Backend id of the referenced item, kept as a string.
    pub item_id: String,
    /// Whether the id refers to a message or a combination.
    pub item_type: ItemKind,
}

impl SelectionEntry {
    /// Construct an entry from any id representation.
    pub fn new(item_id: impl ToString, item_type: ItemKind) -> Self {
        Self {
            item_id: item_id.to_string(),
            item_type,
        }
    }

    /// Shorthand for a message entry.
    pub fn message(item_id: impl ToString) -> Self {
        Self::new(item_id, ItemKind::Message)
    }

    /// Shorthand for a combination entry.
    pub fn combination(item_id: impl ToString) -> Self {
        Self::new(item_id, ItemKind::Combination)
    }

    /// True when this entry references the backend item `(kind, id)`.
    pub fn refers_to(&self, kind: ItemKind, id: i64) -> bool {
        self.item_type == kind && self.item_id == id.to_string()
    }
}

impl fmt::Display for SelectionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type, self.item_id)
    }
}

/// The independently rendered windows managed by the coordination layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// The dashboard, created once at process start.
    Main,
    /// The floating always-on-top quick-access strip.
    Overlay,
    /// Auxiliary window editing the quick-access list.
    ItemPicker,
    /// Auxiliary window editing the target-window set.
    TargetPicker,
}

impl WindowKind {
    /// All window kinds in a stable order.
    pub const ALL: [Self; 4] = [
        Self::Main,
        Self::Overlay,
        Self::ItemPicker,
        Self::TargetPicker,
    ];

    /// Pickers are anchored to the overlay and never persist geometry.
    pub fn is_picker(self) -> bool {
        matches!(self, Self::ItemPicker | Self::TargetPicker)
    }

    /// Only Main and Overlay have their geometry persisted across restarts.
    pub fn persists_geometry(self) -> bool {
        matches!(self, Self::Main | Self::Overlay)
    }

    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Overlay => "overlay",
            Self::ItemPicker => "item_picker",
            Self::TargetPicker => "target_picker",
        }
    }

    /// Parse a window kind name, accepting a few short aliases.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "main" => Some(Self::Main),
            "overlay" => Some(Self::Overlay),
            "item_picker" | "items" | "picker" | "selection" => Some(Self::ItemPicker),
            "target_picker" | "targets" | "windows" => Some(Self::TargetPicker),
            _ => None,
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals carried by the broadcast bus. None of them has a payload; receivers
/// re-read whatever state they care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Something changed somewhere; refresh yourself.
    Refresh,
    /// The overlay window was closed. Only delivered to Main.
    OverlayClosed,
}

impl Signal {
    /// Whether a surface of `kind` should receive this signal.
    pub fn is_for(self, kind: WindowKind) -> bool {
        match self {
            Self::Refresh => true,
            Self::OverlayClosed => kind == WindowKind::Main,
        }
    }
}

/// Severity of a toast notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyKind {
    /// Neutral information.
    Info,
    /// Something needs attention but nothing failed.
    Warn,
    /// An operation failed.
    Error,
    /// An operation succeeded.
    Success,
}

/// A short-lived notification shown by a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    /// Severity, affects styling only.
    pub kind: NotifyKind,
    /// Body text.
    pub text: String,
    /// Persistent toasts stay until dismissed; transient ones expire.
    pub persistent: bool,
}

impl Toast {
    /// A toast that expires on its own.
    pub fn transient(kind: NotifyKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            persistent: false,
        }
    }

    /// A toast that stays until dismissed.
    pub fn persistent(kind: NotifyKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            persistent: true,
        }
    }
}

/// Colour theme shared by every surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Dark theme, the default.
    #[default]
    Dark,
    /// Light theme.
    Light,
}

impl Theme {
    /// The other theme.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    /// Parse a theme name; unknown names yield `None`.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
