use std::fmt;

/// Modifier keys that can be part of a combo.
///
/// The derived ordering is the canonical output order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    /// Control key.
    Ctrl,
    /// Alt / Option key.
    Alt,
    /// Shift key.
    Shift,
}

impl Modifier {
    /// All modifiers in canonical order.
    pub const ALL: [Self; 3] = [Self::Ctrl, Self::Alt, Self::Shift];

    /// Parses a modifier name, case-insensitive, accepting common aliases.
    pub fn from_spec(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" | "ctl" => Some(Self::Ctrl),
            "alt" | "opt" | "option" => Some(Self::Alt),
            "shift" => Some(Self::Shift),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn to_spec(self) -> &'static str {
        match self {
            Self::Ctrl => "ctrl",
            Self::Alt => "alt",
            Self::Shift => "shift",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_spec())
    }
}
