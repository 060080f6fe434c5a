use std::{collections::BTreeSet, error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Modifier;

/// Why a combo string was rejected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The input was empty or only whitespace.
    Empty,
    /// A component between `+` separators was empty.
    EmptyComponent,
    /// A non-final component was not a modifier name.
    UnknownModifier(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty key combination"),
            Self::EmptyComponent => f.write_str("empty component in key combination"),
            Self::UnknownModifier(m) => write!(f, "unknown modifier '{m}'"),
        }
    }
}

impl error::Error for ParseError {}

/// A key chord: a set of modifiers plus a single primary key.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Combo {
    modifiers: BTreeSet<Modifier>,
    key: String,
}

impl Combo {
    /// Builds a combo from parts. The key is normalized.
    ///
    /// When the key is itself a modifier, the chord is modifiers only: the key
    /// joins the set and the last modifier in canonical order becomes the key,
    /// so `shift+ctrl` and `ctrl+shift` are the same combo.
    pub fn new(modifiers: impl IntoIterator<Item = Modifier>, key: &str) -> Self {
        let key = normalize_key(key);
        let mut modifiers: BTreeSet<Modifier> = modifiers.into_iter().collect();
        let Some(held) = Modifier::from_spec(&key) else {
            return Self { modifiers, key };
        };
        modifiers.insert(held);
        let last = modifiers.pop_last().unwrap_or(held);
        Self {
            modifiers,
            key: last.to_spec().to_string(),
        }
    }

    /// Parses a combo of the form `"shift+ctrl+k"`.
    ///
    /// - Case-insensitive; modifiers may appear in any order.
    /// - The last component is always the primary key, so `"ctrl"` alone is a
    ///   combo whose key is the control key.
    /// - A literal space as the key is accepted (`"ctrl+ "`).
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        let mut parts: Vec<&str> = s.split('+').collect();
        let key_raw = match parts.pop() {
            Some(k) if k == " " => " ",
            Some(k) if !k.trim().is_empty() => k.trim(),
            _ => return Err(ParseError::EmptyComponent),
        };
        let mut modifiers = Vec::with_capacity(parts.len());
        for part in parts {
            let p = part.trim();
            if p.is_empty() {
                return Err(ParseError::EmptyComponent);
            }
            let m = Modifier::from_spec(p).ok_or_else(|| ParseError::UnknownModifier(p.into()))?;
            modifiers.push(m);
        }
        Ok(Self::new(modifiers, key_raw))
    }

    /// Modifiers in canonical order.
    pub fn modifiers(&self) -> impl Iterator<Item = Modifier> + '_ {
        self.modifiers.iter().copied()
    }

    /// Whether the combo holds `m`.
    pub fn has(&self, m: Modifier) -> bool {
        self.modifiers.contains(&m)
    }

    /// The normalized primary key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Canonical string form: modifiers in `ctrl, alt, shift` order, then the key.
    pub fn to_string_canonical(&self) -> String {
        let mut out: Vec<&str> = self.modifiers.iter().map(|m| m.to_spec()).collect();
        out.push(&self.key);
        out.join("+")
    }
}

/// Normalizes a key name: lowercased, with browser-style and platform names
/// mapped to the short forms used in combos.
fn normalize_key(raw: &str) -> String {
    if raw == " " {
        return "space".into();
    }
    let lower = raw.trim().to_lowercase();
    let mapped = match lower.as_str() {
        "control" | "ctl" => "ctrl",
        "option" | "opt" => "alt",
        "meta" | "super" | "os" | "cmd" | "command" => "win",
        "arrowup" => "up",
        "arrowdown" => "down",
        "arrowleft" => "left",
        "arrowright" => "right",
        "esc" => "escape",
        "return" => "enter",
        "spacebar" => "space",
        "del" => "delete",
        _ => return lower,
    };
    mapped.to_string()
}

/// Parses and re-renders a combo string in canonical form.
pub fn normalize(s: &str) -> Result<String, ParseError> {
    Combo::parse(s).map(|c| c.to_string_canonical())
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_canonical())
    }
}

impl FromStr for Combo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Combo {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Combo> for String {
    fn from(c: Combo) -> Self {
        c.to_string_canonical()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_basic_combo() {
        let c = Combo::parse("shift+ctrl+K").expect("parse");
        assert!(c.has(Modifier::Shift));
        assert!(c.has(Modifier::Ctrl));
        assert!(!c.has(Modifier::Alt));
        assert_eq!(c.key(), "k");
        assert_eq!(c.to_string(), "ctrl+shift+k");
    }

    #[test]
    fn aliases_and_special_keys() {
        assert_eq!(normalize("Control+ArrowUp").as_deref(), Ok("ctrl+up"));
        assert_eq!(normalize("option+Meta").as_deref(), Ok("alt+win"));
        assert_eq!(normalize("ctrl+ ").as_deref(), Ok("ctrl+space"));
        assert_eq!(normalize("ESC").as_deref(), Ok("escape"));
        assert_eq!(normalize("F5").as_deref(), Ok("f5"));
    }

    #[test]
    fn lone_modifier_key() {
        let c = Combo::parse("ctrl").expect("parse");
        assert_eq!(c.key(), "ctrl");
        assert_eq!(c.modifiers().count(), 0);
        // A modifier naming the key itself collapses away.
        assert_eq!(normalize("ctrl+control").as_deref(), Ok("ctrl"));
        assert_eq!(normalize("shift+ctrl").as_deref(), Ok("ctrl+shift"));
        assert_eq!(normalize("ctrl+shift").as_deref(), Ok("ctrl+shift"));
        assert_eq!(normalize("shift+alt+Control").as_deref(), Ok("ctrl+alt+shift"));
        assert_eq!(Combo::parse("shift+ctrl"), Combo::parse("ctrl+shift"));
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(Combo::parse(""), Err(ParseError::Empty));
        assert_eq!(Combo::parse("ctrl++a"), Err(ParseError::EmptyComponent));
        assert_eq!(Combo::parse("ctrl+"), Err(ParseError::EmptyComponent));
        assert_eq!(
            Combo::parse("hyper+a"),
            Err(ParseError::UnknownModifier("hyper".into()))
        );
    }

    #[test]
    fn idempotence_roundtrip() {
        for s in ["shift+alt+k", "CTRL+ALT+Space", "Shift+Control+1", "alt+F12"] {
            let c = Combo::parse(s).expect("parse");
            let spec = c.to_string();
            let c2 = Combo::parse(&spec).expect("reparse");
            assert_eq!(c, c2, "idempotent for {s} => {spec}");
            assert_eq!(spec, c2.to_string());
        }
    }

    #[test]
    fn serde_uses_canonical_string() {
        let c: Combo = serde_json::from_str("\"Shift+Ctrl+a\"").expect("decode");
        assert_eq!(serde_json::to_string(&c).expect("encode"), "\"ctrl+shift+a\"");
    }

    fn modifier_names() -> impl Strategy<Value = Vec<&'static str>> {
        proptest::sample::subsequence(
            vec!["ctrl", "alt", "shift", "Control", "Option", "SHIFT"],
            0..=6,
        )
    }

    proptest! {
        #[test]
        fn normalization_ignores_modifier_order(
            mods in modifier_names().prop_shuffle(),
            key in "[a-z0-9]|f[1-9]|space|enter|up",
        ) {
            let mut sorted = mods.clone();
            sorted.sort();
            let a = format!("{}+{key}", mods.join("+"));
            let b = format!("{}+{key}", sorted.join("+"));
            let a = if mods.is_empty() { key.clone() } else { a };
            let b = if sorted.is_empty() { key.clone() } else { b };
            prop_assert_eq!(normalize(&a), normalize(&b));
        }

        #[test]
        fn modifier_only_chords_ignore_order(
            mods in proptest::sample::subsequence(vec!["ctrl", "alt", "shift"], 1..=3)
                .prop_shuffle(),
        ) {
            let mut sorted = mods.clone();
            sorted.sort_by_key(|m| Modifier::from_spec(m));
            prop_assert_eq!(normalize(&mods.join("+")), Ok(sorted.join("+")));
        }

        #[test]
        fn normalization_is_total_on_key_names(key in "[A-Za-z0-9]{1,8}") {
            let first = normalize(&key).expect("single key always parses");
            prop_assert_eq!(normalize(&first).expect("reparse"), first.clone());
        }
    }
}
