use crate::{Combo, Modifier};

/// A single captured key press: the key name as reported by the input source
/// plus the modifier state at the time of the press.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyEvent {
    /// Reported key name (`"a"`, `"ArrowUp"`, `" "`, `"Control"`, ...).
    pub key: String,
    /// Control held.
    pub ctrl: bool,
    /// Alt held.
    pub alt: bool,
    /// Shift held.
    pub shift: bool,
}

impl KeyEvent {
    /// A press of `key` with no modifiers.
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Builder-style modifier setter.
    pub fn with(mut self, m: Modifier) -> Self {
        match m {
            Modifier::Ctrl => self.ctrl = true,
            Modifier::Alt => self.alt = true,
            Modifier::Shift => self.shift = true,
        }
        self
    }

    /// Whether this press is the escape key.
    pub fn is_escape(&self) -> bool {
        matches!(self.key.to_ascii_lowercase().as_str(), "escape" | "esc")
    }

    /// Whether this press is enter with a command-style modifier held.
    pub fn is_ctrl_enter(&self) -> bool {
        self.ctrl && matches!(self.key.to_ascii_lowercase().as_str(), "enter" | "return")
    }

    /// The combo this press produces. A modifier that is itself the pressed
    /// key is not repeated, and modifier-only chords do not depend on which
    /// modifier went down last.
    pub fn to_combo(&self) -> Combo {
        let held = [
            (self.ctrl, Modifier::Ctrl),
            (self.alt, Modifier::Alt),
            (self.shift, Modifier::Shift),
        ];
        Combo::new(
            held.into_iter().filter(|(on, _)| *on).map(|(_, m)| m),
            &self.key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_to_combo() {
        let ev = KeyEvent::plain("A").with(Modifier::Shift).with(Modifier::Ctrl);
        assert_eq!(ev.to_combo().to_string(), "ctrl+shift+a");

        let arrow = KeyEvent::plain("ArrowLeft").with(Modifier::Alt);
        assert_eq!(arrow.to_combo().to_string(), "alt+left");

        let space = KeyEvent::plain(" ");
        assert_eq!(space.to_combo().to_string(), "space");
    }

    #[test]
    fn modifier_key_alone() {
        let ev = KeyEvent::plain("Control").with(Modifier::Ctrl);
        assert_eq!(ev.to_combo().to_string(), "ctrl");
        let ev = KeyEvent::plain("Shift").with(Modifier::Ctrl).with(Modifier::Shift);
        assert_eq!(ev.to_combo().to_string(), "ctrl+shift");
    }

    #[test]
    fn modifier_chord_ignores_press_order() {
        // Ctrl held, then Shift pressed; and the other way round.
        let ctrl_first = KeyEvent::plain("Shift").with(Modifier::Ctrl).with(Modifier::Shift);
        let shift_first = KeyEvent::plain("Control").with(Modifier::Ctrl).with(Modifier::Shift);
        assert_eq!(ctrl_first.to_combo(), shift_first.to_combo());
        assert_eq!(shift_first.to_combo().to_string(), "ctrl+shift");

        let alt_last = KeyEvent::plain("Alt").with(Modifier::Shift).with(Modifier::Alt);
        assert_eq!(alt_last.to_combo().to_string(), "alt+shift");
    }

    #[test]
    fn escape_and_ctrl_enter() {
        assert!(KeyEvent::plain("Escape").is_escape());
        assert!(KeyEvent::plain("Enter").with(Modifier::Ctrl).is_ctrl_enter());
        assert!(!KeyEvent::plain("Enter").is_ctrl_enter());
    }
}
