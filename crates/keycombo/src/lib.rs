//! keycombo: keyboard chords as normalized strings.
//!
//! - `Modifier`: the three chord modifiers (`ctrl`, `alt`, `shift`) in their
//!   canonical order.
//! - `Combo`: a set of modifiers plus one primary key. Parsing accepts any
//!   modifier order and common aliases; `Display` always yields the canonical
//!   form (`ctrl+alt+shift+key`, lowercased), so two combos describing the same
//!   physical chord compare equal and print identically.
//! - `KeyEvent`: a captured key press, convertible to a `Combo`.

mod modifier;
pub use modifier::Modifier;

mod combo;
pub use combo::{Combo, ParseError, normalize};

mod event;
pub use event::KeyEvent;
