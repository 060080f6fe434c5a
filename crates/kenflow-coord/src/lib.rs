//! kenflow-coord: the coordination layer of the kenflow launcher.
//!
//! It owns the four surfaces (Main, Overlay, ItemPicker, TargetPicker) and
//! everything they share:
//! - a window [`Registry`](registry::Registry) over a pluggable
//!   [`WindowHost`](host::WindowHost), with durable Main/Overlay geometry
//! - the refresh [`Bus`](bus::Bus) that fans signals out between surfaces
//! - the quick-access list, target windows, theme and hotkey ownership rules
//! - one async controller per surface, driven by [`Coordinator`]
//!
//! The backend is reached only through [`kenflow_backend::Backend`].

mod error;
pub use error::{Error, Result};

pub mod bus;
pub mod config;
pub mod geometry;
pub mod host;
pub mod hotkeys;
pub mod notify;
pub mod registry;
pub mod selection;
pub mod store;
pub mod surfaces;
pub mod targets;
pub mod theme;

mod coordinator;
pub use coordinator::Coordinator;

pub use config::CoordConfig;
