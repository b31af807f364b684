//! Full-screen log multiplexer and its line-oriented fallback.

pub(crate) mod config;
pub mod core;
pub mod fallback;
pub mod layout;
pub mod surface;
pub mod viewer;

pub use self::core::{ViewState, ViewerKey};
pub use fallback::{InterruptibleInput, PlainViewer};
pub use surface::{CrosstermSurface, SurfaceError, TerminalSurface};
pub use viewer::{Multiplexer, ViewerExit, ViewerMode};
