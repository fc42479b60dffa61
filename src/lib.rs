//! Interactive raster-editing canvas engine.
//!
//! A single [`EditorSession`] owns the committed image, the selection mask,
//! the undo history and the view transform. Hosts feed it pointer events in
//! view (screen) coordinates and read back [`EditorSession::display_buffer`]
//! for presentation.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod components;
pub mod config;
pub mod error;
pub mod logger;
pub mod ops;
pub mod session;
pub mod view;

pub use canvas::{PixelBuffer, SelectionMask, SelectionMode, SelectionShape};
pub use components::history::{HistoryEntry, HistoryManager};
pub use components::tools::{PointerEvent, PointerPhase, Tool, ToolContext, ToolOutcome, ToolsState};
pub use config::ToolConfig;
pub use error::ConfigError;
pub use ops::adjustments::Adjustment;
pub use ops::transform::Interpolation;
pub use session::EditorSession;
pub use view::ViewTransform;
