//! quire-editor-core: editor-side collaboration logic without framework or async dependencies.
//!
//! This crate provides:
//! - `remap` - carry a character offset across a text change
//! - `normalize` - blank-line collapsing applied before text leaves the editor
//! - `CursorTracker` - remote cursors and the local caret, kept valid as text changes
//! - `MeasureOffset` - the capability a rendering surface supplies for overlays
//! - `CommandBus` - typed commands routed to whoever registered for them

pub mod color;
pub mod command;
pub mod cursor;
pub mod normalize;
pub mod platform;
pub mod remap;
pub mod types;

pub use color::{color_for_client, rgba_u32_to_css};
pub use command::{Command, CommandArgs, CommandBus};
pub use cursor::{CursorOverlay, CursorTracker, TrackedCursor, overlays};
pub use normalize::normalize;
pub use platform::{CaretPosition, Edge, MeasureOffset};
pub use remap::{normalize_line_endings, remap};
pub use smol_str::SmolStr;
pub use types::{DocumentSnapshot, now_millis};
