//! Measurement capability supplied by the rendering surface.
//!
//! Cursor overlays need to know where a character offset is drawn. The editor
//! core has no access to any layout engine, so the surface hands in an
//! implementation of [`MeasureOffset`]. The browser surface walks text nodes,
//! a native surface would query its text layout, and tests use a fixed grid.

/// Position of a caret relative to the editor container.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaretPosition {
    pub x: f64,
    pub y: f64,
    pub height: f64,
}

impl CaretPosition {
    pub fn new(x: f64, y: f64, height: f64) -> Self {
        Self { x, y, height }
    }
}

/// Which edge of the container to anchor to when an offset can't be measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Top-left of the content.
    Start,
    /// Just after the last rendered character.
    End,
}

/// Maps character offsets to on-screen caret positions.
pub trait MeasureOffset {
    /// Measure the caret position for a character offset.
    ///
    /// Returns None if the offset cannot be mapped, e.g. it lies past the end
    /// of the rendered content.
    fn measure(&self, offset: usize) -> Option<CaretPosition>;

    /// The container origin for the given edge.
    fn origin(&self, edge: Edge) -> CaretPosition;
}

impl<M: MeasureOffset + ?Sized> MeasureOffset for &M {
    fn measure(&self, offset: usize) -> Option<CaretPosition> {
        (**self).measure(offset)
    }

    fn origin(&self, edge: Edge) -> CaretPosition {
        (**self).origin(edge)
    }
}
