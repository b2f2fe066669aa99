//! Contract with the external grid renderer, and viewport sizing
//!
//! The renderer turns a sampled function into one block of text per place.
//! How a place selects a digit, and how digits become glyphs, is entirely up
//! to the [`GridRenderer`] implementation; this crate only schedules calls to
//! it and stores the strings it returns.
use crate::{
    Error,
    exec::Watchdog,
    expr::Function,
};

/// Largest number of cells along either grid axis
///
/// [`GridSize::from_viewport`] clamps to this, so a degenerate glyph cell
/// can't request an unbounded grid.
pub const MAX_GRID_AXIS: usize = 4096;

/// Grid dimensions, in character cells
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub struct GridSize {
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl GridSize {
    /// Builds a new grid size
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Checks whether the grid has no cells
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Computes the grid that fits in a viewport
    ///
    /// Each axis is `floor(viewport / cell)`, clamped to [`MAX_GRID_AXIS`].
    /// Returns `None` if the glyph cell has not been measured yet (i.e. has
    /// a non-positive or non-finite size).
    ///
    /// ```
    /// # use placefield::render::{GlyphCell, GridSize, Viewport};
    /// let grid = GridSize::from_viewport(
    ///     Viewport::new(800.0, 600.0),
    ///     GlyphCell::new(7.5, 6.0),
    /// );
    /// assert_eq!(grid, Some(GridSize::new(106, 100)));
    /// ```
    pub fn from_viewport(viewport: Viewport, cell: GlyphCell) -> Option<Self> {
        let axis = |px: f64, cell: f64| {
            if cell.is_finite() && cell > 0.0 && px.is_finite() {
                let n = (px / cell).floor().clamp(0.0, MAX_GRID_AXIS as f64);
                Some(n as usize)
            } else {
                None
            }
        };
        Some(Self {
            width: axis(viewport.width, cell.width)?,
            height: axis(viewport.height, cell.height)?,
        })
    }
}

/// Viewport size in pixels, as reported by the host
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
}

impl Viewport {
    /// Builds a new viewport
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Measured size of one monospace glyph, in pixels
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GlyphCell {
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
}

impl GlyphCell {
    /// Builds a new glyph cell
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Everything the renderer needs to draw one place
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GridRequest {
    /// Number of rows
    pub height: usize,
    /// Number of columns
    pub width: usize,
    /// Place being rendered, in `1..=max_place`
    pub place: u32,
    /// Vertical pan offset
    pub y_offset: i64,
    /// Horizontal pan offset
    pub x_offset: i64,
}

/// Handle through which a renderer evaluates `f(x, y)`
///
/// Sampling checks for cancellation; once a batch is cancelled or past its
/// deadline, every call returns [`Error::Interrupted`].  Renderers should
/// propagate that error with `?` rather than swallowing it.
pub struct Sampler<'a> {
    function: &'a Function,
    watchdog: Watchdog,
}

impl<'a> Sampler<'a> {
    /// Builds a sampler that is never interrupted
    pub fn new(function: &'a Function) -> Self {
        Self::with_watchdog(function, Watchdog::unbounded())
    }

    pub(crate) fn with_watchdog(
        function: &'a Function,
        watchdog: Watchdog,
    ) -> Self {
        Self { function, watchdog }
    }

    /// Evaluates the function at `(x, y)`
    pub fn sample(&self, x: f64, y: f64) -> Result<f64, Error> {
        self.function.eval_with(x, y, &self.watchdog)
    }

    /// Checks for cancellation without evaluating anything
    ///
    /// Long-running renderers that do work between samples can call this to
    /// stay responsive.
    pub fn check(&self) -> Result<(), Error> {
        self.watchdog.check()
    }
}

/// External renderer turning a sampled function into text for one place
///
/// Implementations must be pure with respect to their inputs; they are
/// called from worker threads, possibly in parallel across places.
pub trait GridRenderer: Send + Sync {
    /// Renders one grid (rows joined by `\n`)
    fn render(
        &self,
        sampler: &Sampler,
        request: &GridRequest,
    ) -> Result<String, Error>;
}

impl<F> GridRenderer for F
where
    F: Fn(&Sampler, &GridRequest) -> Result<String, Error> + Send + Sync,
{
    fn render(
        &self,
        sampler: &Sampler,
        request: &GridRequest,
    ) -> Result<String, Error> {
        self(sampler, request)
    }
}
