//! Host-facing facade
//!
//! A [`Session`] is what a UI event loop talks to: it forwards edits to the
//! [`Coordinator`], selection to [`Playback`], and pointer events to a
//! [`Drag`], then exposes the frame for the current place.
use crate::{
    Error,
    coordinator::{
        Coordinator, CoordinatorConfig, Generation, RenderParameters, Status,
    },
    expr::Expression,
    playback::{
        DEFAULT_DRAG_DIVISOR, DEFAULT_PLACE, Drag, Field, FieldValue, Playback,
        Pointer,
    },
    render::{GlyphCell, GridRenderer, GridSize, Viewport},
};
use log::{debug, info};
use rand::{Rng, seq::SliceRandom};
use std::time::Instant;

/// Expressions offered by [`Session::pick_random`]
pub const GALLERY: &[&str] = &[
    "x * x * y * y",
    "x * y",
    "x ^ 3 + y ^ 3",
    "(x * x + y * y) * 7",
    "x * y * (x - y)",
    "hypot(x, y) * 1000",
    "sin(x / 8) * cos(y / 8) * 10000",
    "atan2(y, x) * 100000",
    "x < y ? x * y : x + y * y",
    "sum(i, 1, 12, x * i + y)",
    "floor(x * x / (abs(y) + 1)) * 11",
    "(x * 37 + y * 91) % 1000",
];

/// Settings for a [`Session`]
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Settings for the underlying coordinator
    pub coordinator: CoordinatorConfig,
    /// Initial render parameters
    pub params: RenderParameters,
    /// Initial place
    pub place: u32,
    /// Pointer travel (in pixels) per unit of offset while dragging
    pub drag_divisor: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            params: RenderParameters::default(),
            place: DEFAULT_PLACE,
            drag_divisor: DEFAULT_DRAG_DIVISOR,
        }
    }
}

/// Interactive session state, owned by the host thread
pub struct Session {
    coordinator: Coordinator,
    playback: Playback,
    drag: Option<Drag>,
    drag_divisor: f64,
}

impl Session {
    /// Builds a new session
    ///
    /// Nothing is dispatched until the first [`poll`](Self::poll) with a
    /// non-empty grid.
    pub fn new<R: GridRenderer + 'static>(
        config: SessionConfig,
        renderer: R,
    ) -> Self {
        let playback = Playback::new(config.place, config.params.max_place);
        let coordinator = Coordinator::with_params(
            config.coordinator,
            renderer,
            config.params,
        );
        Self {
            coordinator,
            playback,
            drag: None,
            drag_divisor: config.drag_divisor,
        }
    }

    /// Returns the coordinator, e.g. to inspect job counts
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Returns the current render parameters
    pub fn params(&self) -> &RenderParameters {
        self.coordinator.params()
    }

    /// Replaces the expression text, keeping the free variable names
    pub fn set_expression(&mut self, text: &str) {
        let [x, y] = self.params().expression.vars();
        let e = Expression::with_vars(text, x, y);
        self.coordinator.set_expression(e);
    }

    /// Renames the free variables, keeping the expression text
    pub fn set_variables(&mut self, x: &str, y: &str) {
        let text = self.params().expression.text();
        let e = Expression::with_vars(text, x, y);
        self.coordinator.set_expression(e);
    }

    /// Replaces the expression with a random pick from [`GALLERY`]
    ///
    /// The current expression is never picked again.
    pub fn pick_random<G: Rng + ?Sized>(
        &mut self,
        rng: &mut G,
    ) -> &'static str {
        let current = self.params().expression.text().to_owned();
        let choices: Vec<&'static str> =
            GALLERY.iter().copied().filter(|e| *e != current).collect();
        let pick = choices.choose(rng).copied().unwrap_or(GALLERY[0]);
        info!("picked `{pick}` from the gallery");
        self.set_expression(pick);
        pick
    }

    /// Applies text typed into a numeric field
    ///
    /// Returns `false` (and changes nothing) if the text doesn't parse.
    pub fn set_field(&mut self, field: Field, text: &str) -> bool {
        let Some(value) = field.parse(text) else {
            debug!("ignoring invalid {field} text {text:?}");
            return false;
        };
        let (x, y) = (self.params().x_offset, self.params().y_offset);
        match value {
            FieldValue::MaxPlace(m) => {
                self.coordinator.set_max_place(m);
                self.playback.set_max_place(m);
            }
            FieldValue::XOffset(x) => self.coordinator.set_offsets(x, y),
            FieldValue::YOffset(y) => self.coordinator.set_offsets(x, y),
            FieldValue::Interval(i) => {
                self.coordinator.set_interval(i);
                self.playback.set_interval(Instant::now(), i);
            }
        }
        true
    }

    /// Recomputes the grid size after the viewport or font changed
    ///
    /// Does nothing while the glyph cell is unmeasured.
    pub fn resize(&mut self, viewport: Viewport, cell: GlyphCell) {
        if let Some(grid) = GridSize::from_viewport(viewport, cell) {
            self.coordinator.set_grid(grid);
        }
    }

    /// Starts a drag from the current offsets
    pub fn pointer_down(&mut self, pointer: Pointer) {
        let offsets = (self.params().x_offset, self.params().y_offset);
        let drag = Drag::with_divisor(pointer, offsets, self.drag_divisor);
        self.drag = Some(drag);
    }

    /// Pans if a drag is in progress
    pub fn pointer_move(&mut self, pointer: Pointer) {
        if let Some(drag) = &self.drag {
            let (x, y) = drag.offsets_at(pointer);
            self.coordinator.set_offsets(x, y);
        }
    }

    /// Finishes a drag
    pub fn pointer_up(&mut self, pointer: Pointer) {
        self.pointer_move(pointer);
        self.drag = None;
    }

    /// Checks whether a drag is in progress
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Returns the selected place
    pub fn place(&self) -> u32 {
        self.playback.place()
    }

    /// Checks whether playback is running
    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Starts playback at the configured interval
    pub fn play(&mut self, now: Instant) {
        let interval = self.params().interval;
        self.playback.play(now, interval);
    }

    /// Stops playback, keeping the current place
    pub fn pause(&mut self) {
        self.playback.pause();
    }

    /// Toggles between playing and paused
    pub fn toggle(&mut self, now: Instant) {
        let interval = self.params().interval;
        self.playback.toggle(now, interval);
    }

    /// Shows the next place, wrapping to 1
    pub fn step_forward(&mut self) {
        self.playback.step_forward();
    }

    /// Shows the previous place, wrapping to the last one
    pub fn step_back(&mut self) {
        self.playback.step_back();
    }

    /// Advances playback and collects or dispatches jobs
    ///
    /// Returns `true` if the visible frame may have changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let ticked = self.playback.tick(now);
        let committed = self.coordinator.poll(now);
        ticked || committed
    }

    /// Returns the earliest instant at which [`poll`](Self::poll) has work
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.coordinator.next_wakeup()
    }

    /// Returns the rendered text for the current place
    ///
    /// After a failed generation this is still the last good frame; check
    /// [`is_expression_invalid`](Self::is_expression_invalid) and
    /// [`timed_out`](Self::timed_out) to flag it.
    pub fn frame(&self) -> Option<&str> {
        let (_, results) = self.coordinator.results()?;
        results.get(self.playback.place())
    }

    /// Returns the generation that produced [`frame`](Self::frame)
    pub fn frame_generation(&self) -> Option<Generation> {
        self.coordinator.results().map(|(g, _)| g)
    }

    /// Returns the outcome of the most recently committed generation
    pub fn status(&self) -> &Status {
        self.coordinator.status()
    }

    /// Returns the error from the most recent generation, if it failed
    pub fn error(&self) -> Option<&Error> {
        match self.status() {
            Status::Invalid(_, e) | Status::TimedOut(_, e) => Some(e),
            Status::Empty | Status::Ready(..) => None,
        }
    }

    /// Checks whether the latest expression failed to compile or run
    pub fn is_expression_invalid(&self) -> bool {
        matches!(self.status(), Status::Invalid(..))
    }

    /// Checks whether the latest batch ran past its deadline
    pub fn timed_out(&self) -> bool {
        matches!(self.status(), Status::TimedOut(..))
    }
}
