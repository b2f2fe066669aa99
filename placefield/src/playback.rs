//! Place selection, playback, and drag-to-pan
//!
//! Nothing in this module touches the [`Coordinator`](crate::coordinator);
//! choosing a place only changes which frame of the current result set is
//! shown.
use log::debug;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};

/// Place shown before the user picks one
pub const DEFAULT_PLACE: u32 = 6;

/// Pointer travel (in pixels) per unit of offset while dragging
pub const DEFAULT_DRAG_DIVISOR: f64 = 10.0;

/// Shortest accepted playback interval
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic timer, alive only while playing
#[derive(Debug)]
struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    fn new(now: Instant, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        Self {
            interval,
            next: now + interval,
        }
    }

    /// Returns the number of whole intervals that elapsed since last called
    fn fire(&mut self, now: Instant) -> u64 {
        let mut n = 0;
        while now >= self.next {
            self.next += self.interval;
            n += 1;
        }
        n
    }
}

#[derive(Debug)]
enum State {
    Paused,
    Playing(Ticker),
}

/// Current place plus the play/pause state machine
#[derive(Debug)]
pub struct Playback {
    place: u32,
    max_place: u32,
    state: State,
}

impl Playback {
    /// Builds a paused controller
    ///
    /// `max_place` is clamped to at least 1 and `place` into
    /// `1..=max_place`.
    pub fn new(place: u32, max_place: u32) -> Self {
        let max_place = max_place.max(1);
        Self {
            place: place.clamp(1, max_place),
            max_place,
            state: State::Paused,
        }
    }

    /// Returns the selected place, in `1..=max_place`
    pub fn place(&self) -> u32 {
        self.place
    }

    /// Returns the number of places
    pub fn max_place(&self) -> u32 {
        self.max_place
    }

    /// Checks whether the ticker is running
    pub fn is_playing(&self) -> bool {
        matches!(self.state, State::Playing(..))
    }

    /// Starts (or restarts) playback, first stepping at `now + interval`
    pub fn play(&mut self, now: Instant, interval: Duration) {
        debug!("playback started, interval {interval:?}");
        self.state = State::Playing(Ticker::new(now, interval));
    }

    /// Stops playback, leaving the place unchanged
    pub fn pause(&mut self) {
        if self.is_playing() {
            debug!("playback paused at place {}", self.place);
        }
        self.state = State::Paused;
    }

    /// Toggles between playing and paused
    pub fn toggle(&mut self, now: Instant, interval: Duration) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play(now, interval);
        }
    }

    /// Changes the interval of a running ticker; no-op while paused
    pub fn set_interval(&mut self, now: Instant, interval: Duration) {
        if let State::Playing(t) = &mut self.state {
            *t = Ticker::new(now, interval);
        }
    }

    /// Advances once per elapsed interval
    ///
    /// Returns `true` if the place changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let State::Playing(t) = &mut self.state else {
            return false;
        };
        let n = t.fire(now);
        if n == 0 {
            return false;
        }
        let m = u64::from(self.max_place);
        let next = (u64::from(self.place) - 1 + n % m) % m + 1;
        // `next` is at most `max_place`, which came from a u32
        self.place = next as u32;
        true
    }

    /// Moves to the next place, wrapping past `max_place` to 1
    pub fn step_forward(&mut self) {
        self.place = if self.place >= self.max_place {
            1
        } else {
            self.place + 1
        };
    }

    /// Moves to the previous place, wrapping below 1 to `max_place`
    pub fn step_back(&mut self) {
        self.place = if self.place <= 1 {
            self.max_place
        } else {
            self.place - 1
        };
    }

    /// Sets the number of places, clamping the current place if needed
    pub fn set_max_place(&mut self, max_place: u32) {
        self.max_place = max_place.max(1);
        self.place = self.place.min(self.max_place);
    }
}

impl Default for Playback {
    fn default() -> Self {
        Self::new(DEFAULT_PLACE, crate::coordinator::DEFAULT_MAX_PLACE)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Pointer position in pixels
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pointer {
    /// Horizontal position, increasing to the right
    pub x: f64,
    /// Vertical position, increasing downward
    pub y: f64,
}

impl Pointer {
    /// Builds a new pointer position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An in-progress drag gesture
///
/// Records the pointer and offsets at the start of the gesture; every later
/// position maps to offsets relative to that baseline, so rounding errors
/// don't accumulate over a long drag.
#[derive(Copy, Clone, Debug)]
pub struct Drag {
    start: Pointer,
    offsets: (i64, i64),
    divisor: f64,
}

impl Drag {
    /// Starts a drag with the default sensitivity
    pub fn begin(pointer: Pointer, offsets: (i64, i64)) -> Self {
        Self::with_divisor(pointer, offsets, DEFAULT_DRAG_DIVISOR)
    }

    /// Starts a drag where `divisor` pixels move the offset by one
    ///
    /// Non-positive or non-finite divisors fall back to the default.
    pub fn with_divisor(
        pointer: Pointer,
        offsets: (i64, i64),
        divisor: f64,
    ) -> Self {
        let divisor = if divisor.is_finite() && divisor > 0.0 {
            divisor
        } else {
            DEFAULT_DRAG_DIVISOR
        };
        Self {
            start: pointer,
            offsets,
            divisor,
        }
    }

    /// Offsets at the start of the drag
    pub fn baseline(&self) -> (i64, i64) {
        self.offsets
    }

    /// Returns `(x_offset, y_offset)` for the given pointer position
    pub fn offsets_at(&self, pointer: Pointer) -> (i64, i64) {
        let delta = |now: f64, start: f64| {
            let d = ((now - start) / self.divisor).round();
            // Saturating float-to-int cast; NaN becomes 0
            d as i64
        };
        (
            self.offsets.0.saturating_add(delta(pointer.x, self.start.x)),
            self.offsets.1.saturating_add(delta(pointer.y, self.start.y)),
        )
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Numeric text fields a host can expose
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Field {
    /// Number of places to render
    MaxPlace,
    /// Horizontal pan offset
    XOffset,
    /// Vertical pan offset
    YOffset,
    /// Playback interval, in milliseconds
    Interval,
}

/// A successfully parsed field
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    /// Place count, at least 1
    MaxPlace(u32),
    /// Horizontal pan offset
    XOffset(i64),
    /// Vertical pan offset
    YOffset(i64),
    /// Playback interval, at least one millisecond
    Interval(Duration),
}

impl Field {
    /// Parses field text
    ///
    /// Returns `None` for empty or invalid text, which callers treat as a
    /// no-op.  `MaxPlace` and `Interval` must be at least 1.
    ///
    /// ```
    /// # use placefield::playback::{Field, FieldValue};
    /// assert_eq!(Field::MaxPlace.parse(" 12 "), Some(FieldValue::MaxPlace(12)));
    /// assert_eq!(Field::MaxPlace.parse("0"), None);
    /// assert_eq!(Field::XOffset.parse(""), None);
    /// ```
    pub fn parse(&self, text: &str) -> Option<FieldValue> {
        let text = text.trim();
        let v = match self {
            Field::MaxPlace => {
                let m: u32 = text.parse().ok().filter(|&m| m >= 1)?;
                FieldValue::MaxPlace(m)
            }
            Field::XOffset => FieldValue::XOffset(text.parse().ok()?),
            Field::YOffset => FieldValue::YOffset(text.parse().ok()?),
            Field::Interval => {
                let ms: u64 = text.parse().ok().filter(|&ms| ms >= 1)?;
                FieldValue::Interval(Duration::from_millis(ms))
            }
        };
        Some(v)
    }
}
