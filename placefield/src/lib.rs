//! Interactive explorer for the decimal digits of two-variable functions
//!
//! A user-typed expression `f(x, y)` is sampled over a character grid; an
//! external [`GridRenderer`](render::GridRenderer) turns the samples for one
//! *place* (decimal digit position) into a block of text.  This crate owns
//! everything around that renderer:
//!
//! - [`expr`] compiles expression text into a sandboxed
//!   [`Function`](expr::Function)
//! - [`exec`] runs one batch of renders per job on an isolated worker, under a
//!   wall-clock deadline
//! - [`coordinator`] collapses parameter changes into generation-numbered jobs
//!   and commits only the newest result
//! - [`playback`] tracks the selected place, playback, and drag-to-pan
//! - [`session`] ties the above together for a host event loop
//!
//! ```
//! use placefield::{
//!     Error,
//!     render::{GlyphCell, GridRequest, Sampler, Viewport},
//!     session::{Session, SessionConfig},
//! };
//! use std::time::{Duration, Instant};
//!
//! // A toy renderer which prints f(x_offset, y_offset) once per place
//! let renderer = |s: &Sampler, r: &GridRequest| -> Result<String, Error> {
//!     let v = s.sample(r.x_offset as f64, r.y_offset as f64)?;
//!     Ok(format!("place {}: {v}", r.place))
//! };
//! let mut session = Session::new(SessionConfig::default(), renderer);
//! session.resize(Viewport::new(640.0, 480.0), GlyphCell::new(8.0, 6.0));
//!
//! let start = Instant::now();
//! while session.frame().is_none() && start.elapsed() < Duration::from_secs(5) {
//!     session.poll(Instant::now());
//!     std::thread::sleep(Duration::from_millis(1));
//! }
//! assert_eq!(session.frame(), Some("place 6: 0"));
//! ```
#![warn(missing_docs)]

pub mod coordinator;
pub mod exec;
pub mod expr;
pub mod playback;
pub mod render;
pub mod session;

mod error;

pub use error::{Error, ErrorKind};
