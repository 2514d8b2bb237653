// src/events/mod.rs

//! Lifecycle events and the bus that distributes them.
//!
//! - [`event`] defines the immutable [`Event`] record and [`EventKind`].
//! - [`handler`] defines the [`Handle`] subscriber trait and two stock
//!   implementations.
//! - [`bus`] implements the synchronous [`EventBus`] with bounded history.

pub mod bus;
pub mod event;
pub mod handler;

pub use bus::{EventBus, DEFAULT_HISTORY_CAPACITY};
pub use event::{Event, EventKind};
pub use handler::{FnHandler, Handle, LogHandler};
