//! Write-only metrics sink for the history service.
//!
//! Every emitted sample is labelled with the `operation` of a [`Scope`]; the
//! metric itself is one of the [`Counter`] or [`Timer`] definitions. Nothing in
//! the engine reads metrics back, so a failing registry never affects control
//! flow.

pub mod client;
pub mod defs;

pub use client::{MetricsClient, Stopwatch};
pub use defs::{Counter, Scope, Timer};
