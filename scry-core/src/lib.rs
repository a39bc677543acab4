//! # scry-core
//!
//! Pluggable backend aggregation shared by scry's image search and link
//! preview.
//!
//! A request picks one or more backends from a [`Registry`] (or a
//! [`LinkDispatcher`] for links), prepares a [`Task`] per backend, runs the
//! tasks concurrently and folds each outcome into an [`Accumulator`]. The
//! accumulators are merged under a similarity threshold and a count limit
//! and rendered once by a [`Renderer`].
//!
//! ## Design
//!
//! - Registries are built once by explicit builder functions and never mutated afterwards
//! - Preparing a task never fails; validation errors surface when it executes
//! - A failing backend only affects its own diagnostic record
//! - Merge output is independent of backend completion order
//! - Temporary artifacts are released on every exit path, including cancellation
//!
//! This crate performs no network I/O of its own.

pub mod accumulator;
pub mod artifact;
pub mod dispatch;
pub mod error;
pub mod patterns;
pub mod race;
pub mod rank;
pub mod registry;
pub mod render;
pub mod task;
pub mod types;

pub use accumulator::{Accumulator, Harvest, MergeLimits};
pub use artifact::{ArtifactScope, ArtifactSet, TempArtifact};
pub use dispatch::{Link, LinkDispatcher, Resolved, Route};
pub use error::{BackendError, Result};
pub use patterns::LinkPatterns;
pub use race::{race_ready, Lease};
pub use registry::Registry;
pub use render::{auto_quality, Quality, RenderOptions, RenderRequest, Renderer};
pub use task::Task;
pub use types::{Detail, Mark, ResultItem, Similarity};
