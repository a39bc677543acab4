//! Scry: reverse image search aggregation and link previews, rendered as
//! images.
//!
//! # Architecture
//!
//! - **Image search**: one task per engine (SauceNAO, IQDB, trace.moe,
//!   Fluffle), run concurrently, merged and ranked by similarity
//! - **Link preview**: links are dispatched by host to a site handler
//!   (e621, Rule34, Bluesky, Bilibili, YouTube, FurAffinity) that fetches, caches and shapes the
//!   post into a template document
//! - **Rendering**: documents are turned into JPEGs by a remote screenshot
//!   service through the [`scry_core::Renderer`] seam
//!
//! Backend registries, merge rules and artifact lifetimes live in
//! [`scry_core`]; this crate supplies the network-facing backends.

pub mod config;
pub mod error;
pub mod http;
pub mod image_search;
pub mod link_preview;
pub mod logging;
pub mod renderer;
pub mod scry_dirs;
pub mod similarity;
pub mod storage;

pub use config::{ConfigSource, ScryConfig};
pub use error::{Result, ScryError};
pub use image_search::{EngineContext, ImageEngine, ImageSearch, SearchInput, SearchRequest};
pub use link_preview::{LinkPreviewer, Preview, PreviewCard, PreviewContext};
pub use renderer::{JsonRenderer, RemoteRenderer};
pub use storage::FileCache;
