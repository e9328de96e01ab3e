//! panelflow — asynchronous panel-rendering pipeline for large-image viewers.
//!
//! The pipeline keeps an interactive thread responsive while panels are
//! decoded and transformed in the background:
//!
//!   navigation/edit → [`PanelController`] → priority [`JobQueue`]
//!     → worker pool (decode + timeline replay) → event channel
//!     → controller routes results: always into the LRU [`RenderCache`],
//!       to the [`DisplaySink`] only when still current
//!
//! Foreground jobs (priority 0) render the focused panel for immediate
//! display; background jobs (priority 1) warm the cache across a sliding
//! prefetch window around the focus. Edits live in a bounded
//! [`Timeline`] of [`Operation`]s with linear undo/redo semantics; jobs
//! carry an immutable snapshot of the applied prefix, so workers never
//! race the interactive thread on the live history.
//!
//! The crate is the engine only. Window layout, input wiring, and the
//! process entry point belong to the embedding application, which
//! supplies the decode collaborator ([`decode::PanelDecoder`]) and the
//! display collaborator ([`DisplaySink`]).

pub mod cache;
pub mod config;
pub mod controller;
pub mod decode;
pub mod discover;
pub mod ops;
pub mod prefetch;
pub mod schedule;
pub mod timeline;
pub mod worker;

pub use cache::{RenderCache, RenderKey};
pub use config::PipelineConfig;
pub use controller::{DisplaySink, PanelController};
pub use decode::{DecodeError, FileDecoder, PanelDecoder};
pub use ops::{OpError, Operation};
pub use schedule::{JobQueue, Priority, RenderJob};
pub use timeline::{Timeline, TimelineSnapshot};
pub use worker::{RenderEvent, RenderedPanel};
