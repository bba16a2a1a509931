//! Interactive recursive grep with ordered parallel output.
//!
//! Two cores, one engine:
//! - The **output coordination core** ([`output`]) lets many per-file
//!   worker threads stream buffered text to one sink, either in completion
//!   order or strictly sorted by slot, with cooperative cancellation and
//!   an annotated hex-dump subcomponent.
//! - The **interactive query core** ([`query`]) re-runs the search as the
//!   pattern is edited, draining partial results through a non-blocking
//!   pipe into a paged viewport.
//!
//! Data flow (batch):
//!
//! ```text
//! Pattern -> Engine -> Walker -> JobQueue -> Worker -> Writer
//!                                             |          |
//!                                          HexDumper  BufferChain
//!                                                        |
//!                                        Synchronizer-gated Sink
//! ```
//!
//! In interactive mode the sink is an in-process pipe; the UI thread
//! drains its read end into the viewport between keystrokes.

pub mod engine;
pub mod flags;
pub mod logging;
pub mod output;
pub mod pipe;
pub mod query;

pub use engine::{run_search, EngineError};
pub use flags::{SearchConfig, SortKey};
pub use output::{Sink, Totals};
