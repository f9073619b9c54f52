//! # Hindsight
//!
//! Event-sourced session memory for AI coding assistants. Hindsight keeps
//! an append-only log of structured annotations ("boxes") emitted during
//! sessions and folds it into two injectable views: synthesized learnings
//! with confidence scores, and a prioritized subset of raw annotations.
//!
//! ## Architecture
//!
//! ```text
//! assistant output → Collector → append → Event Store (JSONL)
//!                                              ↓ read all
//!                                      Projection Engine
//!                                              ↓ views
//!                                     Ranking & Selection
//!                                              ↓ top-N
//!                                          Formatter → session context
//! ```
//!
//! All derived state is recomputed from scratch on every read; the log is
//! the only source of truth. The injection path is advisory and fails open:
//! any internal error degrades to "no context injected".
//!
//! ## Example
//!
//! ```ignore
//! use hindsight::{hooks, Config};
//! use hindsight::store::FileStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("config");
//!     let store = FileStore::new(&config.store.path);
//!     if let Some(context) = hooks::session_start(&config, &store, Some(".")).await {
//!         println!("{context}");
//!     }
//! }
//! ```

#![warn(missing_docs)]

/// Free-text scanning of annotation boxes into creation events.
pub mod collector;
/// Configuration management loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Rendering of selected views into the injected text block.
pub mod format;
/// Session lifecycle boundaries (start, end, oracle recording, status).
pub mod hooks;
/// Pure folds from the event log to scored current-state views.
pub mod projection;
/// Ranking and bounded selection of projected views.
pub mod ranking;
/// Event model, normalization, and the append-only store backends.
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
