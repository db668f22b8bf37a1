//! Structured logging with rule-based routing and ordered, transactional storage.
//!
//! Records carry typed, tagged fields. [`rule::Rule`]s decide which records
//! reach which [`backend::Backend`]s; backends can be filtered, buffered,
//! fanned out, and persisted into a [`store::Storer`].
//!
//! # Examples
//!
//! Filtering with a rule:
//! ```
//! use fieldlog::{
//!     record::Entry,
//!     rule::{Operator, Rule},
//!     types::Level,
//! };
//!
//! let rule = Rule::and([
//!     Rule::compare(Operator::Ge, "level", Level::Warn),
//!     Rule::compare(Operator::Contains, "msg", "disk"),
//! ]);
//! assert!(rule.evaluate(&Entry::new(Level::Error, "disk full")).unwrap());
//! assert!(!rule.evaluate(&Entry::new(Level::Info, "disk full")).unwrap());
//! ```
//!
//! Buffered delivery into a SQLite-backed store:
//! ```no_run
//! use std::sync::Arc;
//!
//! use fieldlog::{
//!     backend::{buffer::{BufferConfig, Buffered}, store_sink::StoreSink, Backend},
//!     format::TemplateFormatter,
//!     logger::Logger,
//!     record::Entry,
//!     store::sqlite::{SqliteStore, SqliteStoreConfig},
//!     types::Level,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteStore::open("log.db", SqliteStoreConfig::default()).expect("open sqlite");
//! let sink = StoreSink::<Entry>::new(Arc::new(store));
//! sink.set_formatter(Arc::new(TemplateFormatter::standard()));
//! let buffered = Arc::new(Buffered::<Entry>::spawn(sink, BufferConfig::default()));
//!
//! let log = Logger::new(buffered.clone()).with_domain("billing");
//! log.set_level("all", Level::Info);
//! log.info("invoice sent").await;
//! buffered.close().await.expect("drain");
//! # }
//! ```
#![deny(missing_docs)]

/// Record sinks and their decorators.
pub mod backend;
/// Process-wide failure hook.
pub mod failure;
/// Record formatters.
pub mod format;
/// Entry-producing logger handle.
pub mod logger;
/// Record contract and the reference entry type.
pub mod record;
/// Boolean rules over record fields.
pub mod rule;
/// Ordered transactional key-value stores.
pub mod store;
/// Shared primitive types.
pub mod types;
