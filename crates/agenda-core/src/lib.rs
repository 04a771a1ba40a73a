//! # agenda-core
//!
//! Deterministic iCalendar feed normalization and next-meeting selection.
//!
//! A raw feed is parsed into records, recurring series are expanded into a
//! bounded window with DST-correct instants, overrides and exceptions are
//! folded in, and the resulting identity-stable events are published as an
//! immutable snapshot. The selector then picks the "next or current" meeting
//! as a pure function of that snapshot and "now", so every consumer asking
//! with the same inputs gets the same answer.
//!
//! ## Modules
//!
//! - [`parser`] — iCalendar text → lazy sequence of raw event records
//! - [`timezone`] — wall-clock → UTC with the fixed DST policy
//! - [`expander`] — one record (+ overrides) → bounded, ordered occurrences
//! - [`normalizer`] — occurrences → identity-unique normalized events
//! - [`selector`] — (events, now) → primary / upcoming / later
//! - [`pipeline`] — parser → expander → normalizer over several documents
//! - [`refresh`] — single-flight refresh and atomic snapshot publication
//! - [`config`] — tuning values, loadable from TOML
//! - [`diagnostics`] — per-event warnings
//! - [`error`] — error types

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod expander;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod refresh;
pub mod selector;
pub mod timezone;
pub mod value;

pub use config::EngineConfig;
pub use diagnostics::{Diagnostics, Warning};
pub use error::EngineError;
pub use expander::{ExpansionWindow, RecurrenceExpander};
pub use model::{
    DateValue, EventEnd, EventId, EventStatus, NormalizedEvent, Occurrence, RawEventRecord,
    RecordKind, RecurrenceSet, SelectionResult,
};
pub use normalizer::{apply_hidden, normalize, HiddenSet};
pub use parser::{FeedParser, FeedRecords};
pub use pipeline::{Pipeline, PipelineOutput};
pub use refresh::{
    FeedFetcher, HiddenEventStore, InMemoryHiddenStore, RefreshCoordinator, RefreshOutcome,
    Snapshot,
};
pub use selector::select;
pub use timezone::TimeZoneResolver;
