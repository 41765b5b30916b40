//! Source crate
//!
//! Turns one bounded table into key-range splits and hands them to a fixed number of
//! in-process reader subtasks.
//!
//! Flow: [`BoundaryScanner`] finds the key domain, [`RangePartitioner`] cuts it into
//! splits, [`SplitEnumerator`] assigns them through each subtask's [`EnumeratorContext`],
//! and [`SourceReader`]s read them. [`ParallelSource`] wires the whole run together.

pub mod boundary;
pub mod config;
pub mod context;
pub mod enumerator;
pub mod ledger;
pub mod parallel;
pub mod partitioner;
pub mod reader;
pub mod registry;
pub mod source;
pub mod state;
pub mod type_mapping;

pub use boundary::{BoundaryScanner, KeyDomain};
pub use config::SourceSettings;
pub use context::{EnumeratorContext, ReaderEvent, ReaderInbox, SourceEvent, SubtaskId};
pub use enumerator::{EnumeratorPhase, SplitEnumerator, SplitPlan};
pub use ledger::AssignmentLedger;
pub use parallel::{ParallelSource, SourceOutput};
pub use partitioner::RangePartitioner;
pub use reader::{ReaderStats, SourceReader, SplitBatch};
pub use registry::SubtaskRegistry;
pub use source::{BoundedSource, Boundedness, PreparedSource};
pub use state::EnumeratorState;
pub use type_mapping::{DefaultTypeMapper, FieldType, RowType, TypeMapper};
