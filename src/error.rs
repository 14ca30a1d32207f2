//! Error types.
//!
//! Each layer has its own error enum; [`HarnessError`] gathers them for the driver and for
//! operations that cross layers, such as allocating an object through a plan.

use thiserror::Error;

use crate::mutator::ActionKind;
use crate::util::Address;

/// A structure could not be completed because one of its field requests is malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("invalid field `{field}` in structure `{structure}`: {reason}")]
    InvalidField {
        structure: String,
        field: String,
        reason: String,
    },
    #[error("invalid alignment {alignment} in structure `{structure}`")]
    InvalidAlignment { structure: String, alignment: usize },
}

/// Failures of the object model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectModelError {
    /// The block's header names a type the model never generated.
    #[error("unknown type id {type_id}")]
    UnknownTypeId { type_id: usize },
    /// The runtime accessor was queried before the object model was installed.
    #[error("the object model has not been built yet")]
    NotInitialized,
    /// A plan looked for a header field it did not contribute.
    #[error("the object header has no field named `{0}`")]
    MissingHeaderField(String),
}

/// Allocation failures reported by a memory manager.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// The system allocator returned nothing.
    #[error("the system allocator could not provide {size} bytes")]
    OutOfMemory { size: usize },
    /// A block was handed to a manager that does not own it.
    #[error("block {block} is not owned by this memory manager")]
    UnknownBlock { block: Address },
}

/// Invalid harness configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("a probability table needs at least one entry")]
    EmptyTable,
    #[error("stack depth {depth} appears more than once in the probability table")]
    DuplicateDepth { depth: usize },
    #[error("percentage {value} for {kind} at stack depth {depth} is above 100")]
    PercentageOutOfRange {
        depth: usize,
        kind: ActionKind,
        value: u32,
    },
    #[error("the probability entry for stack depth {depth} enables no action")]
    NoActions { depth: usize },
    #[error("{type_count} object type(s) leave nothing to allocate; at least 2 are needed")]
    TooFewTypes { type_count: usize },
    #[error("cannot parse probability entry `{entry}`: {reason}")]
    Parse { entry: String, reason: String },
}

/// Anything that can go wrong while driving a collector.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    ObjectModel(#[from] ObjectModelError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The system memory manager still holds blocks when the runtime is disposed.
    #[error("{count} system allocation(s) totalling {bytes} bytes were never freed")]
    Leak { count: usize, bytes: usize },
    #[error("no GC plan named `{name}` (available: {available})")]
    UnknownPlan { name: String, available: String },
    /// The runtime is still shared by a mutator context when the driver tries to dispose it.
    #[error("the runtime is still referenced by {0} other owner(s)")]
    RuntimeInUse(usize),
    #[error("cannot spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
