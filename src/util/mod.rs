//! Utilities shared by the layout engine, the runtime and the built-in plans.

/// Address and object reference types, and address arithmetic.
pub mod address;
/// Word and byte constants.
pub mod constants;
/// Alignment helpers.
pub mod conversions;
/// The built-in env_logger.
pub mod logger;
/// Wrappers around the system allocator.
pub mod malloc;
/// Raw memory operations on [`Address`] ranges.
pub mod memory;
/// Harness options, settable from `GC_HARNESS_*` environment variables.
pub mod options;
/// Helpers for tests that need serialization, cleanup or a deadline.
#[cfg(test)]
pub mod test_util;

pub use self::address::Address;
pub use self::address::ObjectReference;
