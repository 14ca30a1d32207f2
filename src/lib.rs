//! gc-harness drives pluggable garbage collectors against a synthetic managed heap.
//!
//! The harness owns everything a collector would normally get from a language runtime:
//!
//! * a [layout engine](layout) that turns field declarations into concrete byte offsets
//!   and gives typed access to fields inside raw memory blocks,
//! * an [object model](object_model) that generates a seeded universe of object types
//!   sharing a common header, part of which is contributed by the collector,
//! * a [runtime](runtime) that allocates objects through the collector and exposes the
//!   services a collector calls back into,
//! * a [collection session](collection) protocol that stops the mutators, hands out roots,
//!   and accepts relocations,
//! * a randomized [mutator](mutator) that builds and rewires an object graph by a
//!   depth-keyed probability table.
//!
//! Collectors plug in through the traits in [`gc`]. Three of them ship with the crate in
//! [`plan`]: a non-collecting baseline, a mark-sweep collector and a copying collector.
//!
//! A minimal session looks like this:
//!
//! ```ignore
//! let options = Options::default();
//! let plugin = plan::create(options.plan, &options);
//! let runtime = Arc::new(Runtime::new(&*plugin, &options)?);
//! let context = MutatorContext::new(runtime.clone());
//! let mut mutator = context.create_mutator(options.seed, options.probability_table()?);
//! mutator.run(Some(10_000), &sink)?;
//! ```

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate static_assertions;

pub mod build_info;
pub mod collection;
pub mod error;
pub mod gc;
pub mod layout;
pub mod mutator;
pub mod object_model;
pub mod plan;
pub mod runtime;
pub mod util;

pub use crate::error::HarnessError;
pub use crate::runtime::Runtime;
pub use crate::util::options::Options;
pub use crate::util::{Address, ObjectReference};
