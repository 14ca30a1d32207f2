//! Run one mutator against one collector.
//!
//! Options come from `GC_HARNESS_*` environment variables, overridden by `name=value`
//! arguments, e.g. `gc-harness plan=SemiSpace steps=50000 stress_factor=65536`.

#[macro_use]
extern crate log;

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use enum_map::EnumMap;
use gc_harness::mutator::{ActionKind, MutatorContext};
use gc_harness::util::logger;
use gc_harness::{build_info, plan, HarnessError, Options, Runtime};

fn run(options: &Options) -> Result<(), HarnessError> {
    let table = options.probability_table()?;
    let plugin = plan::create(options.plan, options);
    let runtime = Arc::new(Runtime::new(plugin.as_ref(), options)?);
    let context = MutatorContext::new(runtime);
    let mut mutator = context.create_mutator(options.seed, table);

    let limit = (options.steps > 0).then_some(options.steps);
    let (sender, receiver) = crossbeam::channel::unbounded();
    let worker = thread::Builder::new()
        .name("mutator-0".to_string())
        .spawn(move || {
            let steps = mutator.run(limit, &sender);
            drop(mutator);
            steps
        })?;

    let mut counts: EnumMap<ActionKind, (u64, u64)> = EnumMap::default();
    for event in receiver.iter() {
        trace!("{}", event);
        let (applied, skipped) = &mut counts[event.kind];
        if event.object.is_null() {
            *skipped += 1;
        } else {
            *applied += 1;
        }
    }
    let steps = worker
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
    info!("{} steps done under {}", steps, context.runtime().plan_name());
    for (kind, (applied, skipped)) in counts {
        info!("  {:<12} {:>10} applied {:>10} without effect", kind, applied, skipped);
    }

    let runtime = context.runtime().clone();
    drop(context);
    let runtime = Arc::try_unwrap(runtime)
        .map_err(|runtime| HarnessError::RuntimeInUse(Arc::strong_count(&runtime) - 1))?;
    runtime.dispose()
}

fn main() -> ExitCode {
    if logger::try_init().is_err() {
        eprintln!("A logger was already installed");
    }
    info!(
        "gc-harness {} ({}, {} build, features: [{}])",
        build_info::PKG_VERSION,
        *build_info::GIT_VERSION,
        build_info::PROFILE,
        build_info::FEATURES
    );

    let mut options = Options::default();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let rejected = options.apply_arguments(args.iter().map(String::as_str));
    if !rejected.is_empty() {
        error!("Invalid arguments: {}", rejected.join(" "));
        return ExitCode::FAILURE;
    }
    debug!("{:?}", options);

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
