use std::hint::black_box;

use criterion::Criterion;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use gc_harness::mutator::{EvaluationMode, ProbabilityTable};
use gc_harness::plan::{self, PlanSelector};
use gc_harness::{Options, Runtime};

pub fn bench(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    for mode in [EvaluationMode::Flat, EvaluationMode::Override, EvaluationMode::Sequence] {
        let table = ProbabilityTable::preset(mode);
        c.bench_function(&format!("probability_draw_{}", mode), |b| {
            b.iter(|| black_box(table.draw(black_box(7), &mut rng)))
        });
    }

    let mut options = Options::builtin();
    options.stress_factor = 0;
    let plugin = plan::create(PlanSelector::NoGC, &options);
    let runtime = Runtime::new(plugin.as_ref(), &options).unwrap();
    c.bench_function("allocate_and_free", |b| {
        b.iter(|| {
            let object = runtime.allocate_random_object(&mut rng).unwrap();
            let block = runtime.object_model().object_to_block(object);
            runtime.manager().free(black_box(block));
        })
    });
    runtime.dispose().unwrap();
}
