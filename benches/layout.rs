use std::hint::black_box;

use criterion::Criterion;

use gc_harness::layout::{LayoutContext, StructureBuilder};
use gc_harness::util::malloc;

pub fn bench(c: &mut Criterion) {
    let mut builder = StructureBuilder::new(LayoutContext::new(), "bench");
    builder.define_field("flags").set_bits(3, 3);
    builder.define_field("count").set_size(4);
    builder.define_field("next").set_reference();
    builder.define_field("wide").set_bits(19, 12).set_offset(16);
    let layout = builder.complete().unwrap();
    let block = malloc::calloc(1, layout.aligned_size());

    let count = layout.field_by_name("count").unwrap();
    c.bench_function("field_scalar_store_load", |b| {
        b.iter(|| unsafe {
            count.store::<u32>(block, black_box(42));
            black_box(count.load::<u32>(block))
        })
    });

    let wide = layout.field_by_name("wide").unwrap();
    c.bench_function("field_bits_store_load", |b| {
        b.iter(|| unsafe {
            wide.store_bits(block, black_box(0x5a5));
            black_box(wide.load_bits(block))
        })
    });

    let next = layout.field_by_name("next").unwrap();
    c.bench_function("field_reference_store_load", |b| {
        b.iter(|| unsafe {
            next.store_reference(block, black_box(block));
            black_box(next.load_reference(block))
        })
    });

    c.bench_function("structure_complete", |b| {
        b.iter(|| black_box(builder.complete().unwrap()))
    });

    malloc::free(block);
}
