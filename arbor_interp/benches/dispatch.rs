//! Dispatch-path benchmarks: specialized vs polymorphic vs megamorphic
//! arithmetic sites, and cached vs uncached pattern matching.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arbor_core::intern::intern;
use arbor_core::Value;
use arbor_interp::assembly::{NodeFactory, OpDesc};
use arbor_interp::nodes::arith::BinaryOp;
use arbor_interp::slots::ScopedName;
use arbor_interp::{Frame, InterpConfig, TreeRoot};

fn add_tree(config: InterpConfig) -> (Arc<TreeRoot>, Frame) {
    let factory = NodeFactory::new(
        config,
        Arc::new(arbor_interp::RegexCompiler),
        Arc::new(arbor_interp::NullDeoptSink),
    );
    let root = factory
        .build_root(&OpDesc::Seq(vec![
            OpDesc::Declare(ScopedName::plain("a")),
            OpDesc::Declare(ScopedName::plain("b")),
            OpDesc::binary(BinaryOp::Add, OpDesc::read("a"), OpDesc::read("b")),
        ]))
        .expect("bench tree builds");
    let frame = Frame::new(Arc::clone(root.layout()));
    (root, frame)
}

fn bench_specialized_int_add(c: &mut Criterion) {
    let (root, frame) = add_tree(InterpConfig::default());
    frame.set(0, Value::int(40));
    frame.set(1, Value::int(2));
    // Warm the guard.
    root.call_with_frame(&frame).unwrap();

    c.bench_function("add_specialized_int", |b| {
        b.iter(|| black_box(root.call_with_frame(&frame).unwrap()))
    });
}

fn bench_polymorphic_add(c: &mut Criterion) {
    let (root, frame) = add_tree(InterpConfig::default());
    frame.set(0, Value::int(1));
    frame.set(1, Value::int(2));
    root.call_with_frame(&frame).unwrap();
    frame.set(0, Value::float(1.0));
    frame.set(1, Value::float(2.0));
    root.call_with_frame(&frame).unwrap();

    c.bench_function("add_polymorphic_second_guard", |b| {
        b.iter(|| black_box(root.call_with_frame(&frame).unwrap()))
    });
}

fn bench_megamorphic_add(c: &mut Criterion) {
    let (root, frame) = add_tree(InterpConfig::default().with_poly_limit(1));
    frame.set(0, Value::int(1));
    frame.set(1, Value::int(2));
    root.call_with_frame(&frame).unwrap();
    frame.set(0, Value::float(1.0));
    frame.set(1, Value::float(2.0));
    root.call_with_frame(&frame).unwrap(); // flips megamorphic

    c.bench_function("add_megamorphic_generic", |b| {
        b.iter(|| black_box(root.call_with_frame(&frame).unwrap()))
    });
}

fn bench_pattern_cache_hit(c: &mut Criterion) {
    let factory = NodeFactory::default();
    let root = factory
        .build_root(&OpDesc::Match(
            Box::new(OpDesc::Const(Value::str(intern("bench-input-123")))),
            Box::new(OpDesc::Const(Value::str(intern("^[a-z-]+[0-9]+$")))),
            Box::new(OpDesc::Const(Value::str(intern("")))),
        ))
        .expect("bench tree builds");
    root.call().unwrap(); // compile once

    c.bench_function("pattern_match_cached", |b| {
        b.iter(|| black_box(root.call().unwrap()))
    });
}

criterion_group!(
    benches,
    bench_specialized_int_add,
    bench_polymorphic_add,
    bench_megamorphic_add,
    bench_pattern_cache_hit
);
criterion_main!(benches);
