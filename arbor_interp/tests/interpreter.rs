//! End-to-end interpreter tests: assembled trees driven through
//! specialization, rewriting, caching, and instrumentation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arbor_core::intern::intern;
use arbor_core::Value;
use arbor_interp::assembly::{NodeFactory, OpDesc};
use arbor_interp::compile_cache::RegexCompiler;
use arbor_interp::nodes::arith::BinaryOp;
use arbor_interp::slots::{ScopedName, SlotKind, SlotTable};
use arbor_interp::specialize::{CountingDeoptSink, DeoptReason, NullDeoptSink};
use arbor_interp::wrapper::{InstrumentHook, ProbeWrapper};
use arbor_interp::{Frame, InterpConfig, Node};

fn factory_with(config: InterpConfig, sink: Arc<CountingDeoptSink>) -> NodeFactory {
    NodeFactory::new(config, Arc::new(RegexCompiler), sink)
}

/// Build `a + b` over two function-level slots and return (root, frame).
fn add_site(config: InterpConfig, sink: Arc<CountingDeoptSink>) -> (Arc<arbor_interp::TreeRoot>, Frame) {
    let factory = factory_with(config, sink);
    let root = factory
        .build_root(&OpDesc::Seq(vec![
            OpDesc::Declare(ScopedName::plain("a")),
            OpDesc::Declare(ScopedName::plain("b")),
            OpDesc::binary(BinaryOp::Add, OpDesc::read("a"), OpDesc::read("b")),
        ]))
        .unwrap();
    let frame = Frame::new(Arc::clone(root.layout()));
    (root, frame)
}

#[test]
fn test_program_with_blocks_and_arithmetic() {
    let factory = NodeFactory::default();
    // total = 0; { inner x = 3; total = total + x * x }; total + 1
    let root = factory
        .build_root(&OpDesc::Seq(vec![
            OpDesc::write("total", OpDesc::Const(Value::int(0))),
            OpDesc::Block {
                decls: vec![ScopedName::plain("x")],
                body: Box::new(OpDesc::Seq(vec![
                    OpDesc::write("x", OpDesc::Const(Value::int(3))),
                    OpDesc::write(
                        "total",
                        OpDesc::binary(
                            BinaryOp::Add,
                            OpDesc::read("total"),
                            OpDesc::binary(BinaryOp::Mul, OpDesc::read("x"), OpDesc::read("x")),
                        ),
                    ),
                ])),
            },
            OpDesc::binary(
                BinaryOp::Add,
                OpDesc::read("total"),
                OpDesc::Const(Value::int(1)),
            ),
        ]))
        .unwrap();
    assert_eq!(root.call().unwrap().as_int(), Some(10));
    // Warm activations keep agreeing once the sites are specialized.
    for _ in 0..100 {
        assert_eq!(root.call().unwrap().as_int(), Some(10));
    }
}

#[test]
fn test_specialization_progression_to_megamorphic() {
    // Shape progression at one site: int+int, float+float, int+float,
    // str+str past a limit of 3 flips the site megamorphic with exactly
    // one polymorphic-overflow invalidation, and results stay correct.
    let sink = Arc::new(CountingDeoptSink::new());
    let (root, frame) = add_site(InterpConfig::default().with_poly_limit(3), sink.clone());

    let drive = |l: Value, r: Value| {
        frame.set(0, l);
        frame.set(1, r);
        root.call_with_frame(&frame).unwrap()
    };

    assert_eq!(drive(Value::int(1), Value::int(2)).as_int(), Some(3));
    assert_eq!(
        drive(Value::float(0.5), Value::float(0.25)).as_float(),
        Some(0.75)
    );
    assert_eq!(drive(Value::int(1), Value::float(0.5)).as_float(), Some(1.5));
    assert_eq!(sink.total(), 0);

    let concat = drive(
        Value::str(intern("mega")),
        Value::str(intern("morphic")),
    );
    assert_eq!(concat.as_str().map(|s| s.as_str()), Some("megamorphic"));
    assert_eq!(sink.count(DeoptReason::PolymorphicOverflow), 1);

    // Generic path from here on, still correct for every shape.
    assert_eq!(drive(Value::int(20), Value::int(22)).as_int(), Some(42));
    assert_eq!(drive(Value::float(1.0), Value::int(2)).as_float(), Some(3.0));
}

#[test]
fn test_overflow_scenario_matches_float_result() {
    let sink = Arc::new(CountingDeoptSink::new());
    let (root, frame) = add_site(InterpConfig::default(), sink.clone());

    frame.set(0, Value::int(2));
    frame.set(1, Value::int(3));
    assert_eq!(root.call_with_frame(&frame).unwrap().as_int(), Some(5));

    frame.set(0, Value::int(i64::MAX));
    frame.set(1, Value::int(1));
    let overflowed = root.call_with_frame(&frame).unwrap();
    assert!(overflowed.is_float());
    assert_eq!(
        overflowed.as_float(),
        Some(i64::MAX as f64 + 1.0)
    );
    assert_eq!(sink.count(DeoptReason::Overflow), 1);

    // Small ints keep working on the generic path.
    frame.set(0, Value::int(1));
    frame.set(1, Value::int(1));
    assert_eq!(root.call_with_frame(&frame).unwrap().as_int(), Some(2));
}

#[test]
fn test_rewrite_under_concurrent_readers() {
    // Readers hammer the site while the driver thread pushes it through
    // every specialization state, including the structural swap to the
    // generic node. Every observed result must be a valid outcome for
    // the operands in the frame at that moment.
    let sink = Arc::new(CountingDeoptSink::new());
    let (root, _) = add_site(InterpConfig::default().with_poly_limit(2), sink);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let root = Arc::clone(&root);
            std::thread::spawn(move || {
                let frame = Frame::new(Arc::clone(root.layout()));
                frame.set(0, Value::int(3));
                frame.set(1, Value::int(4));
                for _ in 0..2_000 {
                    assert_eq!(root.call_with_frame(&frame).unwrap().as_int(), Some(7));
                }
            })
        })
        .collect();

    let driver = Frame::new(Arc::clone(root.layout()));
    let shape_pairs = [
        (Value::int(1), Value::int(2)),
        (Value::float(1.0), Value::float(2.0)),
        (Value::int(1), Value::float(2.0)),
        (Value::str(intern("a")), Value::str(intern("b"))),
    ];
    for (l, r) in shape_pairs {
        driver.set(0, l);
        driver.set(1, r);
        root.call_with_frame(&driver).unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_cache_contention_many_threads_one_key() {
    let factory = NodeFactory::default();
    let root = factory
        .build_root(&OpDesc::Seq(vec![
            OpDesc::Declare(ScopedName::plain("s")),
            OpDesc::Match(
                Box::new(OpDesc::read("s")),
                Box::new(OpDesc::Const(Value::str(intern("^[a-z]+[0-9]+$")))),
                Box::new(OpDesc::Const(Value::str(intern("")))),
            ),
        ]))
        .unwrap();

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let root = Arc::clone(&root);
            std::thread::spawn(move || {
                let frame = Frame::new(Arc::clone(root.layout()));
                frame.set(0, Value::str(intern(&format!("worker{}", i))));
                for _ in 0..200 {
                    assert_eq!(root.call_with_frame(&frame).unwrap().as_bool(), Some(true));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
fn test_keep_all_hatch_never_degrades() {
    let sink = Arc::new(CountingDeoptSink::new());
    let factory = factory_with(
        InterpConfig::default().with_cache_limit(2).keep_all(),
        sink.clone(),
    );
    let root = factory
        .build_root(&OpDesc::Seq(vec![
            OpDesc::Declare(ScopedName::plain("p")),
            OpDesc::Match(
                Box::new(OpDesc::Const(Value::str(intern("steady")))),
                Box::new(OpDesc::read("p")),
                Box::new(OpDesc::Const(Value::str(intern("")))),
            ),
        ]))
        .unwrap();

    let frame = Frame::new(Arc::clone(root.layout()));
    for p in ["s", "t+", "ea", "dy$", "^st"] {
        frame.set(0, Value::str(intern(p)));
        assert_eq!(root.call_with_frame(&frame).unwrap().as_bool(), Some(true));
    }
    assert_eq!(sink.count(DeoptReason::CacheOverflow), 0);
}

#[test]
fn test_probe_observes_every_activation_across_rewrites() {
    struct Counter(AtomicU64);
    impl InstrumentHook for Counter {
        fn on_return(&self, _n: &dyn Node, _f: &Frame, _v: &Value) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    let factory = NodeFactory::new(
        InterpConfig::default().with_poly_limit(1),
        Arc::new(RegexCompiler),
        Arc::new(NullDeoptSink),
    );
    let root = factory
        .build_root_unfrozen(&OpDesc::Seq(vec![
            OpDesc::Declare(ScopedName::plain("a")),
            OpDesc::Declare(ScopedName::plain("b")),
            OpDesc::binary(BinaryOp::Add, OpDesc::read("a"), OpDesc::read("b")),
        ]))
        .unwrap();
    let hook = Arc::new(Counter(AtomicU64::new(0)));
    ProbeWrapper::insert(&root, root.body(), hook.clone()).unwrap();
    root.freeze();

    let frame = Frame::new(Arc::clone(root.layout()));
    let shape_pairs = [
        (Value::int(1), Value::int(2)),
        (Value::float(1.0), Value::float(2.0)), // pushes past limit 1
        (Value::int(3), Value::int(4)),
    ];
    for (l, r) in shape_pairs {
        frame.set(0, l);
        frame.set(1, r);
        root.call_with_frame(&frame).unwrap();
    }
    // The wrapper survived the inner site's rewrite and saw all three.
    assert_eq!(hook.0.load(Ordering::Relaxed), 3);
}

#[test]
fn test_scope_view_from_nested_frames() {
    let mut outer = SlotTable::function_level();
    outer.add_slot("visible", 0, SlotKind::Value).unwrap();
    let outer_frame = Frame::new(outer.close());
    outer_frame.set(0, Value::int(1));

    let mut inner = SlotTable::block_level();
    inner.add_slot("local", 0, SlotKind::Value).unwrap();
    let inner_frame = Frame::new_child(inner.close(), &outer_frame);
    inner_frame.set(1, Value::int(2));

    let names: Vec<String> = arbor_interp::introspect::ScopeView::of(&inner_frame)
        .visible()
        .into_iter()
        .map(|(name, _)| name.name().as_str().to_string())
        .collect();
    assert_eq!(names, vec!["local".to_string(), "visible".to_string()]);
}
