use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{Event, Graph, GraphBuilder, NullSink, SessionConfig};

/// A chain of `depth` memos over one input, ending in an output.
fn chain(depth: usize) -> Graph {
    let mut builder = GraphBuilder::new();
    builder.input("n0", 0_u64).unwrap();
    for i in 1..=depth {
        let dep = format!("n{}", i - 1);
        let name = format!("n{i}");
        let read = dep.clone();
        builder
            .memo(name, &[dep.as_str()], move |reads| {
                Ok(reads.named::<u64>(&read)?.wrapping_add(1))
            })
            .unwrap();
    }
    let last = format!("n{depth}");
    let read = last.clone();
    builder
        .output("view", &[last.as_str()], move |reads| {
            Ok(*reads.named::<u64>(&read)?)
        })
        .unwrap();
    builder.build().unwrap()
}

/// `width` independent input/output pairs.
fn fan(width: usize) -> Graph {
    let mut builder = GraphBuilder::new();
    for i in 0..width {
        let input = format!("in{i}");
        let read = input.clone();
        builder.input(input.clone(), 0_u64).unwrap();
        builder
            .output(format!("out{i}"), &[input.as_str()], move |reads| {
                Ok(*reads.named::<u64>(&read)? * 2)
            })
            .unwrap();
    }
    builder.build().unwrap()
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_sweep");
    for depth in [10, 100, 1000] {
        let graph = chain(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &graph, |b, graph| {
            let mut session = graph.session(SessionConfig::default(), NullSink).unwrap();
            let mut value = 0_u64;
            b.iter(|| {
                value += 1;
                black_box(session.dispatch(Event::set("n0", value)));
            });
        });
    }
    group.finish();
}

fn bench_cache_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_single_change");
    for width in [10, 100, 1000] {
        let graph = fan(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &graph, |b, graph| {
            let mut session = graph.session(SessionConfig::default(), NullSink).unwrap();
            session.dispatch(Event::Refresh);
            let mut value = 0_u64;
            b.iter(|| {
                value += 1;
                black_box(session.dispatch(Event::set("in0", value)));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain, bench_cache_hits);
criterion_main!(benches);
