use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use trellis_core::{build, deps, Cache, Dep, Handle, Resolver};

/// The four-node diamond: d <- (b, c), c <- (a, b), b <- a.
fn diamond() -> Handle<String> {
    let a = build((), |_: Vec<String>| Ok("A".to_string()));
    let b = build(deps![&a], |args| Ok(format!("{}B", args[0])));
    let c = build(deps![&a, &b], |args| Ok(format!("{}{}C", args[0], args[1])));
    build(deps![&b, &c], |args| Ok(format!("{}{}D", args[0], args[1])))
}

/// A layered graph where every node depends on the whole previous layer.
fn layered(depth: usize, width: usize) -> Handle<String> {
    let mut layer: Vec<Handle<String>> = (0..width)
        .map(|i| build((), move |_: Vec<String>| Ok(i.to_string())))
        .collect();
    for _ in 0..depth {
        let previous: Vec<Dep<String>> = layer.iter().map(Dep::from).collect();
        layer = (0..width)
            .map(|_| build(previous.clone(), |args: Vec<String>| Ok(args.len().to_string())))
            .collect();
    }
    let roots: Vec<Dep<String>> = layer.iter().map(Dep::from).collect();
    build(roots, |args| Ok(args.concat()))
}

fn benchmark_diamond(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let target = diamond();
    let mut group = c.benchmark_group("diamond");

    group.bench_function("fresh_cache", |b| {
        b.iter(|| rt.block_on(async { black_box(target.call().await.unwrap()) }));
    });

    let no_yield = target
        .clone()
        .with_resolver(Resolver::new().with_yield_before_compute(false));
    group.bench_function("fresh_cache_no_yield", |b| {
        b.iter(|| rt.block_on(async { black_box(no_yield.call().await.unwrap()) }));
    });

    let warm = Cache::new();
    rt.block_on(target.call_with(&warm)).unwrap();
    group.bench_function("warm_cache", |b| {
        b.iter(|| rt.block_on(async { black_box(target.call_with(&warm).await.unwrap()) }));
    });

    group.finish();
}

fn benchmark_layered(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("layered");

    for depth in [4, 16, 64] {
        let target = layered(depth, 8);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &target, |b, target| {
            b.iter(|| rt.block_on(async { black_box(target.call().await.unwrap()) }));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_diamond, benchmark_layered);
criterion_main!(benches);
