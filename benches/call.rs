use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rawexec::codegen::{FragmentCompiler, Op};
use rawexec::trampoline::{Direct, Indirect};
use rawexec::{ArgumentBlock, Loader};

#[repr(C)]
#[derive(ArgumentBlock, Default)]
struct Args {
    input: [f64; 2],
    out: f64,
}

fn add_fragment() -> Vec<u8> {
    FragmentCompiler::builder()
        .build()
        .unwrap()
        .compile(&[Op::LoadF64(0), Op::LoadF64(8), Op::Add, Op::StoreF64(16)])
        .unwrap()
}

/// Benchmark calling loaded code against the native equivalent
fn benchmark_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("Call loaded add fragment");

    let code = add_fragment();
    let loader = Loader::new();
    let direct = loader.load_with::<Direct>(&code).unwrap();
    let indirect = loader.load_with::<Indirect>(&code).unwrap();
    let mut args = Args {
        input: [1000.0, 2456.0],
        out: 0.0,
    };

    group.bench_function("direct", |b| {
        b.iter(|| unsafe { direct.call_with(black_box(&mut args)) })
    });

    group.bench_function("trampoline_record", |b| {
        b.iter(|| unsafe { indirect.call_with(black_box(&mut args)) })
    });

    group.bench_function("native_rust", |b| {
        b.iter(|| {
            let args = black_box(&mut args);
            args.out = args.input[0] + args.input[1];
        })
    });

    group.finish();
}

/// Benchmark the full load/free cycle
fn benchmark_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("Load and free");

    let code = add_fragment();
    let loader = Loader::new();

    group.bench_function("load_free", |b| {
        b.iter(|| loader.load(black_box(&code)).unwrap().free().unwrap())
    });

    group.bench_function("compile_load_free", |b| {
        b.iter(|| loader.load(&add_fragment()).unwrap().free().unwrap())
    });

    group.finish();
}

criterion_group!(benches, benchmark_call, benchmark_load);
criterion_main!(benches);
