use rand::Rng;
use rawexec::codegen::{field_offset, FragmentCompiler, Op};
use rawexec::trampoline::{Direct, Indirect};
use rawexec::{ArgumentBlock, Caller, Loader, Trampoline};
use rayon::prelude::*;

#[repr(C)]
#[derive(ArgumentBlock, Default, Debug, Clone, Copy)]
struct Args {
    input: [f64; 2],
    out: f64,
}

fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

fn add_fragment() -> Vec<u8> {
    let input = field_offset::<Args>("input").unwrap();
    let out = field_offset::<Args>("out").unwrap();
    FragmentCompiler::builder()
        .build()
        .unwrap()
        .compile(&[
            Op::LoadF64(input),
            Op::LoadF64(input + 8),
            Op::Add,
            Op::StoreF64(out),
        ])
        .unwrap()
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_caller_is_shareable() {
    assert_send_sync::<Caller<Direct>>();
    assert_send_sync::<Caller<Indirect>>();
}

#[test]
fn test_round_trip_and_mutation() {
    init_logger();

    let caller = rawexec::load(&add_fragment()).unwrap();

    let mut args = Args {
        input: [1000.0, 2456.0],
        out: 0.0,
    };
    unsafe { caller.call_with(&mut args) };
    assert_eq!(args.out, 3456.0);

    args.input[0] = 2000.0;
    args.input[1] = 3456.0;
    unsafe { caller.call(&mut args as *mut Args as usize) };
    assert_eq!(args.out, 5456.0);

    caller.free().unwrap();
}

fn concurrent_calls<T: Trampoline>(loader: &Loader) {
    let caller = loader.load_with::<T>(&add_fragment()).unwrap();

    let mut rng = rand::rng();
    let mut blocks: Vec<Args> = (0..4096)
        .map(|_| Args {
            input: [
                rng.random_range(-1.0e6..1.0e6),
                rng.random_range(-1.0e6..1.0e6),
            ],
            out: f64::NAN,
        })
        .collect();

    blocks
        .par_iter_mut()
        .for_each(|args| unsafe { caller.call_with(args) });

    for args in &blocks {
        assert_eq!(args.out, args.input[0] + args.input[1]);
    }

    caller.free().unwrap();
}

#[test]
fn test_concurrent_calls_on_one_handle() {
    init_logger();

    let loader = Loader::new();
    concurrent_calls::<Direct>(&loader);
    concurrent_calls::<Indirect>(&loader);
    assert_eq!(loader.stats().live_regions, 0);
    assert_eq!(loader.stats().loads, 2);
}

#[test]
fn test_many_handles_across_threads() {
    init_logger();

    let loader = Loader::builder().region_quota(64).build();
    let code = add_fragment();

    (0..256).into_par_iter().for_each(|i| {
        // The quota may be momentarily exhausted by other threads.
        let Ok(caller) = loader.load(&code) else {
            return;
        };
        let mut args = Args {
            input: [i as f64, 0.5],
            out: 0.0,
        };
        unsafe { caller.call_with(&mut args) };
        assert_eq!(args.out, i as f64 + 0.5);
        caller.free().unwrap();
    });

    let stats = loader.stats();
    assert_eq!(stats.live_regions, 0);
    assert_eq!(stats.live_bytes, 0);
    assert!(stats.loads > 0);
}

// movsd xmm0, [arg]; addsd xmm0, [arg+8]; movsd [arg+16], xmm0; ret
#[cfg(all(target_arch = "x86_64", not(windows)))]
const ADD_SSE_AMD64: &[u8] = &[
    0xF2, 0x0F, 0x10, 0x07, //       movsd xmm0, [rdi]
    0xF2, 0x0F, 0x58, 0x47, 0x08, // addsd xmm0, [rdi+8]
    0xF2, 0x0F, 0x11, 0x47, 0x10, // movsd [rdi+16], xmm0
    0xC3, //                         ret
];

#[cfg(all(target_arch = "x86_64", windows))]
const ADD_SSE_AMD64: &[u8] = &[
    0xF2, 0x0F, 0x10, 0x01, //       movsd xmm0, [rcx]
    0xF2, 0x0F, 0x58, 0x41, 0x08, // addsd xmm0, [rcx+8]
    0xF2, 0x0F, 0x11, 0x41, 0x10, // movsd [rcx+16], xmm0
    0xC3, //                         ret
];

#[cfg(target_arch = "x86_64")]
#[test]
fn test_hand_assembled_fragment() {
    init_logger();

    let loader = Loader::new();
    let caller = loader.load(ADD_SSE_AMD64).unwrap();
    assert_eq!(caller.len(), ADD_SSE_AMD64.len() + caller.record_size());

    let mut args = Args {
        input: [1000.0, 2456.0],
        out: 0.0,
    };
    unsafe { caller.call_with(&mut args) };
    assert_eq!(args.out, 3456.0);

    args.input = [2000.0, 3456.0];
    unsafe { caller.call_with(&mut args) };
    assert_eq!(args.out, 5456.0);

    drop(caller);
    assert_eq!(loader.stats().live_regions, 0);
}
