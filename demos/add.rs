use log::{debug, warn};
use rawexec::codegen::{field_offset, FragmentCompiler, Op};
use rawexec::ArgumentBlock;
use std::error::Error;
use std::fs;

const BIN_FNAME: &str = "rawexec_add.bin";

#[repr(C)]
#[derive(ArgumentBlock, Debug)]
struct Args {
    input: [f64; 2],
    out: f64,
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    // Assemble out = input[0] + input[1] for this machine
    let input = field_offset::<Args>("input")?;
    let out = field_offset::<Args>("out")?;
    let compiler = FragmentCompiler::builder().build()?;
    let bin = compiler.compile(&[
        Op::LoadF64(input),
        Op::LoadF64(input + 8),
        Op::Add,
        Op::StoreF64(out),
    ])?;
    debug!("{} bytes for {}", bin.len(), compiler.triple());

    // Round-trip through a file the way an external assembler would hand it over
    let bin_path = std::env::temp_dir().join(BIN_FNAME);
    fs::write(&bin_path, &bin)?;
    let bin = fs::read(&bin_path)?;
    if let Err(err) = fs::remove_file(&bin_path) {
        warn!("failed to delete `{}`: {err}", bin_path.display());
    }

    let caller = rawexec::load(&bin)?;

    let mut args = Args {
        input: [1000.0, 2456.0],
        out: 0.0,
    };
    unsafe { caller.call_with(&mut args) };
    println!("Result: {}", args.out); // 3456

    args.input = [2000.0, 3456.0];
    unsafe { caller.call_with(&mut args) };
    println!("Updated Result: {}", args.out); // 5456

    caller.free()?;
    Ok(())
}
