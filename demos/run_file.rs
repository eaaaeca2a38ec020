use log::info;
use rawexec::ArgumentBlock;
use std::error::Error;

#[repr(C)]
#[derive(ArgumentBlock, Debug, Default)]
struct Block {
    words: [u64; 8],
}

/// Loads a raw binary and calls it once with a zeroed 64-byte block.
///
/// Usage: `cargo run --example run_file -- code.bin [word0 word1 ...]`
fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: run_file <code.bin> [words...]")?;

    let mut block = Block::default();
    for (slot, word) in block.words.iter_mut().zip(args) {
        *slot = word.parse()?;
    }

    let bin = std::fs::read(&path)?;
    info!("loading {} bytes from {path}", bin.len());

    let caller = rawexec::load(&bin)?;
    unsafe { caller.call_with(&mut block) };
    caller.free()?;

    for (i, word) in block.words.iter().enumerate() {
        println!("[{i}] {word:#018x} ({})", f64::from_bits(*word));
    }
    Ok(())
}
