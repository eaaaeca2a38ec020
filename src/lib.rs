//! Run raw machine code as an ordinary function call.
//!
//! [`load`] copies a byte sequence into freshly mapped executable memory and
//! hands back a [`Caller`]. Calling it jumps straight into the bytes with a
//! single machine word as argument, conventionally the address of a
//! caller-defined [`ArgumentBlock`] holding inputs and outputs:
//!
//! ```
//! use rawexec::codegen::{field_offset, FragmentCompiler, Op};
//! use rawexec::ArgumentBlock;
//!
//! #[repr(C)]
//! #[derive(ArgumentBlock)]
//! struct Args {
//!     input: [f64; 2],
//!     out: f64,
//! }
//!
//! # let input = field_offset::<Args>("input")?;
//! # let out = field_offset::<Args>("out")?;
//! # let code = FragmentCompiler::builder().build()?.compile(&[
//! #     Op::LoadF64(input),
//! #     Op::LoadF64(input + 8),
//! #     Op::Add,
//! #     Op::StoreF64(out),
//! # ])?;
//! let caller = rawexec::load(&code)?;
//! let mut args = Args { input: [1000.0, 2456.0], out: 0.0 };
//! unsafe { caller.call_with(&mut args) };
//! assert_eq!(args.out, 3456.0);
//!
//! args.input = [2000.0, 3456.0];
//! unsafe { caller.call_with(&mut args) };
//! assert_eq!(args.out, 5456.0);
//! caller.free()?;
//! # Ok::<(), rawexec::Error>(())
//! ```
//!
//! The bytes are trusted completely. Nothing here validates, sandboxes or
//! bounds-checks them, and the memory they live in stays writable.

extern crate self as rawexec;

pub mod block;
pub mod codegen;
mod error;
pub mod loader;
pub mod memory;
pub mod trampoline;

pub use block::ArgumentBlock;
pub use error::{Error, Result};
pub use loader::{load, Caller, Loader, LoaderBuilder, LoaderStats};
pub use trampoline::{HostTrampoline, Trampoline};
