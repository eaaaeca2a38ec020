//! Produces small machine code fragments for the host with Cranelift.
//!
//! A fragment is a straight-line stack program over an argument block: it
//! loads fields through the pointer it is called with, does arithmetic and
//! stores results back. The output is position independent and follows the
//! calling convention [`Caller::call`](crate::Caller::call) uses.

mod builder;
mod compiler;

pub use builder::FragmentCompilerBuilder;
pub use compiler::FragmentCompiler;

use crate::block::ArgumentBlock;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // Argument block access, by byte offset
    LoadF64(i32),
    LoadI64(i32),
    StoreF64(i32),
    StoreI64(i32),

    // Constants
    PushF64(f64),
    PushI64(i64),

    // Arithmetic on the two topmost values of matching type
    Add,
    Sub,
    Mul,
    Div,
    Neg,
}

/// Byte offset of field `name` in `A`, ready for a load or store op.
pub fn field_offset<A: ArgumentBlock>(name: &str) -> Result<i32> {
    A::offset_of(name)
        .and_then(|offset| i32::try_from(offset).ok())
        .ok_or_else(|| Error::UnknownField(name.to_string()))
}
