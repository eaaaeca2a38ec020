use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The platform refused to hand out executable memory.
    #[error("failed to allocate {size} bytes of executable memory: {source}")]
    Allocation {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    /// Code was empty, or code plus trampoline record reached the size ceiling.
    #[error("code of {len} bytes violates the size ceiling of {limit} bytes")]
    SizeViolation { len: usize, limit: usize },

    /// The platform failed to unmap a region. The region is leaked.
    #[error("failed to release executable memory: {source}")]
    Free {
        #[source]
        source: std::io::Error,
    },

    #[error("code generation failed: {0}")]
    Codegen(String),

    #[error("stack underflow at op {0}")]
    StackUnderflow(usize),

    #[error("operand types do not match at op {0}")]
    TypeMismatch(usize),

    #[error("unknown argument block field: {0}")]
    UnknownField(String),
}

pub type Result<T> = std::result::Result<T, Error>;
