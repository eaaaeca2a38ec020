pub use rawexec_macros::ArgumentBlock;

/// A caller-defined block whose address is passed to loaded code.
///
/// The library never looks inside the block; it only forwards its address.
/// Usually derived:
///
/// ```
/// use rawexec::ArgumentBlock;
///
/// #[repr(C)]
/// #[derive(ArgumentBlock)]
/// struct Args {
///     input: [f64; 2],
///     out: f64,
/// }
///
/// assert_eq!(Args::offset_of("out"), Some(16));
///
/// let mut args = Args { input: [1.0, 2.0], out: 0.0 };
/// let expected = &mut args as *mut Args as usize;
/// assert_eq!(args.as_word(), expected);
/// ```
///
/// Types without a fixed layout are refused:
///
/// ```compile_fail
/// use rawexec::ArgumentBlock;
///
/// #[derive(ArgumentBlock)]
/// struct Loose {
///     a: u8,
///     b: u64,
/// }
/// ```
///
/// # Safety
///
/// The type must have a stable layout (`#[repr(C)]` or `#[repr(transparent)]`)
/// and `FIELDS` must list real byte offsets into it.
pub unsafe trait ArgumentBlock: Sized {
    /// Field names and their byte offsets, in declaration order.
    const FIELDS: &'static [(&'static str, usize)];

    fn offset_of(name: &str) -> Option<usize> {
        Self::FIELDS
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, offset)| *offset)
    }

    /// Address of the block as the machine word loaded code receives.
    fn as_word(&mut self) -> usize {
        self as *mut Self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(ArgumentBlock, Default)]
    struct Args {
        input: [f64; 2],
        out: f64,
        count: u32,
    }

    #[test]
    fn test_derived_offsets() {
        assert_eq!(
            Args::FIELDS,
            &[("input", 0), ("out", 16), ("count", 24)]
        );
        assert_eq!(Args::offset_of("out"), Some(16));
        assert_eq!(Args::offset_of("missing"), None);
    }

    #[test]
    fn test_as_word_is_block_address() {
        let mut args = Args::default();
        let expected = &mut args as *mut Args as usize;
        assert_eq!(args.as_word(), expected);
    }
}
