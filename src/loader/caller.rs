use crate::block::ArgumentBlock;
use crate::loader::Lease;
use crate::memory::{self, ExecutableRegion, Protection};
use crate::trampoline::{HostTrampoline, Trampoline};
use crate::Result;
use log::debug;
use std::fmt;
use std::io;

/// Loaded machine code together with the memory that holds it.
///
/// A `Caller` is either loaded and callable, or gone: [`Caller::free`]
/// consumes it, and dropping it releases the region as well.
pub struct Caller<T: Trampoline = HostTrampoline> {
    callable: T::Callable,
    region: ExecutableRegion,
    _lease: Lease,
}

impl<T: Trampoline> Caller<T> {
    /// Writes the trampoline record and `code` into `region`, which must be
    /// exactly `code.len() + T::RECORD_SIZE` bytes long.
    pub(super) fn new(mut region: ExecutableRegion, lease: Lease, code: &[u8]) -> Self {
        debug_assert_eq!(region.len(), code.len() + T::RECORD_SIZE);

        let base = region.as_non_null();
        if T::RECORD_SIZE > 0 {
            let entry = unsafe { base.as_ptr().add(T::RECORD_SIZE) };
            region.write(0, &T::encode_record(entry));
        }
        region.write(T::RECORD_SIZE, code);

        let callable = unsafe { T::callable(base) };
        debug!(
            "loaded {} bytes at {:p} (record {} bytes)",
            code.len(),
            base,
            T::RECORD_SIZE
        );

        Caller {
            callable,
            region,
            _lease: lease,
        }
    }

    /// Runs the loaded code with `arg` as its only argument and blocks until it
    /// returns.
    ///
    /// # Safety
    ///
    /// The code is executed as-is. It must be valid for this machine, take a
    /// single word argument in the platform's C calling convention and return
    /// normally. Whatever it does with `arg` is the caller's business.
    #[inline]
    pub unsafe fn call(&self, arg: usize) {
        T::invoke(self.callable, arg)
    }

    /// Runs the loaded code with the address of `block` as its argument.
    ///
    /// # Safety
    ///
    /// Same as [`Caller::call`], and the code must respect `A`'s layout.
    #[inline]
    pub unsafe fn call_with<A: ArgumentBlock>(&self, block: &mut A) {
        self.call(block.as_word())
    }

    /// Releases the region.
    ///
    /// If the platform refuses, the region is leaked and the error returned;
    /// there is nothing left to retry with.
    ///
    /// The handle is consumed, so it cannot be called afterwards:
    ///
    /// ```compile_fail
    /// # use rawexec::codegen::FragmentCompiler;
    /// # let code = FragmentCompiler::builder().build()?.compile(&[])?;
    /// let caller = rawexec::load(&code)?;
    /// caller.free()?;
    /// unsafe { caller.call(0) };
    /// # Ok::<(), rawexec::Error>(())
    /// ```
    ///
    /// Nor freed twice:
    ///
    /// ```compile_fail
    /// # use rawexec::codegen::FragmentCompiler;
    /// # let code = FragmentCompiler::builder().build()?.compile(&[])?;
    /// let caller = rawexec::load(&code)?;
    /// caller.free()?;
    /// caller.free()?;
    /// # Ok::<(), rawexec::Error>(())
    /// ```
    pub fn free(self) -> Result<()> {
        let Caller { region, .. } = self;
        memory::release(region)
    }

    /// Size of the region: code plus trampoline record.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Always false: empty code is rejected at load time.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    pub fn record_size(&self) -> usize {
        T::RECORD_SIZE
    }

    /// Start of the region.
    pub fn base(&self) -> *const u8 {
        self.region.as_ptr()
    }

    /// First byte of the loaded code.
    pub fn entry(&self) -> *const u8 {
        self.base().wrapping_add(T::RECORD_SIZE)
    }

    /// The fabricated callable value.
    pub fn callable(&self) -> T::Callable {
        self.callable
    }

    pub fn protection(&self) -> io::Result<Option<Protection>> {
        self.region.protection()
    }
}

impl<T: Trampoline> fmt::Debug for Caller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("base", &self.base())
            .field("len", &self.len())
            .field("record_size", &T::RECORD_SIZE)
            .finish()
    }
}
