//! How a loaded region becomes something the host can call.
//!
//! Some runtimes call a captureless callable through a small record whose
//! first word is the code pointer; others call a bare function pointer. Both
//! layouts are provided here behind [`Trampoline`], and [`HostTrampoline`]
//! picks one at build time.

use log::trace;
use std::mem;
use std::ptr::NonNull;

/// Signature every loaded fragment is invoked through: one machine word in,
/// nothing out.
pub type RawFn = unsafe extern "C" fn(usize);

cfg_if::cfg_if! {
    if #[cfg(feature = "trampoline-record")] {
        pub type HostTrampoline = Indirect;
    } else {
        pub type HostTrampoline = Direct;
    }
}

/// A callable representation that can be fabricated in front of raw code.
///
/// # Safety
///
/// `RECORD_SIZE` bytes produced by `encode_record` must be exactly what
/// `invoke` expects to find at the start of the region, and `callable` must
/// only ever be handed a region prepared that way.
pub unsafe trait Trampoline: 'static {
    /// Bytes reserved in front of the code. Zero for bare function pointers.
    const RECORD_SIZE: usize;

    /// The value handed out to callers.
    type Callable: Copy + Send + Sync;

    /// Encodes the record for code starting at `code`. Empty when
    /// `RECORD_SIZE` is zero.
    fn encode_record(code: *const u8) -> Vec<u8>;

    /// Reinterprets a prepared region starting at `base` as the callable.
    ///
    /// # Safety
    ///
    /// `base` must point at a region whose record was written from
    /// `encode_record` and which is followed by valid code.
    unsafe fn callable(base: NonNull<u8>) -> Self::Callable;

    /// Invokes the callable with `arg`.
    ///
    /// # Safety
    ///
    /// The backing region must still be mapped and the code must follow the
    /// [`RawFn`] calling convention.
    unsafe fn invoke(callable: Self::Callable, arg: usize);
}

/// Callables are bare function pointers at the code itself.
#[derive(Debug)]
pub enum Direct {}

unsafe impl Trampoline for Direct {
    const RECORD_SIZE: usize = 0;

    type Callable = RawFn;

    fn encode_record(_code: *const u8) -> Vec<u8> {
        Vec::new()
    }

    unsafe fn callable(base: NonNull<u8>) -> RawFn {
        mem::transmute::<*mut u8, RawFn>(base.as_ptr())
    }

    #[inline]
    unsafe fn invoke(callable: RawFn, arg: usize) {
        callable(arg)
    }
}

/// The record written in front of the code for [`Indirect`] callables.
#[repr(C)]
#[derive(Debug)]
pub struct TrampolineRecord {
    /// Address of the first code byte, immediately after this record.
    pub entry: usize,
}

/// Callables point at a [`TrampolineRecord`] whose first word is the code
/// address.
#[derive(Debug)]
pub enum Indirect {}

/// Pointer to a [`TrampolineRecord`] living in executable memory.
#[derive(Debug, Clone, Copy)]
pub struct RecordPtr(NonNull<TrampolineRecord>);

// The record is written once before the pointer is handed out and is only
// read afterwards.
unsafe impl Send for RecordPtr {}
unsafe impl Sync for RecordPtr {}

impl RecordPtr {
    pub fn as_ptr(&self) -> *const TrampolineRecord {
        self.0.as_ptr()
    }
}

unsafe impl Trampoline for Indirect {
    const RECORD_SIZE: usize = mem::size_of::<TrampolineRecord>();

    type Callable = RecordPtr;

    fn encode_record(code: *const u8) -> Vec<u8> {
        trace!("trampoline record -> {code:p}");
        (code as usize).to_ne_bytes().to_vec()
    }

    unsafe fn callable(base: NonNull<u8>) -> RecordPtr {
        RecordPtr(base.cast::<TrampolineRecord>())
    }

    #[inline]
    unsafe fn invoke(callable: RecordPtr, arg: usize) {
        let entry = (*callable.as_ptr()).entry;
        let func = mem::transmute::<usize, RawFn>(entry);
        func(arg)
    }
}
