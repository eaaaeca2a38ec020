//! Page-granular memory that is readable, writable and executable at once.
//!
//! This is the only place where the crate talks to the operating system.
//! Everything above it works in terms of [`ExecutableRegion`].

use crate::{Error, Result};
use log::{debug, error, trace};
use std::io;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use self::unix as sys;
    } else if #[cfg(windows)] {
        mod windows;
        use self::windows as sys;
    }
}

/// Access rights of a mapped page as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Protection {
    pub const RWX: Protection = Protection {
        read: true,
        write: true,
        execute: true,
    };

    pub fn is_rwx(&self) -> bool {
        *self == Self::RWX
    }
}

/// A contiguous, process-private mapping with read, write and execute
/// permission.
///
/// The region is unmapped when dropped. Use [`release`] to observe the
/// platform's answer instead.
#[derive(Debug)]
pub struct ExecutableRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// The region is a plain block of memory; synchronising access to its
// contents is up to whoever executes or writes it.
unsafe impl Send for ExecutableRegion {}
unsafe impl Sync for ExecutableRegion {}

impl ExecutableRegion {
    /// Start of the region. Always page aligned.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Number of bytes that were requested.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes actually backed by the mapping, i.e. `len` rounded
    /// up to the page size.
    pub fn mapped_len(&self) -> usize {
        page_round_up(self.len, page_size())
    }

    /// Copies `bytes` into the region at `offset` and makes them visible to
    /// instruction fetch.
    ///
    /// # Panics
    ///
    /// Panics if the write would reach past the end of the region.
    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset
            .checked_add(bytes.len())
            .expect("integer overflow while calculating write bounds");
        assert!(
            end <= self.len,
            "write of {} bytes at offset {offset} exceeds region of {} bytes",
            bytes.len(),
            self.len
        );

        trace!(
            "write {} bytes at {:p}+{offset:#x}",
            bytes.len(),
            self.ptr.as_ptr()
        );
        unsafe { sys::write(self.ptr.as_ptr().add(offset), bytes) }
    }

    /// Queries the permissions of the region's first page. Returns `None` on
    /// platforms without a query facility.
    pub fn protection(&self) -> io::Result<Option<Protection>> {
        sys::protection(self.ptr.as_ptr())
    }
}

impl Drop for ExecutableRegion {
    fn drop(&mut self) {
        debug!("drop ExecutableRegion {:p} ({} bytes)", self.ptr, self.len);
        if let Err(err) = unsafe { sys::unmap(self.ptr, self.len) } {
            error!("failed to unmap region {:p}: {err}", self.ptr);
        }
    }
}

/// Maps `size` bytes of anonymous memory with read, write and execute
/// permission.
pub fn allocate(size: usize) -> Result<ExecutableRegion> {
    if size == 0 {
        return Err(Error::Allocation {
            size,
            source: io::Error::new(io::ErrorKind::InvalidInput, "invalid size: 0"),
        });
    }

    let ptr = unsafe { sys::map(size) }.map_err(|source| Error::Allocation { size, source })?;
    debug!("allocated {size} bytes of executable memory at {ptr:p}");

    Ok(ExecutableRegion { ptr, len: size })
}

/// Returns `region` to the operating system.
///
/// On failure the mapping is leaked; it is never unmapped a second time.
pub fn release(region: ExecutableRegion) -> Result<()> {
    let region = ManuallyDrop::new(region);
    debug!("release {:p} ({} bytes)", region.ptr, region.len);

    unsafe { sys::unmap(region.ptr, region.len) }.map_err(|source| Error::Free { source })
}

/// The platform's page size in bytes.
pub fn page_size() -> usize {
    sys::page_size()
}

fn page_round_up(val: usize, page_size: usize) -> usize {
    (val + page_size - 1) & !(page_size - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_page_aligned_and_exact() {
        let region = allocate(13).unwrap();
        assert_eq!(region.len(), 13);
        assert_eq!(region.as_ptr() as usize % page_size(), 0);
        assert_eq!(region.mapped_len(), page_size());
        release(region).unwrap();
    }

    #[test]
    fn test_allocate_zero_fails() {
        match allocate(0) {
            Err(Error::Allocation { size: 0, .. }) => {}
            other => panic!("expected allocation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_allocate_absurd_size_fails() {
        assert!(matches!(
            allocate(usize::MAX - page_size()),
            Err(Error::Allocation { .. })
        ));
    }

    #[test]
    fn test_region_is_read_write_execute() {
        let region = allocate(page_size() * 2 + 1).unwrap();
        assert_eq!(region.mapped_len(), page_size() * 3);

        if let Some(prot) = region.protection().unwrap() {
            assert!(prot.is_rwx(), "unexpected protection {prot:?}");
        }
        #[cfg(any(target_os = "linux", windows))]
        assert_eq!(region.protection().unwrap(), Some(Protection::RWX));
    }

    #[test]
    fn test_write_lands_in_region() {
        let mut region = allocate(16).unwrap();
        region.write(4, &[0xAA, 0xBB, 0xCC]);

        let contents = unsafe { std::slice::from_raw_parts(region.as_ptr(), region.len()) };
        assert_eq!(&contents[4..7], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    #[should_panic(expected = "exceeds region")]
    fn test_write_out_of_bounds_panics() {
        let mut region = allocate(8).unwrap();
        region.write(4, &[0; 8]);
    }

    #[test]
    fn test_page_round_up() {
        assert_eq!(page_round_up(1, 4096), 4096);
        assert_eq!(page_round_up(4096, 4096), 4096);
        assert_eq!(page_round_up(4097, 4096), 8192);
    }
}
