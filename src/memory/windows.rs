use super::Protection;
use std::io::{self, Error};
use std::ptr::{self, NonNull};
use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE,
    PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_READONLY,
    PAGE_READWRITE, PAGE_WRITECOPY, VirtualAlloc, VirtualFree, VirtualQuery,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

pub(super) unsafe fn map(len: usize) -> io::Result<NonNull<u8>> {
    let base = VirtualAlloc(
        ptr::null(),
        len,
        MEM_COMMIT | MEM_RESERVE,
        PAGE_EXECUTE_READWRITE,
    );
    NonNull::new(base.cast::<u8>()).ok_or_else(Error::last_os_error)
}

pub(super) unsafe fn unmap(ptr: NonNull<u8>, _len: usize) -> io::Result<()> {
    // MEM_RELEASE frees the whole reservation and requires a size of 0.
    if VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) == 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

pub(super) unsafe fn write(dst: *mut u8, bytes: &[u8]) {
    ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
    FlushInstructionCache(GetCurrentProcess(), dst.cast(), bytes.len());
}

pub(super) fn page_size() -> usize {
    unsafe {
        let mut sysinfo: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut sysinfo);
        assert!(sysinfo.dwPageSize.is_power_of_two());
        sysinfo.dwPageSize as usize
    }
}

pub(super) fn protection(addr: *const u8) -> io::Result<Option<Protection>> {
    let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
    let written = unsafe {
        VirtualQuery(
            addr.cast(),
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    if written == 0 {
        return Err(Error::last_os_error());
    }

    // The upper bits carry modifiers such as PAGE_GUARD.
    let prot = match info.Protect & 0xff {
        PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY => Protection::RWX,
        PAGE_EXECUTE_READ => Protection {
            read: true,
            write: false,
            execute: true,
        },
        PAGE_EXECUTE => Protection {
            read: false,
            write: false,
            execute: true,
        },
        PAGE_READWRITE | PAGE_WRITECOPY => Protection {
            read: true,
            write: true,
            execute: false,
        },
        PAGE_READONLY => Protection {
            read: true,
            write: false,
            execute: false,
        },
        _ => Protection::default(),
    };
    Ok(Some(prot))
}
