use super::Protection;
use std::io::{self, Error};
use std::ptr::{self, NonNull};

pub(super) unsafe fn map(len: usize) -> io::Result<NonNull<u8>> {
    // Apple silicon only hands out writable+executable pages for MAP_JIT.
    cfg_if::cfg_if! {
        if #[cfg(all(target_vendor = "apple", target_arch = "aarch64"))] {
            let map_flags = libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_JIT;
        } else {
            let map_flags = libc::MAP_ANON | libc::MAP_PRIVATE;
        }
    }

    let mmap = libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        map_flags,
        -1,
        0,
    );
    if mmap == libc::MAP_FAILED {
        return Err(Error::last_os_error());
    }

    NonNull::new(mmap.cast::<u8>()).ok_or_else(|| Error::other("mmap returned null"))
}

pub(super) unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> io::Result<()> {
    if libc::munmap(ptr.as_ptr().cast(), len) != 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

pub(super) unsafe fn write(dst: *mut u8, bytes: &[u8]) {
    #[cfg(all(target_vendor = "apple", target_arch = "aarch64"))]
    {
        pthread_jit_write_protect_np(0);
        ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        pthread_jit_write_protect_np(1);
        sys_icache_invalidate(dst.cast(), bytes.len());
    }

    #[cfg(not(all(target_vendor = "apple", target_arch = "aarch64")))]
    {
        ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());

        #[cfg(all(
            target_os = "linux",
            not(any(target_arch = "x86", target_arch = "x86_64"))
        ))]
        __clear_cache(dst.cast(), dst.add(bytes.len()).cast());
    }
}

pub(super) fn page_size() -> usize {
    let pagesize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    assert!(pagesize.is_power_of_two());
    pagesize
}

#[cfg(target_os = "linux")]
pub(super) fn protection(addr: *const u8) -> io::Result<Option<Protection>> {
    let maps = std::fs::read_to_string("/proc/self/maps")?;
    Ok(maps
        .lines()
        .find_map(|line| parse_maps_line(line, addr as usize)))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn protection(_addr: *const u8) -> io::Result<Option<Protection>> {
    Ok(None)
}

/// Parses one `/proc/self/maps` line, e.g.
/// `7f12a000-7f12b000 rwxp 00000000 00:00 0`, returning its permissions if
/// the range contains `addr`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_maps_line(line: &str, addr: usize) -> Option<Protection> {
    let mut fields = line.split_whitespace();
    let (start, end) = fields.next()?.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;
    if !(start..end).contains(&addr) {
        return None;
    }

    let perms = fields.next()?.as_bytes();
    if perms.len() < 3 {
        return None;
    }
    Some(Protection {
        read: perms[0] == b'r',
        write: perms[1] == b'w',
        execute: perms[2] == b'x',
    })
}

#[cfg(all(target_vendor = "apple", target_arch = "aarch64"))]
extern "C" {
    fn pthread_jit_write_protect_np(enabled: libc::c_int);
    fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
}

#[cfg(all(
    target_os = "linux",
    not(any(target_arch = "x86", target_arch = "x86_64"))
))]
extern "C" {
    fn __clear_cache(begin: *mut libc::c_char, end: *mut libc::c_char);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_maps_line() {
        let line = "7f12a000-7f12b000 rwxp 00000000 00:00 0";
        assert_eq!(parse_maps_line(line, 0x7f12a000), Some(Protection::RWX));
        assert_eq!(parse_maps_line(line, 0x7f12afff), Some(Protection::RWX));
        assert_eq!(parse_maps_line(line, 0x7f12b000), None);

        let line = "55d0c000-55d0d000 r-xp 00001000 08:01 1234 /usr/bin/true";
        assert_eq!(
            parse_maps_line(line, 0x55d0c100),
            Some(Protection {
                read: true,
                write: false,
                execute: true,
            })
        );
    }

    #[test]
    fn test_parse_maps_line_rejects_garbage() {
        assert_eq!(parse_maps_line("", 0), None);
        assert_eq!(parse_maps_line("nothex-10 rwxp", 0), None);
    }
}
