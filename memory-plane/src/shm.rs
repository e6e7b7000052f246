//! POSIX shared-memory segment: the backing store for the whole page pool.
//!
//! Grounded directly in `libc::shm_open`/`mmap`; this crate depends on
//! plain `libc` the same way the rest of the workspace does rather than
//! reaching for a dedicated shared-memory crate.

use crate::errors::MemoryPlaneError;
use log::{debug, info};
use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;

/// An owned POSIX shared-memory segment, unlinked and unmapped on drop.
pub struct ShmSegment {
    name: String,
    base: *mut u8,
    size: usize,
}

unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create (or truncate-and-reuse) a POSIX shm object named `name` of
    /// `size` bytes and map it read/write into this process.
    pub fn create(name: &str, size: usize) -> Result<Self, MemoryPlaneError> {
        let cname = CString::new(name).map_err(|_| MemoryPlaneError::InvalidShmName(name.to_string()))?;

        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(MemoryPlaneError::ShmOpenFailed(std::io::Error::last_os_error()));
        }

        let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(MemoryPlaneError::ShmTruncateFailed(err));
        }

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if base == libc::MAP_FAILED {
            return Err(MemoryPlaneError::MmapFailed(std::io::Error::last_os_error()));
        }

        info!("created shared memory segment '{name}' ({size} bytes) at {base:?}");
        Ok(Self {
            name: name.to_string(),
            base: base as *mut u8,
            size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn base_addr(&self) -> *mut u8 {
        self.base
    }

    /// Byte slice over the entire segment. Callers must synchronize with
    /// any concurrent writers (producers write a single page's bytes at a
    /// time and only via 8-byte-aligned value stores after registration).
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.base, self.size) }
    }

    /// Byte slice for one page's worth of memory at `offset`.
    pub fn page_slice(&self, offset: usize, page_size: usize) -> &[u8] {
        &self.as_slice()[offset..offset + page_size]
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::munmap(self.base as *mut c_void, self.size);
        }
        if let Ok(cname) = CString::new(self.name.as_str()) {
            debug!("unlinking shared memory segment '{}'", self.name);
            unsafe {
                libc::shm_unlink(cname.as_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_write_roundtrip() {
        let name = format!("/memory-plane-test-{}", std::process::id());
        let mut shm = ShmSegment::create(&name, 4096).expect("create shm");
        assert_eq!(shm.size(), 4096);
        shm.as_mut_slice()[0..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&shm.as_slice()[0..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_name_with_interior_nul() {
        let err = ShmSegment::create("bad\0name", 4096);
        assert!(matches!(err, Err(MemoryPlaneError::InvalidShmName(_))));
    }
}
