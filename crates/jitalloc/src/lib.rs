//! Bounded executable memory arena for JITs.
//!
//! The arena reserves a single region of fixed capacity up front and hands out bump allocations
//! from it. Once full, allocations fail and the owner is expected to drop every piece of code it
//! emitted and [`reset`](Arena::reset) the arena.
use std::ptr::NonNull;

#[cfg(target_family = "unix")]
use rustix::mm::{self as mman, MapFlags, MprotectFlags, ProtFlags};
#[cfg(target_family = "windows")]
use windows::Win32::System::{
    Diagnostics::Debug::FlushInstructionCache, Memory, Threading::GetCurrentProcess,
};

const PAGE_LEN: usize = 1 << 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protection {
    ReadExec,
    ReadWrite,
}

/// A memory mapped region.
struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: changing the protection can be done from any thread
unsafe impl Send for Region {}

impl Region {
    fn new(len: usize) -> std::io::Result<Self> {
        #[cfg(target_family = "unix")]
        let region = unsafe {
            mman::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::empty(),
                MapFlags::PRIVATE,
            )
        }?;

        #[cfg(target_family = "windows")]
        let region = unsafe {
            Memory::VirtualAlloc(
                None,
                len,
                Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                Memory::PAGE_NOACCESS,
            )
        };

        let ptr = NonNull::new(region.cast()).ok_or_else(std::io::Error::last_os_error)?;
        Ok(Self { ptr, len })
    }

    /// Changes the protection of the first `length` bytes of the region.
    ///
    /// # Safety
    /// No reference into the affected range may be alive if the new protection forbids its use.
    unsafe fn protect(&self, length: usize, protection: Protection) {
        if length == 0 {
            return;
        }

        #[cfg(target_family = "unix")]
        let result = unsafe {
            let flags = match protection {
                Protection::ReadExec => MprotectFlags::READ | MprotectFlags::EXEC,
                Protection::ReadWrite => MprotectFlags::READ | MprotectFlags::WRITE,
            };

            mman::mprotect(self.ptr.as_ptr().cast(), length, flags)
        };

        #[cfg(target_family = "windows")]
        let result = unsafe {
            let mut previous = Memory::PAGE_PROTECTION_FLAGS(0);
            let flags = match protection {
                Protection::ReadExec => Memory::PAGE_EXECUTE_READ,
                Protection::ReadWrite => Memory::PAGE_READWRITE,
            };

            Memory::VirtualProtect(self.ptr.as_ptr().cast(), length, flags, &raw mut previous)
        };

        if let Err(e) = result {
            panic!("failed to change protection of code region: {e}");
        }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        #[cfg(target_family = "unix")]
        let result = unsafe { mman::munmap(self.ptr.as_ptr().cast(), self.len) };

        #[cfg(target_family = "windows")]
        let result =
            unsafe { Memory::VirtualFree(self.ptr.as_ptr().cast(), 0, Memory::MEM_RELEASE) };

        if let Err(e) = result {
            tracing::error!("failed to unmap code region: {e}");
        }
    }
}

/// Code copied into an [`Arena`].
///
/// # Safety considerations
/// The allocation is only valid until the arena it came from is reset or dropped.
#[derive(Debug, Clone, Copy)]
pub struct Allocation(NonNull<[u8]>);

impl Allocation {
    /// Returns a pointer to the allocation.
    #[inline(always)]
    pub fn as_ptr(&self) -> NonNull<[u8]> {
        self.0
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// SAFETY: the allocation is read only and executable, sharing the pointer is fine as long as the
// arena outlives it, which is the user's responsibility
unsafe impl Send for Allocation {}

/// A fixed capacity arena of executable memory.
pub struct Arena {
    region: Region,
    /// Offset of the first free byte.
    offset: usize,
}

impl Arena {
    /// Reserves an arena of `capacity` bytes, rounded up to whole pages.
    pub fn new(capacity: usize) -> std::io::Result<Self> {
        let capacity = capacity.max(1).next_multiple_of(PAGE_LEN);
        Ok(Self {
            region: Region::new(capacity)?,
            offset: 0,
        })
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.region.len
    }

    #[inline(always)]
    pub fn used(&self) -> usize {
        self.offset
    }

    /// Copies `code` into the arena and makes it executable. Returns `None` if the arena does not
    /// have enough space left.
    pub fn allocate(&mut self, alignment: usize, code: &[u8]) -> Option<Allocation> {
        assert!(!code.is_empty());

        let alignment = alignment.max(1).next_power_of_two();
        let start = self.offset.next_multiple_of(alignment);
        let end = start.checked_add(code.len())?;
        if end > self.region.len {
            return None;
        }

        // the end of the last page might be shared with previous code
        let protected = end.next_multiple_of(PAGE_LEN).min(self.region.len);
        unsafe {
            let ptr = self.region.ptr.add(start);
            self.region.protect(protected, Protection::ReadWrite);
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr.as_ptr(), code.len());
            self.region.protect(protected, Protection::ReadExec);

            #[cfg(target_family = "windows")]
            {
                let process = GetCurrentProcess();
                if let Err(e) =
                    FlushInstructionCache(process, Some(ptr.as_ptr().cast()), code.len())
                {
                    panic!("failed to flush instruction cache: {e}");
                }
            }

            self.offset = end;
            Some(Allocation(NonNull::slice_from_raw_parts(ptr, code.len())))
        }
    }

    /// Discards every allocation, making the whole capacity available again.
    ///
    /// # Safety
    /// No allocation obtained from this arena may be used afterwards.
    pub unsafe fn reset(&mut self) {
        self.offset = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounded_allocations() {
        let mut arena = Arena::new(100).unwrap();
        assert_eq!(arena.capacity(), PAGE_LEN);

        let a = arena.allocate(16, &[0xC3; 1000]).unwrap();
        let b = arena.allocate(16, &[0x90; 1000]).unwrap();
        assert_eq!(a.len(), 1000);
        assert_eq!(arena.used(), 2008);

        let bytes = unsafe { b.as_ptr().as_ref() };
        assert!(bytes.iter().all(|&x| x == 0x90));
        assert_eq!(b.as_ptr().cast::<u8>().as_ptr() as usize % 16, 0);

        assert!(arena.allocate(16, &[0; 3000]).is_none());

        unsafe { arena.reset() };
        assert_eq!(arena.used(), 0);
        assert!(arena.allocate(16, &[0; 3000]).is_some());
    }
}
