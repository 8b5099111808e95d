use core::ptr;

use crate::memlayout::PHYSTOP;
use crate::param::NCPU;
use crate::proc::cpuid;
use crate::riscv::PGSIZE;
use crate::spinlock::{pop_off, push_off, Spinlock};
use crate::string::memset;
use crate::PGROUNDUP;

extern "C" {
    // first address after kernel.
    // defined by kernel.ld.
    static mut end: u8;
}

struct Run {
    next: *mut Run,
}

// Each CPU owns an independent free list and lock, so kalloc/kfree on
// different cores never contend with each other in the common case.
#[derive(Copy, Clone)]
struct PerCpu {
    lock: Spinlock,
    freelist: *mut Run,
}

impl PerCpu {
    const fn create() -> Self {
        Self {
            lock: Spinlock::init_lock("kmem"),
            freelist: ptr::null_mut(),
        }
    }
}

pub struct KMem {
    cpu: [PerCpu; NCPU],
}

pub static mut KMEM: KMem = KMem::create();

impl KMem {
    const fn create() -> Self {
        Self {
            cpu: [PerCpu::create(); NCPU],
        }
    }

    pub fn kinit() {
        unsafe {
            KMEM.freerange((&mut end) as *mut u8, PHYSTOP as *mut u8);
        }
    }

    // All of physical memory is handed to CPU 0's free list at boot; it
    // gets redistributed to other cores lazily through kalloc's stealing.
    fn freerange<T: Sized>(self: &mut Self, pa_start: *mut T, pa_end: *mut T) {
        let mut p = PGROUNDUP!(pa_start);
        while p + PGSIZE <= pa_end as usize {
            self.kfree(p as *mut T);
            p += PGSIZE;
        }
    }

    /// Free the page of physical memory pointed at by pa, which normally
    /// should have been returned by a call to kalloc(). (The exception is
    /// when initializing the allocator; see kinit above.) Returns the page
    /// to the calling CPU's own free list, never another CPU's.
    pub fn kfree<T: Sized>(self: &mut Self, pa: *mut T) {
        unsafe {
            let pa_usize = pa as usize;
            if pa_usize % PGSIZE != 0
                || pa_usize < ((&end) as *const u8) as usize
                || pa_usize >= PHYSTOP
            {
                panic!("kfree");
            }
        }

        // Fill with junk to catch dangling refs and reads of memory that
        // was freed but never reallocated.
        memset(pa as *mut u8, 0x01, PGSIZE);

        let r = pa as *mut Run;

        push_off();
        let cpu = unsafe { &mut self.cpu[cpuid()] };
        cpu.lock.acquire();
        unsafe {
            (*r).next = cpu.freelist;
        }
        cpu.freelist = r;
        cpu.lock.release();
        pop_off();
    }

    /// Allocate one 4096-byte page of physical memory. Returns a pointer
    /// that the kernel can use. Returns 0 if the memory cannot be
    /// allocated. Tries the calling CPU's own free list first; if that
    /// list is empty, steals a single page from another CPU's list rather
    /// than failing while memory is available elsewhere.
    pub fn kalloc<T: Sized>(self: &mut Self) -> *mut T {
        push_off();
        let id = cpuid();

        let mut r = {
            let cpu = unsafe { &mut self.cpu[id] };
            cpu.lock.acquire();
            let r = cpu.freelist;
            if !r.is_null() {
                unsafe {
                    cpu.freelist = (*r).next;
                }
            }
            cpu.lock.release();
            r
        };

        if r.is_null() {
            r = self.steal(id);
        }
        pop_off();

        if !r.is_null() {
            memset(r as *mut u8, 0x05, PGSIZE); // fill with junk
        }
        r as *mut T
    }

    // Take one page from the first other CPU that has one to spare.
    fn steal(self: &mut Self, thief: usize) -> *mut Run {
        for i in 0..NCPU {
            if i == thief {
                continue;
            }
            let cpu = unsafe { &mut self.cpu[i] };
            cpu.lock.acquire();
            let r = cpu.freelist;
            if !r.is_null() {
                unsafe {
                    cpu.freelist = (*r).next;
                }
            }
            cpu.lock.release();
            if !r.is_null() {
                return r;
            }
        }
        ptr::null_mut()
    }
}

#[cfg(test)]
mod tests {
    //! kalloc's real free lists live behind raw pointers into physical
    //! memory and a push_off/pop_off discipline tied to a running CPU
    //! table, neither of which exist in a host `cargo test` process. This
    //! mirrors the same singly-linked free-list-per-core shape over a
    //! plain heap-backed arena to pin down the stealing behavior the
    //! spec cares about.
    extern crate std;

    use std::vec::Vec;

    struct Lists {
        free: Vec<Vec<usize>>, // free[cpu] = stack of page ids owned by cpu
    }

    impl Lists {
        fn new(ncpu: usize) -> Self {
            Lists {
                free: (0..ncpu).map(|_| Vec::new()).collect(),
            }
        }

        fn kfree(&mut self, cpu: usize, page: usize) {
            self.free[cpu].push(page);
        }

        fn kalloc(&mut self, cpu: usize) -> Option<usize> {
            if let Some(p) = self.free[cpu].pop() {
                return Some(p);
            }
            for other in 0..self.free.len() {
                if other == cpu {
                    continue;
                }
                if let Some(p) = self.free[other].pop() {
                    return Some(p);
                }
            }
            None
        }
    }

    #[test]
    fn allocates_from_own_list_first() {
        let mut lists = Lists::new(4);
        lists.kfree(0, 100);
        lists.kfree(1, 200);
        assert_eq!(lists.kalloc(0), Some(100));
    }

    #[test]
    fn steals_a_single_page_when_local_list_is_empty() {
        let mut lists = Lists::new(4);
        lists.kfree(2, 42);
        assert_eq!(lists.kalloc(0), Some(42));
        // the page is gone from cpu 2's list, not duplicated.
        assert_eq!(lists.kalloc(2), None);
    }

    #[test]
    fn exhausted_everywhere_returns_none() {
        let mut lists = Lists::new(2);
        assert_eq!(lists.kalloc(0), None);
    }
}
