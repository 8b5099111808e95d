// Memory-mapped files.
//
// mmaptable is a fixed pool of NFILE Mmap descriptors, parallel to
// file.rs's ftable. A process's own mmap[] array (in Proc) holds raw
// pointers into this pool, one slot per open mapping, capped at NOFILE
// the same way file descriptors are. Pages are not actually backed
// until first touched: mmap_alloc only reserves the virtual address
// range via uvmmmap's PTE_M sentinel, and mmap_fault_handler does the
// real work of reading a page in off the backing file.

use core::cmp::min;

use crate::file::fcntl::MAP_SHARED;
use crate::file::file::{fileclose, filedup};
use crate::file::{File, Mmap};
use crate::kalloc::KMEM;
use crate::log::{begin_op, end_op};
use crate::param::{NFILE, NOFILE};
use crate::proc::myproc_mut;
use crate::riscv::{MAXVA, PGSIZE, Pte, PTE_D, PTE_M, PTE_V};
use crate::spinlock::Spinlock;
use crate::string::memset;
use crate::vm::{uvmmmap, walk};
use crate::{PA2PTE, PGROUNDDOWN, PTE2PA, PTE_FLAGS};

struct MmapTable {
    lock: Spinlock,
    mmap: [Mmap; NFILE],
}

static mut MMAPTABLE: MmapTable = MmapTable {
    lock: Spinlock::init_lock("mmaptable"),
    mmap: [Mmap::create(); NFILE],
};

pub fn mmapinit() {
    // empty: MMAPTABLE has already been initialized.
}

// Allocate a fresh mapping descriptor bound to f, taking a reference on
// f that mmapclose will drop. The caller still has to install the
// virtual address range with uvmmmap and fill in addr/len/prot/flag.
pub fn mmap_alloc(f: &'static mut File<'static>) -> Option<&'static mut Mmap> {
    let fptr = f as *mut File<'static>;
    unsafe {
        MMAPTABLE.lock.acquire();
        for m in &mut MMAPTABLE.mmap {
            if m.file.is_none() {
                m.file = Some(fptr);
                MMAPTABLE.lock.release();
                filedup(fptr);
                return Some(m);
            }
        }
        MMAPTABLE.lock.release();
        None
    }
}

// Duplicate mapping m2 into pagetable, for a child created by fork.
// Unlike the original this always releases mmaptable's lock before
// returning, including on the uvmmmap failure path.
pub fn mmap_dup(m2: &Mmap, pagetable: &mut crate::riscv::PageTable) -> Option<&'static mut Mmap> {
    unsafe {
        MMAPTABLE.lock.acquire();
        for m in &mut MMAPTABLE.mmap {
            if m.file.is_none() {
                *m = *m2;
                let mapped = uvmmmap(pagetable, m.addr, m.len, m.prot as usize);
                if mapped != m2.addr {
                    m.file = None;
                    MMAPTABLE.lock.release();
                    return None;
                }
                MMAPTABLE.lock.release();
                filedup(m.file.unwrap());
                return Some(m);
            }
        }
        MMAPTABLE.lock.release();
        None
    }
}

// Drop a mapping's reference on its backing file and return the
// descriptor to the pool. The caller must already have unmapped every
// page covered by m (len must be 0).
pub fn mmapclose(m: &mut Mmap) {
    let f = match m.file {
        Some(f) => f,
        None => panic!("mmapclose"),
    };

    fileclose(unsafe { f.as_mut().unwrap() });

    unsafe {
        MMAPTABLE.lock.acquire();
        m.file = None;
        MMAPTABLE.lock.release();
    }
}

// Unmap [addr, addr+len) from the calling process. Per the mmap-lab
// convention this repo follows, a single call must exactly remove
// either the front or the back edge of an existing mapping (never a
// hole in the middle) -- callers that need to unmap a middle range are
// expected to make two calls. Returns 0 on success, -1 on error.
pub fn munmap(addr: usize, len: usize) -> i32 {
    if addr % PGSIZE != 0 || len % PGSIZE != 0 {
        return -1;
    }

    let p = myproc_mut();

    for i in 0..NOFILE {
        let mptr = match p.mmap[i] {
            Some(mptr) => mptr,
            None => continue,
        };
        let m = unsafe { mptr.as_mut().unwrap() };

        let mlen = m.len;
        if m.addr == addr {
            m.addr = addr + len;
            m.len -= len;
        } else if m.addr + m.len == addr + len {
            m.len -= len;
        } else {
            continue;
        }

        let pagetable = p.pagetable.as_deref_mut().unwrap();

        if m.flag & MAP_SHARED != 0 {
            begin_op();
            let file = unsafe { m.file.unwrap().as_mut().unwrap() };
            let ip = unsafe { file.ip.unwrap().as_mut().unwrap() };
            ip.ilock();

            let mut va = addr;
            while va < addr + len {
                let off = va - addr;
                let n = min(mlen - off, PGSIZE);

                let pte = match walk(pagetable, va, 0) {
                    Some(pte) => pte,
                    None => panic!("munmap: walk"),
                };
                if pte.0 & PTE_V != 0 {
                    if pte.0 & PTE_D != 0 && ip.writei(true, va as *mut u8, off as u32, n) != n as isize {
                        panic!("munmap: writei");
                    }
                    unsafe { KMEM.kfree(PTE2PA!(pte.0) as *mut u8) };
                    *pte = Pte(0);
                }
                va += PGSIZE;
            }

            ip.iunlock();
            end_op();
        } else {
            let mut va = addr;
            while va < addr + len {
                let pte = match walk(pagetable, va, 0) {
                    Some(pte) => pte,
                    None => panic!("munmap: walk"),
                };
                if pte.0 & PTE_V != 0 {
                    unsafe { KMEM.kfree(PTE2PA!(pte.0) as *mut u8) };
                    *pte = Pte(0);
                }
                va += PGSIZE;
            }
        }

        if m.len == 0 {
            p.mmap[i] = None;
            mmapclose(m);
        }

        return 0;
    }

    -1
}

// Handle a page fault inside a lazily-mapped mmap region: va must fall
// within some live mapping owned by the faulting process and be tagged
// PTE_M/!PTE_V (reserved, not yet backed). Reads the covering page in
// from the mapping's file and installs it.
pub fn mmap_fault_handler(va: usize) -> i32 {
    let va = PGROUNDDOWN!(va);
    if va >= MAXVA {
        return -1;
    }

    let p = myproc_mut();
    let pagetable = p.pagetable.as_deref_mut().unwrap();

    let pte = match walk(pagetable, va, 0) {
        Some(pte) => pte,
        None => return -1,
    };
    if pte.0 & PTE_V != 0 || pte.0 & PTE_M == 0 {
        return -1;
    }

    let mem: *mut u8 = unsafe { KMEM.kalloc() };
    if mem.is_null() {
        return -1;
    }

    for i in 0..NOFILE {
        let mptr = match p.mmap[i] {
            Some(mptr) => mptr,
            None => continue,
        };
        let m = unsafe { mptr.as_mut().unwrap() };
        if m.addr <= va && va < m.addr + m.len {
            let off = va - m.addr;
            let n = min(m.len - off, PGSIZE);

            let file = unsafe { m.file.unwrap().as_mut().unwrap() };
            let ip = unsafe { file.ip.unwrap().as_mut().unwrap() };
            ip.ilock();
            let read_len = ip.readi(false, mem, off as u32, n);
            ip.iunlock();

            if read_len > n {
                panic!("mmap_fault_handler: readi failed");
            }
            if read_len < PGSIZE {
                unsafe { memset(mem.add(read_len), 0, PGSIZE - read_len) };
            }

            // Explicitly clear the reservation bit and set PTE_V, rather
            // than toggling PTE_V with XOR: a straight XOR only happens
            // to work while PTE_V starts clear, and silently corrupts
            // the PTE if this handler is ever reached with PTE_V set.
            let flags = (PTE_FLAGS!(pte.0) & !PTE_M) | PTE_V;
            *pte = Pte(PA2PTE!(mem) | flags);
            return 0;
        }
    }

    unsafe { KMEM.kfree(mem) };
    -1
}
