use core::mem;
use crate::exec::exec;
use crate::file::fcntl::{MAP_SHARED, O_CREATE, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY, PROT_WRITE};
use crate::file::file::{filealloc, fileclose};
use crate::file::mmap::{mmap_alloc, mmapclose, munmap};
use crate::file::{File, INode, Mmap};
use crate::file::FDType::{FD_DEVICE, FD_INODE};
use crate::fs::fs::{dirlink, dirlookup, ialloc, namei, nameiparent};
use crate::kalloc::KMEM;
use crate::log::{begin_op, end_op};
use crate::param::{MAXARG, MAXPATH, NDEV, NOFILE};
use crate::proc::{myproc, myproc_mut};
use crate::riscv::{PGSIZE, PTE_A};
use crate::stat::FileType;
use crate::stat::FileType::{T_DEVICE, T_DIR, T_FILE};
use crate::syscall::syscall::{argaddr, argint, argstr, fetchaddr, fetchstr};
use crate::vm::{copyout, uvmmmap, walk};

pub(crate) fn sys_exec() -> u64 {
    let mut uarg: usize = 0;
    let uargv = argaddr(1);

    let mut path: [u8; MAXPATH] = ['\0' as u8; MAXPATH];
    if argstr(0, &mut path as *mut u8, MAXPATH) < 0 {
        return u64::MAX;
    }

    let mut argv: [Option<*mut u8>; MAXARG] = [None; MAXARG];
    let mut i = 0;
    let mut bad = false;
    loop {
        if i >= argv.len() {
            bad = true;
            break
        }

        if fetchaddr(uargv+mem::size_of::<usize>()*i, &mut uarg) < 0 {
            bad = true;
            break
        }

        if uarg == 0 {
            argv[i] = None;
            break;
        }

        let ptr: *mut u8 = unsafe { KMEM.kalloc() };
        if ptr.is_null() {
            bad = true;
            break
        }
        argv[i] = Some(ptr);


        if fetchstr(uarg, argv[i].unwrap(), PGSIZE) < 0 {
            bad = true;
            break
        }

        i += 1;
    }

    let mut ret = -1;
    if !bad {
        ret = exec(&path, &argv);
    }

    for i in 0..argv.len() {
        if argv[i].is_none() {
            break
        }

        unsafe { KMEM.kfree(argv[i].unwrap()) }
    }

    return ret as u64;
}

pub(crate) fn sys_open() -> Option<usize> {
    let mut path: [u8; MAXPATH] = ['\0' as u8; MAXPATH];
    let omode = argint(1);
    let n = argstr(0, &mut path as *mut u8, MAXPATH);
    if n < 0 {
        return None;
    }

    begin_op();

    let mut ip = None;
    let path = unsafe { core::str::from_utf8_unchecked(&path) };
    if omode & O_CREATE != 0 {
        ip = create(path, T_FILE, 0, 0);
        if ip.is_none() {
            end_op();
            return None;
        }
    } else {
        ip = namei(path);
        if ip.is_none() {
            end_op();
            return None;
        }

        let ip = ip.as_mut()?;
        ip.ilock();
        if ip.file_type == T_DIR && omode != O_RDONLY {
            ip.iunlockput();
            end_op();
            return None;
        }
    }

    let ip = ip?;
    if ip.file_type == T_DEVICE && (ip.major < 0 || ip.major as usize >= NDEV) {
        ip.iunlockput();
        end_op();
        return None;
    }


    let f = filealloc();
    if f.is_none() {
        ip.iunlockput();
        end_op();
        return None;
    }

    let f = f?;
    let fd = fdalloc(f);
    if fd.is_none() {
        fileclose(f);
        ip.iunlockput();
        end_op();
        return None;
    }

    if ip.file_type == T_DEVICE {
        f.file_type = FD_DEVICE;
        f.major = ip.major;
    } else {
        f.file_type = FD_INODE;
        f.off = 0;
    }
    f.ip = Some(ip);
    f.readable = omode & O_WRONLY == 0;
    f.writable = (omode & O_WRONLY) != 0 || (omode & O_RDWR) != 0;

    if (omode & O_TRUNC) != 0 && ip.file_type == T_FILE {
        ip.itrunc();
    }

    ip.iunlock();
    end_op();

    return fd;
}

pub fn sys_mknod() -> i64 {
    begin_op();
    let major = argint(1)  as i16;
    let minor = argint(2)  as i16;

    let mut path = [0; MAXPATH];

    if (argstr(0, &mut path as *mut u8, MAXPATH)) < 0 {
        end_op();
        return -1;
    }

    let path_str = unsafe { core::str::from_utf8_unchecked(&path) };
    let ip = create(path_str, T_DEVICE, major, minor);
    if ip.is_none() {
        end_op();
        return -1;
    }

    ip.unwrap().iunlockput();
    end_op();
    return 0;
}


fn create<'a>(path: &str, file_type: FileType, major: i16, minor: i16) -> Option<&'a mut INode> {
    let dp = nameiparent(path)?;
    dp.ilock();

    let ip = dirlookup(dp, "", &mut 0);
    if ip.is_some() {
        let ip = ip?;
        dp.iunlockput();
        ip.ilock();
        if file_type == T_FILE && (ip.file_type == T_FILE || ip.file_type == T_DEVICE) {
            return Some(ip);
        }
        ip.iunlockput();
        return None;
    }

    let ip = ialloc(dp.dev, file_type);
    if ip.is_none() {
        dp.iunlockput();
        return None;
    }

    let ip = ip?;
    ip.ilock();
    ip.major = major;
    ip.minor = minor;
    ip.nlink = 1;
    ip.iupdate();

    if file_type == T_DIR {  // Create . and .. entries.
        // No ip->nlink++ for ".": avoid cyclic ref count.
        if dirlink(ip, ".", ip.inum as u16).is_none() || dirlink(ip, "..", dp.inum as u16).is_none() {
            // something went wrong. de-allocate ip.
            ip.nlink = 0;
            ip.iupdate();
            ip.iunlockput();
            dp.iunlockput();
            return None;
        }
    }

    if dirlink(dp, "", ip.inum as u16).is_none() {
        // something went wrong. de-allocate ip.
        ip.nlink = 0;
        ip.iupdate();
        ip.iunlockput();
        dp.iunlockput();
        return None;
    }

    if file_type == T_DIR {
        // now that success is guaranteed:
        dp.nlink += 1;  // for ".."
        ip.iupdate();
    }

    dp.iunlockput();

    return Some(ip);
}

// Allocate a file descriptor for the given file.
// Takes over file reference from caller on success.
fn fdalloc(f: *mut File) -> Option<usize> {
    let p = myproc_mut();

    for fd in 0..NOFILE {
        if p.ofile[fd].is_none() {
            p.ofile[fd] = Some(f);
            return Some(fd);
        }
    }

    return None;
}

// Map the file open on fd into the caller's address space. Mapping
// addresses are chosen by the kernel, carved downward from the top of
// user address space; pages are not actually read from the file until
// the first access faults them in.
pub(crate) fn sys_mmap() -> u64 {
    let len = argaddr(1);
    let prot = argint(2);
    let flag = argint(3);
    let fd = argint(4);
    let off = argaddr(5);

    if len == 0 || len % PGSIZE != 0 || fd < 0 || fd as usize >= NOFILE {
        return u64::MAX;
    }

    let p = myproc_mut();
    let fptr = match p.ofile[fd as usize] {
        Some(fptr) => fptr,
        None => return u64::MAX,
    };
    let f = unsafe { fptr.as_ref().unwrap() };
    if !f.readable || ((flag & MAP_SHARED) != 0 && (prot & PROT_WRITE) != 0 && !f.writable) {
        return u64::MAX;
    }

    if p.mmap.iter().all(|m| m.is_some()) {
        return u64::MAX;
    }
    let slot = p.mmap.iter().position(|m| m.is_none()).unwrap();

    // fptr's lifetime is really 'static: it points into the process-wide
    // open-file table, not into this call's stack frame.
    let f_static: &'static mut File<'static> = unsafe { &mut *(fptr as *mut File<'static>) };
    let m = match mmap_alloc(f_static) {
        Some(m) => m,
        None => return u64::MAX,
    };

    p.mmap_top -= len;
    let addr = p.mmap_top;
    m.addr = addr;
    m.len = len;
    m.prot = prot;
    m.flag = flag;
    m.offset = off;

    let pagetable = p.pagetable.as_deref_mut().unwrap();
    if uvmmmap(pagetable, addr, len, prot as usize) != addr {
        p.mmap_top += len;
        m.len = 0;
        mmapclose(m);
        return u64::MAX;
    }

    p.mmap[slot] = Some(m as *mut Mmap);
    addr as u64
}

pub(crate) fn sys_munmap() -> u64 {
    let addr = argaddr(0);
    let len = argaddr(1);
    munmap(addr, len) as u64
}

// Report which of n consecutive pages starting at addr have been
// accessed since the last call, as a packed bitmap written to the user
// address store_addr, and clear the accessed bit on each page checked.
pub(crate) fn sys_pgaccess() -> u64 {
    let addr = argaddr(0);
    let n = argint(1);
    let store_addr = argaddr(2);

    if n < 0 || n as usize > 64 {
        return u64::MAX;
    }
    let n = n as usize;

    let p = myproc_mut();
    let mut bitmask: [u8; 8] = [0; 8];

    {
        let pagetable = p.pagetable.as_deref_mut().unwrap();
        for i in 0..n {
            let pte = match walk(pagetable, addr + i * PGSIZE, 0) {
                Some(pte) => pte,
                None => continue,
            };
            if pte.0 & PTE_A != 0 {
                bitmask[i / 8] |= 1 << (i % 8);
                pte.0 &= !PTE_A;
            }
        }
    }

    let nbytes = (n + 7) / 8;
    let pagetable = p.pagetable.as_deref_mut().unwrap();
    if copyout(pagetable, store_addr, bitmask.as_ptr(), nbytes) != 0 {
        return u64::MAX;
    }
    0
}
