// Kernel-wide size limits and tuning constants.
// Mirrors the handful of #define's that xv6 keeps in param.h: one file,
// no logic, so that every table size in the kernel is visible in one place.

pub const NPROC: usize = 64; // maximum number of processes
pub const NCPU: usize = 8; // maximum number of CPUs
pub const NOFILE: usize = 16; // open files per process
pub const NFILE: usize = 100; // open files per system
pub const NINODE: usize = 50; // maximum number of active i-nodes
pub const NDEV: usize = 10; // maximum major device number
pub const ROOTDEV: u32 = 1; // device number of file system root disk
pub const MAXARG: usize = 32; // max exec arguments
pub const MAXPATH: usize = 128; // maximum file path name
pub const MAXOPBLOCKS: usize = 10; // max # of blocks any FS op writes
pub const LOGSIZE: usize = MAXOPBLOCKS * 3; // max data blocks in on-disk log
pub const NBUF: usize = MAXOPBLOCKS * 3; // size of disk block cache
// NBUCKET should stay a small prime close to NBUF/4 so that scanning a
// bucket's chain stays cheap without shrinking any one bucket to nothing.
pub const NBUCKET: usize = 13;
