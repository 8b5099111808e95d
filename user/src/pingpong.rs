#![no_std]
#![feature(start)]

use ulib::{fprintf, printf};
use ulib::stubs::{exit, fork, getpid, pipe, read, wait, write};

#[start]
fn main(argc: isize, _argv: *const *const u8) -> isize {
    unsafe {
        if argc != 1 {
            fprintf!(2, "usage: pingpong\n");
            exit(1);
        }

        let mut fd: [i32; 4] = [0; 4];
        let mut buf: u8 = 0;

        pipe(fd.as_ptr());
        pipe(fd.as_ptr().add(2));

        if fork() == 0 {
            read(fd[0], &mut buf as *mut u8, 1);
            printf!("{}: received ping\n", getpid());
            write(fd[3], &buf as *const u8, 1);
        } else {
            write(fd[1], b" ".as_ptr(), 1);
            read(fd[2], &mut buf as *mut u8, 1);
            printf!("{}: received pong\n", getpid());
            wait(0 as *const u8);
        }

        exit(0);
    }
}
