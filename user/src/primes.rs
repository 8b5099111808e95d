#![no_std]
#![feature(start)]

use core::mem::size_of;
use ulib::{fprintf, printf};
use ulib::stubs::{close, exit, fork, pipe, read, wait, write};

unsafe fn sieve(read_pipe: i32) -> ! {
    let mut num: i32 = 0;
    if read(read_pipe, &mut num as *mut i32 as *mut u8, size_of::<i32>() as i32) <= 0 {
        close(read_pipe);
        exit(0);
    }
    printf!("prime {}\n", num);

    let mut fd: [i32; 2] = [0; 2];
    pipe(fd.as_ptr());

    if fork() == 0 {
        close(fd[1]);
        close(read_pipe);
        sieve(fd[0]);
    } else {
        close(fd[0]);
        let mut n: i32 = 0;
        while read(read_pipe, &mut n as *mut i32 as *mut u8, size_of::<i32>() as i32) > 0 {
            if n % num != 0 {
                write(fd[1], &n as *const i32 as *const u8, size_of::<i32>() as i32);
            }
        }
        close(read_pipe);
        close(fd[1]);
        exit(0);
    }
}

#[start]
fn main(argc: isize, _argv: *const *const u8) -> isize {
    unsafe {
        if argc != 1 {
            fprintf!(2, "usage: primes\n");
            exit(1);
        }

        let mut fd: [i32; 2] = [0; 2];
        pipe(fd.as_ptr());

        if fork() == 0 {
            close(fd[1]);
            sieve(fd[0]);
        } else {
            close(fd[0]);
            for i in 2..=35i32 {
                write(fd[1], &i as *const i32 as *const u8, size_of::<i32>() as i32);
            }
            close(fd[1]);
            while wait(0 as *const u8) != -1 {}
        }

        exit(0);
    }
}
