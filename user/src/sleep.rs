#![no_std]
#![feature(start)]

use ulib::fprintf;
use ulib::stubs::{exit, sleep};

fn atoi(s: &[u8]) -> i32 {
    let mut n = 0;
    for &c in s {
        if !c.is_ascii_digit() {
            break;
        }
        n = n * 10 + (c - b'0') as i32;
    }
    n
}

#[start]
fn main(argc: isize, argv: *const *const u8) -> isize {
    unsafe {
        if argc != 2 {
            fprintf!(2, "usage: sleep secs\n");
            exit(1);
        }

        let args = core::slice::from_raw_parts(argv, argc as usize);
        let arg = core::ffi::CStr::from_ptr(args[1] as *const i8).to_bytes();
        let secs = atoi(arg);
        if secs == 0 {
            fprintf!(2, "sleep: invalid seconds\n");
            exit(1);
        }

        sleep(secs);
    }

    0
}
