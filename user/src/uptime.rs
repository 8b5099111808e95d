#![no_std]
#![feature(start)]

use ulib::{fprintf, printf};
use ulib::stubs::{exit, uptime};

#[start]
fn main(argc: isize, _argv: *const *const u8) -> isize {
    unsafe {
        if argc != 1 {
            fprintf!(2, "usage: uptime\n");
            exit(1);
        }

        let mut seconds = uptime();
        let minutes_total = seconds / 60;
        seconds %= 60;
        let hours_total = minutes_total / 60;
        let minutes = minutes_total % 60;
        let days = hours_total / 24;
        let hours = hours_total % 24;

        if days != 0 {
            printf!("{} days {} hours {} minutes {} seconds\n", days, hours, minutes, seconds);
        } else if hours != 0 {
            printf!("{} hours {} minutes {} seconds\n", hours, minutes, seconds);
        } else if minutes != 0 {
            printf!("{} minutes {} seconds\n", minutes, seconds);
        } else {
            printf!("{} seconds\n", seconds);
        }
    }

    0
}
