pub fn memset(dst: *mut u8, c: u8, n: usize) -> *mut u8{
    for i in 0..n {
        unsafe {
            dst.add(i).write(c)
        }
    }
    dst
}

// Copies n bytes from src to dst. The regions may overlap.
pub fn memmove(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    if n == 0 || dst as *const u8 == src {
        return dst;
    }

    unsafe {
        if (src as usize) < (dst as usize) && (src as usize) + n > dst as usize {
            // Overlapping, src before dst: copy backwards.
            for i in (0..n).rev() {
                dst.add(i).write(src.add(i).read());
            }
        } else {
            for i in 0..n {
                dst.add(i).write(src.add(i).read());
            }
        }
    }
    dst
}

// Length of the nul-terminated string at s, not including the nul byte.
pub fn strlen(s: *const u8) -> usize {
    let mut n = 0;
    unsafe {
        while s.add(n).read() != 0 {
            n += 1;
        }
    }
    n
}