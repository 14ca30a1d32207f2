//! Thin wrappers over the system allocator that speak [`Address`] instead of raw pointers.

use crate::util::Address;

/// Manually allocate memory. Similar to libc's malloc. A failed allocation yields the zero address.
pub fn malloc(size: usize) -> Address {
    Address::from_mut_ptr(unsafe { libc::malloc(size) })
}

/// Manually allocate memory and initialize the bytes in the allocated memory to zero. Similar to libc's calloc.
pub fn calloc(num: usize, size: usize) -> Address {
    Address::from_mut_ptr(unsafe { libc::calloc(num, size) })
}

/// Manually free the memory that is returned from other manual allocation functions in this module.
pub fn free(addr: Address) {
    unsafe { libc::free(addr.to_mut_ptr()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malloc_free() {
        let block = malloc(64);
        assert!(!block.is_zero());
        free(block);
    }

    #[test]
    fn test_calloc_zeroes() {
        let block = calloc(4, 8);
        assert!(!block.is_zero());
        for i in 0..4 {
            assert_eq!(unsafe { (block + i * 8).load_unaligned::<u64>() }, 0);
        }
        free(block);
    }
}
