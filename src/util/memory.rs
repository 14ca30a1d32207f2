use crate::util::Address;

/// Set `len` bytes from `start` to zero.
///
/// # Safety
/// The range must be writable memory owned by the caller.
pub unsafe fn zero(start: Address, len: usize) {
    std::ptr::write_bytes(start.to_mut_ptr::<u8>(), 0, len);
}

/// Copy `len` bytes from `from` to `to`. The two ranges must not overlap.
///
/// # Safety
/// `from` must be readable and `to` writable for `len` bytes.
pub unsafe fn copy(from: Address, to: Address, len: usize) {
    debug_assert!(from + len <= to || to + len <= from, "{} and {} overlap", from, to);
    std::ptr::copy_nonoverlapping(from.to_ptr::<u8>(), to.to_mut_ptr::<u8>(), len);
}
