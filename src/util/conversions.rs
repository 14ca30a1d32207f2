/// Is the value a power of two?
pub const fn is_power_of_two(val: usize) -> bool {
    val != 0 && (val & (val - 1)) == 0
}

/// Align up a value to a power-of-two alignment.
pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

/// Round a value up to the next multiple of `align`. Unlike [`raw_align_up`], the alignment
/// does not have to be a power of two: a 12-byte structure with a 5-byte alignment takes 15 bytes.
pub const fn align_up(val: usize, align: usize) -> usize {
    debug_assert!(align > 0);
    if is_power_of_two(align) {
        raw_align_up(val, align)
    } else {
        val.div_ceil(align) * align
    }
}
