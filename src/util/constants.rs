/// log2 of the number of bytes in a byte
pub const LOG_BYTES_IN_BYTE: u8 = 0;
/// The number of bytes in a byte
pub const BYTES_IN_BYTE: usize = 1;
/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in an address. Object references and reference fields have this width.
#[cfg(target_pointer_width = "32")]
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
/// log2 of the number of bytes in an address. Object references and reference fields have this width.
#[cfg(target_pointer_width = "64")]
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// The widest byte run a bit field may span. Bit fields are read and written as one `u64`.
pub const MAX_BIT_FIELD_BYTES: usize = std::mem::size_of::<u64>();

const_assert_eq!(BYTES_IN_ADDRESS, std::mem::size_of::<usize>());
const_assert!(BYTES_IN_ADDRESS <= MAX_BIT_FIELD_BYTES);

/// Scalar field widths the type generator draws from.
pub const SCALAR_FIELD_SIZES: [usize; 6] = [1, 2, 4, 8, 16, 32];

/// The default allocation volume (in bytes) between two stress collections.
pub const DEFAULT_STRESS_FACTOR: usize = 4 * BYTES_IN_MBYTE;

/// How many reference hops a mutator takes at most when it looks for a deep target.
pub const MAX_DEEP_TARGET_HOPS: usize = 100;
