use bytemuck::NoUninit;

use std::fmt;
use std::mem;
use std::ops::{Add, Sub};

/// The start of a memory block handed out by a memory manager.
///
/// Blocks begin with the collector-owned part of the object header. The mutator never sees
/// block pointers; it works with [`ObjectReference`]s, which the object model derives from a
/// block by adding the offset of the `typeId` header field.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq, NoUninit, Default)]
pub struct Address(usize);

impl Add<usize> for Address {
    type Output = Address;
    fn add(self, bytes: usize) -> Address {
        Address(self.0 + bytes)
    }
}

impl Sub<usize> for Address {
    type Output = Address;
    fn sub(self, bytes: usize) -> Address {
        debug_assert!(self.0 >= bytes, "{} - {} underflows", self, bytes);
        Address(self.0 - bytes)
    }
}

impl Address {
    /// No block. Reference fields that hold null load as this.
    pub const ZERO: Self = Address(0);

    pub fn from_mut_ptr<T>(ptr: *mut T) -> Address {
        Address(ptr as usize)
    }

    /// # Safety
    /// The caller is responsible for the value being a block (or zero) before it is accessed.
    pub const unsafe fn from_usize(raw: usize) -> Address {
        Address(raw)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    pub fn to_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Read a `T` at this address. Field offsets are arbitrary, so no alignment is assumed.
    ///
    /// # Safety
    /// `size_of::<T>()` bytes at the address must be readable.
    pub unsafe fn load_unaligned<T: Copy>(self) -> T {
        (self.0 as *const T).read_unaligned()
    }

    /// Write a `T` at this address without dropping what was there.
    ///
    /// # Safety
    /// `size_of::<T>()` bytes at the address must be writable.
    pub unsafe fn store_unaligned<T>(self, value: T) {
        (self.0 as *mut T).write_unaligned(value);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// ObjectReference represents the address the mutator knows an object by.
///
/// It points at the object's `typeId` header field, which sits a fixed distance (the
/// *object reference difference*) past the block start. The same value is what reference fields
/// hold in memory, so a collector that follows the raw bits of a reference field lands on an
/// object pointer, not on a block pointer. The [`NULL`](ObjectReference::NULL) reference is zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq, NoUninit, Default)]
pub struct ObjectReference(usize);

impl ObjectReference {
    pub const NULL: ObjectReference = ObjectReference(0);

    /// The raw object pointer. Use the object model to get at the block.
    pub fn to_raw_address(self) -> Address {
        Address(self.0)
    }

    pub fn from_raw_address(addr: Address) -> ObjectReference {
        ObjectReference(addr.0)
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

const_assert_eq!(mem::size_of::<Address>(), mem::size_of::<usize>());
const_assert_eq!(mem::size_of::<ObjectReference>(), mem::size_of::<usize>());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_arithmetic() {
        let block = unsafe { Address::from_usize(0x1000) };
        assert_eq!(block + 8usize, unsafe { Address::from_usize(0x1008) });
        assert_eq!(block - 8usize, unsafe { Address::from_usize(0xff8) });
        assert!(Address::ZERO.is_zero());
        assert!(!block.is_zero());
    }

    #[test]
    fn object_reference_round_trip() {
        let a = unsafe { Address::from_usize(0x2008) };
        let o = ObjectReference::from_raw_address(a);
        assert_eq!(o.to_raw_address(), a);
        assert!(!o.is_null());
        assert!(ObjectReference::NULL.is_null());
        assert_eq!(format!("{}", o), "0x2008");
        assert_eq!(format!("{:?}", a), "0x2008");
    }

    #[test]
    fn unaligned_access() {
        let mut buf = [0u8; 16];
        let base = Address::from_mut_ptr(buf.as_mut_ptr());
        unsafe {
            (base + 3usize).store_unaligned::<u32>(0xdead_beef);
            assert_eq!((base + 3usize).load_unaligned::<u32>(), 0xdead_beef);
        }
        assert_eq!(buf[0], 0);
        assert_eq!(buf[7], 0);
    }
}
