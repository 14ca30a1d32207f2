use std::sync::Arc;

use bytemuck::{AnyBitPattern, NoUninit};

use super::LayoutContext;
use crate::util::constants::{BITS_IN_BYTE, BYTES_IN_ADDRESS, MAX_BIT_FIELD_BYTES};
use crate::util::Address;

/// A placed field: where it lives inside a block and how to read and write it.
///
/// All accessors take the *block pointer*. A whole-byte field occupies
/// `[offset, offset + size)`. A bit field occupies bits `[bit_index - bits_count, bit_index)`
/// of the little-endian integer formed by the `size` bytes at `offset`.
///
/// Reference fields hold object pointers in memory but present block pointers through
/// [`get_value`](FieldDescriptor::get_value) and [`set_value`](FieldDescriptor::set_value):
/// the object reference difference of the owning [`LayoutContext`] is added on store and
/// subtracted on load. Zero is stored and loaded unchanged.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    number: usize,
    name: String,
    offset: usize,
    size: usize,
    bit_index: usize,
    bits_count: usize,
    is_reference: bool,
    context: Arc<LayoutContext>,
}

impl FieldDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        number: usize,
        name: String,
        offset: usize,
        size: usize,
        bit_index: usize,
        bits_count: usize,
        is_reference: bool,
        context: Arc<LayoutContext>,
    ) -> Self {
        debug_assert!(bits_count == 0 || size <= MAX_BIT_FIELD_BYTES);
        FieldDescriptor {
            number,
            name,
            offset,
            size,
            bit_index,
            bits_count,
            is_reference,
            context,
        }
    }

    /// Declaration order within the structure, counting inherited fields.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset from the block start.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes occupied. For a bit field this is the whole enclosing run.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bit_index(&self) -> usize {
        self.bit_index
    }

    pub fn bits_count(&self) -> usize {
        self.bits_count
    }

    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    pub fn is_bit_field(&self) -> bool {
        self.bits_count > 0
    }

    /// One past the last byte of the field.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    fn address_in(&self, block: Address) -> Address {
        block + self.offset
    }

    fn bit_mask(&self) -> u64 {
        // bits_count < 64 holds because bit_index < size * 8 <= 64.
        ((1u64 << self.bits_count) - 1) << self.bit_shift()
    }

    fn bit_shift(&self) -> usize {
        self.bit_index - self.bits_count
    }

    unsafe fn load_run(&self, block: Address) -> u64 {
        let mut bytes = [0u8; MAX_BIT_FIELD_BYTES];
        std::ptr::copy_nonoverlapping(
            self.address_in(block).to_ptr::<u8>(),
            bytes.as_mut_ptr(),
            self.size,
        );
        u64::from_le_bytes(bytes)
    }

    unsafe fn store_run(&self, block: Address, run: u64) {
        let bytes = run.to_le_bytes();
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            self.address_in(block).to_mut_ptr::<u8>(),
            self.size,
        );
    }

    /// Copy the field's value out of `block` into the first `size` bytes of `buffer`.
    ///
    /// A bit field is delivered as a little-endian integer holding just the field's bits,
    /// shifted down to bit 0. A reference field is delivered as a block pointer.
    ///
    /// # Safety
    /// `block` must point to a live block of a structure that contains this field.
    pub unsafe fn get_value(&self, block: Address, buffer: &mut [u8]) {
        assert!(
            buffer.len() >= self.size,
            "buffer of {} bytes cannot hold field `{}` of {} bytes",
            buffer.len(),
            self.name,
            self.size
        );
        let buffer = &mut buffer[..self.size];
        if self.is_bit_field() {
            let value = (self.load_run(block) & self.bit_mask()) >> self.bit_shift();
            buffer.copy_from_slice(&value.to_le_bytes()[..self.size]);
            return;
        }
        std::ptr::copy_nonoverlapping(
            self.address_in(block).to_ptr::<u8>(),
            buffer.as_mut_ptr(),
            self.size,
        );
        if self.is_reference {
            let raw: usize = bytemuck::pod_read_unaligned(buffer);
            if raw != 0 {
                buffer.copy_from_slice(bytemuck::bytes_of(
                    &(raw - self.context.obj_ref_diff()),
                ));
            }
        }
    }

    /// Write the first `size` bytes of `value` into the field inside `block`.
    ///
    /// For a bit field the value is masked to `bits_count` bits and merged into the run, so
    /// bits outside the field keep their contents. For a reference field `value` holds a
    /// block pointer and the matching object pointer is stored.
    ///
    /// # Safety
    /// `block` must point to a live block of a structure that contains this field.
    pub unsafe fn set_value(&self, block: Address, value: &[u8]) {
        assert!(
            value.len() >= self.size,
            "value of {} bytes is too short for field `{}` of {} bytes",
            value.len(),
            self.name,
            self.size
        );
        let value = &value[..self.size];
        if self.is_bit_field() {
            let mut bytes = [0u8; MAX_BIT_FIELD_BYTES];
            bytes[..self.size].copy_from_slice(value);
            self.store_bits(block, u64::from_le_bytes(bytes));
            return;
        }
        if self.is_reference {
            let raw: usize = bytemuck::pod_read_unaligned(value);
            let stored = if raw == 0 {
                0
            } else {
                raw + self.context.obj_ref_diff()
            };
            self.address_in(block).store_unaligned::<usize>(stored);
            return;
        }
        std::ptr::copy_nonoverlapping(
            value.as_ptr(),
            self.address_in(block).to_mut_ptr::<u8>(),
            self.size,
        );
    }

    /// Read a bit field.
    ///
    /// # Safety
    /// See [`get_value`](FieldDescriptor::get_value).
    pub unsafe fn load_bits(&self, block: Address) -> u64 {
        debug_assert!(self.is_bit_field(), "`{}` is not a bit field", self.name);
        (self.load_run(block) & self.bit_mask()) >> self.bit_shift()
    }

    /// Write a bit field, leaving the other bits of its run untouched.
    ///
    /// # Safety
    /// See [`set_value`](FieldDescriptor::set_value).
    pub unsafe fn store_bits(&self, block: Address, value: u64) {
        debug_assert!(self.is_bit_field(), "`{}` is not a bit field", self.name);
        let mask = self.bit_mask();
        let run = self.load_run(block);
        self.store_run(block, (run & !mask) | ((value << self.bit_shift()) & mask));
    }

    /// Read a whole-byte scalar field as `T`. `T` must be exactly as wide as the field.
    ///
    /// # Safety
    /// See [`get_value`](FieldDescriptor::get_value).
    pub unsafe fn load<T: AnyBitPattern>(&self, block: Address) -> T {
        debug_assert_eq!(std::mem::size_of::<T>(), self.size);
        debug_assert!(!self.is_bit_field() && !self.is_reference);
        self.address_in(block).load_unaligned::<T>()
    }

    /// Write a whole-byte scalar field. `T` must be exactly as wide as the field.
    ///
    /// # Safety
    /// See [`set_value`](FieldDescriptor::set_value).
    pub unsafe fn store<T: NoUninit>(&self, block: Address, value: T) {
        debug_assert_eq!(std::mem::size_of::<T>(), self.size);
        self.set_value(block, bytemuck::bytes_of(&value));
    }

    /// Read a reference field as a block pointer. A null reference reads as the zero address.
    ///
    /// # Safety
    /// See [`get_value`](FieldDescriptor::get_value).
    pub unsafe fn load_reference(&self, block: Address) -> Address {
        debug_assert!(self.is_reference, "`{}` is not a reference field", self.name);
        let mut buffer = [0u8; BYTES_IN_ADDRESS];
        self.get_value(block, &mut buffer);
        Address::from_usize(usize::from_ne_bytes(buffer))
    }

    /// Write a block pointer into a reference field. The zero address stores null.
    ///
    /// # Safety
    /// See [`set_value`](FieldDescriptor::set_value).
    pub unsafe fn store_reference(&self, block: Address, target: Address) {
        debug_assert!(self.is_reference, "`{}` is not a reference field", self.name);
        self.set_value(block, &target.as_usize().to_ne_bytes());
    }

    /// The raw pointer-width word a reference field holds, without any translation.
    ///
    /// # Safety
    /// See [`get_value`](FieldDescriptor::get_value).
    pub unsafe fn load_raw_word(&self, block: Address) -> usize {
        debug_assert_eq!(self.size, BYTES_IN_ADDRESS);
        self.address_in(block).load_unaligned::<usize>()
    }

    /// Bits of the field, for diagnostics.
    pub fn bit_range(&self) -> Option<std::ops::Range<usize>> {
        self.is_bit_field().then(|| {
            let base = self.offset * BITS_IN_BYTE;
            base + self.bit_shift()..base + self.bit_index
        })
    }
}
