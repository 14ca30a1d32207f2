//! The layout engine: turns field requests into placed fields and reads and writes them in raw memory.
//!
//! A [`StructureBuilder`] collects [`FieldBuilder`] requests in declaration order and
//! [`completes`](StructureBuilder::complete) them into an immutable [`StructureLayout`] whose
//! [`FieldDescriptor`]s know their byte offset and size, and, for bit fields, their bit range.
//! Every descriptor created through the same [`LayoutContext`] shares one object reference
//! difference, which is how reference fields translate between block and object pointers.

mod builder;
mod field;

pub use self::builder::{FieldAlignment, FieldBuilder, StructureBuilder};
pub use self::field::FieldDescriptor;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// State shared by all layouts of one object model.
#[derive(Debug, Default)]
pub struct LayoutContext {
    obj_ref_diff: AtomicUsize,
}

impl LayoutContext {
    pub fn new() -> Arc<Self> {
        Arc::new(LayoutContext::default())
    }

    /// Bytes between a block start and the object pointer the mutator sees.
    pub fn obj_ref_diff(&self) -> usize {
        self.obj_ref_diff.load(Ordering::Relaxed)
    }

    /// Set once the object header is laid out. References written before this use a difference of 0.
    pub(crate) fn set_obj_ref_diff(&self, diff: usize) {
        self.obj_ref_diff.store(diff, Ordering::Relaxed);
    }
}

/// A completed structure: placed fields plus the structure's sizes.
#[derive(Clone, Debug)]
pub struct StructureLayout {
    name: String,
    fields: Vec<FieldDescriptor>,
    data_size: usize,
    aligned_size: usize,
}

impl StructureLayout {
    pub(crate) fn new(
        name: String,
        fields: Vec<FieldDescriptor>,
        data_size: usize,
        aligned_size: usize,
    ) -> Self {
        debug_assert!(aligned_size >= data_size);
        StructureLayout {
            name,
            fields,
            data_size,
            aligned_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order. A field's number is its index here.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, number: usize) -> Option<&FieldDescriptor> {
        self.fields.get(number)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDescriptor> + '_ {
        self.fields.iter().filter(|f| f.is_reference())
    }

    /// One past the last byte any field touches.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// The data size rounded up to the structure alignment. This is what gets allocated.
    pub fn aligned_size(&self) -> usize {
        self.aligned_size
    }
}

impl fmt::Display for StructureLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({} bytes, {} aligned)",
            self.name, self.data_size, self.aligned_size
        )?;
        for field in &self.fields {
            write!(f, "  #{} {} @{}+{}", field.number(), field.name(), field.offset(), field.size())?;
            if field.is_reference() {
                write!(f, " ref")?;
            }
            if let Some(bits) = field.bit_range() {
                write!(f, " bits {:?}", bits)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
