use std::sync::Arc;

use super::{FieldDescriptor, LayoutContext, StructureLayout};
use crate::error::LayoutError;
use crate::util::constants::{BITS_IN_BYTE, BYTES_IN_ADDRESS, MAX_BIT_FIELD_BYTES};
use crate::util::conversions;

/// How a structure places fields that carry no explicit offset or alignment of their own.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum FieldAlignment {
    /// Align every field to its own size. A field whose size is not a power of two is
    /// rounded up to the next multiple of that size.
    #[default]
    Natural,
    /// Align every field to the given byte count.
    Fixed(usize),
    /// Place fields back to back.
    Packed,
}

/// A field request. Everything left at its default is computed by
/// [`StructureBuilder::complete`].
#[derive(Clone, Debug, Default)]
pub struct FieldBuilder {
    number: usize,
    name: String,
    /// Place the field exactly here. Conflicts with `alignment`.
    pub offset: Option<usize>,
    /// Byte size of a scalar field, or of the byte run enclosing a bit field.
    pub size: usize,
    /// Per-field alignment, applied before the structure's [`FieldAlignment`].
    pub alignment: Option<usize>,
    /// Exclusive upper bit of a bit field, counted from bit 0 of the run.
    pub bit_index: Option<usize>,
    pub bits_count: usize,
    pub is_reference: bool,
}

impl FieldBuilder {
    fn new(number: usize, name: String) -> Self {
        FieldBuilder {
            number,
            name,
            ..Default::default()
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make this a scalar of `size` bytes.
    pub fn set_size(&mut self, size: usize) -> &mut Self {
        self.size = size;
        self
    }

    /// Make this a pointer-width reference field.
    pub fn set_reference(&mut self) -> &mut Self {
        self.is_reference = true;
        self
    }

    /// Make this a bit field covering bits `[bit_index - bits_count, bit_index)`.
    pub fn set_bits(&mut self, bit_index: usize, bits_count: usize) -> &mut Self {
        self.bit_index = Some(bit_index);
        self.bits_count = bits_count;
        self
    }

    pub fn set_offset(&mut self, offset: usize) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn set_alignment(&mut self, alignment: usize) -> &mut Self {
        self.alignment = Some(alignment);
        self
    }

    /// Work out `(size, bit_index, bits_count)` for the request, or say what is wrong with it.
    fn footprint(&self, structure: &str) -> Result<(usize, usize, usize), LayoutError> {
        let invalid = |reason: String| LayoutError::InvalidField {
            structure: structure.to_string(),
            field: self.name.clone(),
            reason,
        };

        if self.is_reference {
            if self.bit_index.is_some() || self.bits_count != 0 {
                return Err(invalid("a reference field cannot be a bit field".into()));
            }
            if self.size != 0 {
                return Err(invalid("a reference field cannot have a preset size".into()));
            }
            return Ok((BYTES_IN_ADDRESS, 0, 0));
        }

        let Some(bit_index) = self.bit_index else {
            if self.bits_count != 0 {
                return Err(invalid("a bit count needs a bit index".into()));
            }
            if self.size == 0 {
                return Err(invalid("needs a positive size or bit count".into()));
            }
            return Ok((self.size, 0, 0));
        };

        if self.bits_count == 0 {
            return Err(invalid("needs a positive size or bit count".into()));
        }
        if bit_index < self.bits_count {
            return Err(invalid(format!(
                "bit index {} leaves no room for {} bits",
                bit_index, self.bits_count
            )));
        }
        let size = if self.size > 0 {
            self.size
        } else {
            bit_index / BITS_IN_BYTE + 1
        };
        if bit_index >= size * BITS_IN_BYTE {
            return Err(invalid(format!(
                "bit index {} is outside its {}-byte run",
                bit_index, size
            )));
        }
        if size > MAX_BIT_FIELD_BYTES {
            return Err(invalid(format!(
                "a bit field run spans at most {} bytes, not {}",
                MAX_BIT_FIELD_BYTES, size
            )));
        }
        Ok((size, bit_index, self.bits_count))
    }
}

/// Collects field requests for one structure and turns them into a [`StructureLayout`].
///
/// A builder derived from another starts with a copy of the other's field requests, so a
/// derived structure lays its inherited fields out exactly like the base and appends its own
/// fields after them.
#[derive(Clone, Debug)]
pub struct StructureBuilder {
    context: Arc<LayoutContext>,
    name: String,
    fields: Vec<FieldBuilder>,
    /// Placement rule for fields without an explicit offset.
    pub field_alignment: FieldAlignment,
    /// The aligned size of the structure is its data size rounded up to this. Any positive
    /// value works, not only powers of two.
    pub structure_alignment: Option<usize>,
}

impl StructureBuilder {
    pub fn new(context: Arc<LayoutContext>, name: impl Into<String>) -> Self {
        StructureBuilder {
            context,
            name: name.into(),
            fields: vec![],
            field_alignment: FieldAlignment::default(),
            structure_alignment: None,
        }
    }

    /// A builder for a structure that inherits all of `base`'s field requests and alignment rules.
    pub fn derive(name: impl Into<String>, base: &StructureBuilder) -> Self {
        StructureBuilder {
            name: name.into(),
            ..base.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<LayoutContext> {
        &self.context
    }

    /// Append a field request. Its number is its position among all the structure's fields.
    pub fn define_field(&mut self, name: impl Into<String>) -> &mut FieldBuilder {
        let number = self.fields.len();
        self.fields.push(FieldBuilder::new(number, name.into()));
        &mut self.fields[number]
    }

    fn check_alignment(&self, alignment: usize) -> Result<usize, LayoutError> {
        if alignment == 0 {
            return Err(LayoutError::InvalidAlignment {
                structure: self.name.clone(),
                alignment,
            });
        }
        Ok(alignment)
    }

    /// Place every field and compute the structure's sizes.
    ///
    /// Fields are placed in declaration order. A field with an explicit offset goes exactly
    /// there and must not overlap the previous field. Other fields start at the end of the
    /// previous field, rounded up first by their own alignment and then by the structure's
    /// [`FieldAlignment`].
    pub fn complete(&self) -> Result<StructureLayout, LayoutError> {
        if let FieldAlignment::Fixed(alignment) = self.field_alignment {
            self.check_alignment(alignment)?;
        }

        let mut placed: Vec<FieldDescriptor> = Vec::with_capacity(self.fields.len());
        let mut cursor = 0usize;

        for request in &self.fields {
            let (size, bit_index, bits_count) = request.footprint(&self.name)?;
            let offset = match request.offset {
                Some(offset) => {
                    if request.alignment.is_some() {
                        return Err(LayoutError::InvalidField {
                            structure: self.name.clone(),
                            field: request.name.clone(),
                            reason: "an explicit offset cannot be combined with an alignment"
                                .into(),
                        });
                    }
                    if offset < cursor {
                        return Err(LayoutError::InvalidField {
                            structure: self.name.clone(),
                            field: request.name.clone(),
                            reason: format!(
                                "offset {} overlaps the previous field, which ends at {}",
                                offset, cursor
                            ),
                        });
                    }
                    offset
                }
                None => {
                    let mut offset = cursor;
                    if let Some(alignment) = request.alignment {
                        offset = conversions::align_up(offset, self.check_alignment(alignment)?);
                    }
                    match self.field_alignment {
                        FieldAlignment::Natural => conversions::align_up(offset, size),
                        FieldAlignment::Fixed(alignment) => {
                            conversions::align_up(offset, alignment)
                        }
                        FieldAlignment::Packed => offset,
                    }
                }
            };
            cursor = offset + size;
            placed.push(FieldDescriptor::new(
                request.number,
                request.name.clone(),
                offset,
                size,
                bit_index,
                bits_count,
                request.is_reference,
                self.context.clone(),
            ));
        }

        let data_size = cursor;
        let aligned_size = match self.structure_alignment {
            Some(alignment) => conversions::align_up(data_size, self.check_alignment(alignment)?),
            None => data_size,
        };

        trace!(
            "Completed structure {}: {} fields, data size {}, aligned size {}",
            self.name,
            placed.len(),
            data_size,
            aligned_size
        );
        Ok(StructureLayout::new(
            self.name.clone(),
            placed,
            data_size,
            aligned_size,
        ))
    }
}
