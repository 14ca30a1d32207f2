//! The type registry: a seeded universe of object types sharing one header.
//!
//! Every object starts with the header. The collector contributes the leading header fields
//! through [`ManagementContext::augment_object_layout`](crate::gc::ManagementContext::augment_object_layout);
//! the registry appends a pointer-width `typeId` field after them. The object pointer the
//! mutator sees points at `typeId`, so the plugin-owned prefix sits at negative offsets from it.
//!
//! ```text
//!  block                 object
//!  |                     |
//!  v                     v
//!  +---------------------+--------+----------------------------+
//!  | plugin header bytes | typeId | fields of the concrete type |
//!  +---------------------+--------+----------------------------+
//!  <--- obj_ref_diff ---->
//! ```

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{ConfigError, HarnessError, LayoutError, ObjectModelError};
use crate::layout::{FieldDescriptor, LayoutContext, StructureBuilder, StructureLayout};
use crate::util::constants::{BYTES_IN_ADDRESS, SCALAR_FIELD_SIZES};
use crate::util::{memory, Address, ObjectReference};

/// Name of the registry-owned header field that holds the type id.
pub const TYPE_ID_FIELD: &str = "typeId";
/// Type id of the bare header. Never allocated.
pub const HEADER_TYPE_ID: usize = 0;

pub struct ObjectModel {
    context: Arc<LayoutContext>,
    type_id_field: FieldDescriptor,
    types: Vec<StructureLayout>,
}

impl ObjectModel {
    /// Lay out the header and generate `type_count - 1` concrete types from `seed`.
    /// `type_count` includes the header, so it must be at least 2.
    ///
    /// `augment` receives the header builder before `typeId` is appended. It may add fields
    /// but should leave the builder's alignment configuration alone.
    pub fn new<F>(
        context: Arc<LayoutContext>,
        augment: F,
        type_count: usize,
        max_fields: usize,
        seed: u64,
    ) -> Result<Self, HarnessError>
    where
        F: FnOnce(&mut StructureBuilder),
    {
        if type_count < 2 {
            return Err(ConfigError::TooFewTypes { type_count }.into());
        }
        let mut header = StructureBuilder::new(context.clone(), "object");
        augment(&mut header);
        let type_id_number = header
            .define_field(TYPE_ID_FIELD)
            .set_size(BYTES_IN_ADDRESS)
            .number();
        let header_layout = header.complete()?;
        let type_id_field = header_layout.fields()[type_id_number].clone();
        context.set_obj_ref_diff(type_id_field.offset());
        debug!("Object header:\n{}", header_layout);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut types = Vec::with_capacity(type_count);
        types.push(header_layout);
        for type_id in 1..type_count {
            types.push(Self::generate_type(&header, type_id, max_fields, &mut rng)?);
        }

        info!(
            "Generated {} object types (header {} bytes, object reference difference {})",
            types.len(),
            types[HEADER_TYPE_ID].data_size(),
            context.obj_ref_diff()
        );
        Ok(ObjectModel {
            context,
            type_id_field,
            types,
        })
    }

    fn generate_type(
        header: &StructureBuilder,
        type_id: usize,
        max_fields: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<StructureLayout, LayoutError> {
        let mut builder = StructureBuilder::derive(format!("t{}", type_id), header);
        let field_count = if max_fields == 0 {
            0
        } else {
            rng.random_range(0..max_fields)
        };
        let mut has_reference = false;
        for i in 0..field_count {
            let field = builder.define_field(format!("t{}f{}", type_id, i));
            if rng.random_bool(0.5) {
                field.set_reference();
                has_reference = true;
            } else {
                field.set_size(SCALAR_FIELD_SIZES[rng.random_range(0..SCALAR_FIELD_SIZES.len())]);
            }
        }
        if !has_reference {
            builder
                .define_field(format!("t{}f{}", type_id, field_count))
                .set_reference();
        }
        let layout = builder.complete()?;
        trace!("{}", layout);
        Ok(layout)
    }

    /// Number of layouts, the header included. Valid allocation type ids are `1..type_count()`.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// The header layout (type id 0).
    pub fn header(&self) -> &StructureLayout {
        &self.types[HEADER_TYPE_ID]
    }

    pub fn type_id_field(&self) -> &FieldDescriptor {
        &self.type_id_field
    }

    pub fn obj_ref_diff(&self) -> usize {
        self.context.obj_ref_diff()
    }

    pub fn object_to_block(&self, object: ObjectReference) -> Address {
        debug_assert!(!object.is_null());
        object.to_raw_address() - self.obj_ref_diff()
    }

    pub fn block_to_object(&self, block: Address) -> ObjectReference {
        debug_assert!(!block.is_zero());
        ObjectReference::from_raw_address(block + self.obj_ref_diff())
    }

    pub fn layout_of(&self, type_id: usize) -> Result<&StructureLayout, ObjectModelError> {
        self.types
            .get(type_id)
            .ok_or(ObjectModelError::UnknownTypeId { type_id })
    }

    /// # Safety
    /// `block` must be a live block initialized by [`initialize`](ObjectModel::initialize).
    pub unsafe fn type_id_of(&self, block: Address) -> usize {
        self.type_id_field.load::<usize>(block)
    }

    /// The layout of the object in `block`, found through its `typeId`.
    ///
    /// # Safety
    /// `block` must be a live block initialized by [`initialize`](ObjectModel::initialize).
    pub unsafe fn layout_for(&self, block: Address) -> Result<&StructureLayout, ObjectModelError> {
        self.layout_of(self.type_id_of(block))
    }

    /// Zero the object part of a freshly allocated block and stamp its type id.
    ///
    /// Bytes before the object pointer belong to the collector and are left as they are.
    ///
    /// # Safety
    /// `block` must be writable for the aligned size of `type_id`.
    pub unsafe fn initialize(
        &self,
        block: Address,
        type_id: usize,
    ) -> Result<ObjectReference, ObjectModelError> {
        let layout = self.layout_of(type_id)?;
        let object = self.block_to_object(block);
        memory::zero(
            object.to_raw_address(),
            layout.aligned_size() - self.obj_ref_diff(),
        );
        self.type_id_field.store::<usize>(block, type_id);
        Ok(object)
    }

    /// # Safety
    /// `object` must be a live, initialized object.
    pub unsafe fn reference_fields(
        &self,
        object: ObjectReference,
    ) -> Result<Vec<&FieldDescriptor>, ObjectModelError> {
        Ok(self
            .layout_for(self.object_to_block(object))?
            .reference_fields()
            .collect())
    }

    /// # Safety
    /// `object` must be a live, initialized object whose type contains `field`.
    pub unsafe fn read_reference(
        &self,
        object: ObjectReference,
        field: &FieldDescriptor,
    ) -> ObjectReference {
        let target = field.load_reference(self.object_to_block(object));
        if target.is_zero() {
            ObjectReference::NULL
        } else {
            self.block_to_object(target)
        }
    }

    /// # Safety
    /// `object` must be a live, initialized object whose type contains `field`.
    pub unsafe fn write_reference(
        &self,
        object: ObjectReference,
        field: &FieldDescriptor,
        value: ObjectReference,
    ) {
        let target = if value.is_null() {
            Address::ZERO
        } else {
            self.object_to_block(value)
        };
        field.store_reference(self.object_to_block(object), target);
    }
}
