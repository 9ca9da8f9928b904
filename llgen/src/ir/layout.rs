//! Struct layouts and type sizes
//!
//! Sizes follow natural alignment: every scalar is aligned to its own size,
//! pointers are 8 bytes, and a struct is aligned to its most-aligned field.

use rustc_hash::FxHashMap;

use super::{Module, Type};
use crate::CompileError;

/// Field order and name-to-index mapping of one struct
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    /// Struct name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<(String, Type)>,
    index: FxHashMap<String, u32>,
}

impl StructLayout {
    /// Build a layout from fields in declaration order
    pub fn new(name: String, fields: Vec<(String, Type)>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(position, (field, _))| (field.clone(), position as u32))
            .collect();
        Self {
            name,
            fields,
            index,
        }
    }

    /// Position of a field, which is also its address-computation index
    pub fn field_index(&self, field: &str) -> Option<u32> {
        self.index.get(field).copied()
    }

    /// Type of the field at `index`
    pub fn field_type(&self, index: u32) -> Option<&Type> {
        self.fields.get(index as usize).map(|(_, ty)| ty)
    }
}

/// Byte size and alignment of a scalar width in bits
fn scalar(bits: u8) -> (u32, u32) {
    let bytes = u32::from(bits).div_ceil(8).next_power_of_two();
    (bytes, bytes)
}

impl Module {
    /// Size of a type in bytes
    pub fn size_of(&self, ty: &Type) -> Result<u32, CompileError> {
        self.size_align(ty, &mut Vec::new()).map(|(size, _)| size)
    }

    /// Alignment of a type in bytes
    pub fn align_of(&self, ty: &Type) -> Result<u32, CompileError> {
        self.size_align(ty, &mut Vec::new()).map(|(_, align)| align)
    }

    /// Byte offset of every field of a struct, in declaration order
    pub fn field_offsets(&self, struct_name: &str) -> Result<Vec<u32>, CompileError> {
        let layout = self.layout_or_err(struct_name)?;
        let mut offsets = Vec::with_capacity(layout.fields.len());
        let mut offset: u32 = 0;
        for (_, ty) in &layout.fields {
            let (size, align) = self.size_align(ty, &mut vec![struct_name.to_string()])?;
            offset = offset.next_multiple_of(align);
            offsets.push(offset);
            offset += size;
        }
        Ok(offsets)
    }

    fn layout_or_err(&self, name: &str) -> Result<&StructLayout, CompileError> {
        self.struct_layout(name)
            .ok_or_else(|| CompileError::InvalidIr(format!("unknown struct type '{}'", name)))
    }

    fn size_align(&self, ty: &Type, visiting: &mut Vec<String>) -> Result<(u32, u32), CompileError> {
        match ty {
            Type::Void => Ok((0, 1)),
            Type::Int(bits) | Type::Float(bits) => Ok(scalar(*bits)),
            Type::Ptr => Ok((8, 8)),
            Type::Struct(name) => {
                if visiting.contains(name) {
                    return Err(CompileError::InvalidIr(format!(
                        "struct '{}' contains itself by value",
                        name
                    )));
                }
                let layout = self.layout_or_err(name)?;
                visiting.push(name.clone());
                let mut size: u32 = 0;
                let mut align: u32 = 1;
                for (_, field) in &layout.fields {
                    let (field_size, field_align) = self.size_align(field, visiting)?;
                    size = size.next_multiple_of(field_align) + field_size;
                    align = align.max(field_align);
                }
                visiting.pop();
                Ok((size.next_multiple_of(align), align))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with(layouts: Vec<StructLayout>) -> Module {
        let mut module = Module::new("layout".to_string());
        module.structs = layouts;
        module
    }

    #[test]
    fn field_indices_follow_declaration_order() {
        let layout = StructLayout::new(
            "P".to_string(),
            vec![
                ("x".to_string(), Type::Int(64)),
                ("y".to_string(), Type::Int(64)),
            ],
        );
        assert_eq!(layout.field_index("x"), Some(0));
        assert_eq!(layout.field_index("y"), Some(1));
        assert_eq!(layout.field_index("z"), None);
    }

    #[test]
    fn struct_fields_are_naturally_aligned() {
        let module = module_with(vec![
            StructLayout::new(
                "Inner".to_string(),
                vec![
                    ("tag".to_string(), Type::Int(8)),
                    ("value".to_string(), Type::Float(32)),
                ],
            ),
            StructLayout::new(
                "Outer".to_string(),
                vec![
                    ("flag".to_string(), Type::Int(1)),
                    ("inner".to_string(), Type::Struct("Inner".to_string())),
                    ("next".to_string(), Type::Ptr),
                ],
            ),
        ]);
        assert_eq!(module.size_of(&Type::Struct("Inner".to_string())).ok(), Some(8));
        assert_eq!(module.field_offsets("Outer").ok(), Some(vec![0, 4, 16]));
        assert_eq!(module.size_of(&Type::Struct("Outer".to_string())).ok(), Some(24));
        assert_eq!(module.align_of(&Type::Struct("Outer".to_string())).ok(), Some(8));
    }

    #[test]
    fn byte_fields_are_packed() {
        let module = module_with(vec![StructLayout::new(
            "Pair".to_string(),
            vec![
                ("a".to_string(), Type::Int(8)),
                ("c".to_string(), Type::Int(8)),
            ],
        )]);
        assert_eq!(module.field_offsets("Pair").ok(), Some(vec![0, 1]));
        assert_eq!(module.size_of(&Type::Struct("Pair".to_string())).ok(), Some(2));
    }

    #[test]
    fn recursive_struct_by_value_is_rejected() {
        let module = module_with(vec![StructLayout::new(
            "Loop".to_string(),
            vec![("again".to_string(), Type::Struct("Loop".to_string()))],
        )]);
        assert!(module.size_of(&Type::Struct("Loop".to_string())).is_err());
    }
}
