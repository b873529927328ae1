//! Higher-level Java heap abstractions on top of the accessor: classes
//! with resolved names and superclass chains, instances with named field
//! values decoded from their raw payload, java.lang.String contents, and
//! fully-read object arrays. Assembling any of these is mostly reference
//! chasing by identifier through the small store and the indices.

use std::io::{Read, Seek};

use crate::dump::accessor::ParsedAccessor;
use crate::errors::{HprofError, Result};
use crate::parser::gc_record::{JavaType, JavaValue};
use crate::parser::primitives::{IdSize, PrimitiveReader};
use crate::parser::sizes::SizeInfo;

pub const JAVA_LANG_STRING: &str = "java/lang/String";

#[derive(Debug, Clone, PartialEq)]
pub struct NamedStaticField {
    pub name: String,
    pub value: JavaValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedInstanceField {
    pub name: String,
    pub field_type: JavaType,
}

/// One resolved class: its name and its own fields, names already looked
/// up in the string table.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub static_fields: Vec<NamedStaticField>,
    pub instance_fields: Vec<NamedInstanceField>,
}

/// A class and its superclasses, most-derived first. The chain is a
/// sequence, not a pointer graph; resolution stops at superclass id 0
/// (java.lang.Object).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassChain {
    pub classes: Vec<Class>,
}

impl ClassChain {
    pub fn name(&self) -> &str {
        self.classes.first().map(|c| c.name.as_str()).unwrap_or("")
    }

    /// First match walking up from the most-derived class.
    pub fn static_field(&self, name: &str) -> Result<&JavaValue> {
        self.classes
            .iter()
            .flat_map(|c| &c.static_fields)
            .find(|f| f.name == name)
            .map(|f| &f.value)
            .ok_or_else(|| HprofError::not_found(format!("static field {name}")))
    }
}

/// Value of an instance field plus the name of the class in the chain
/// that defines it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub value: JavaValue,
    pub origin: String,
}

/// An instance dump with its class chain and raw field payload. Field
/// values are decoded on demand from the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalObject {
    id_size: IdSize,
    pub chain: ClassChain,
    pub bytes: Vec<u8>,
}

impl NormalObject {
    /// Decodes the named field. The payload lays fields out class by
    /// class starting with the most-derived one, so the byte offset is
    /// the sum of the widths of every field before the first name match.
    pub fn field_value(&self, name: &str) -> Result<FieldValue> {
        let sizes = SizeInfo::new(self.id_size);
        let mut offset: u64 = 0;
        for class in &self.chain.classes {
            for field in &class.instance_fields {
                if field.name == name {
                    let payload = self.bytes.get(offset as usize..).ok_or_else(|| {
                        HprofError::format(format!(
                            "instance payload of {} bytes too short for field {name} at offset {offset}",
                            self.bytes.len()
                        ))
                    })?;
                    let mut primitives = PrimitiveReader::new(payload, self.id_size);
                    let value = primitives.read_java_value(field.field_type)?;
                    return Ok(FieldValue {
                        value,
                        origin: class.name.clone(),
                    });
                }
                offset += sizes.of_type(field.field_type);
            }
        }
        Err(HprofError::not_found(format!("instance field {name}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectArray {
    pub array_class_id: u64,
    pub elements: Vec<u64>,
}

/// Read-side composition root for heap objects.
pub struct Heap<'a, D, I> {
    accessor: &'a mut ParsedAccessor<D, I>,
}

impl<'a, D: Read + Seek, I: Read + Seek> Heap<'a, D, I> {
    pub fn new(accessor: &'a mut ParsedAccessor<D, I>) -> Self {
        Heap { accessor }
    }

    pub fn accessor(&mut self) -> &mut ParsedAccessor<D, I> {
        self.accessor
    }

    /// Resolves a class and all of its superclasses into a chain,
    /// terminating at superclass id 0.
    pub fn parse_class(&mut self, class_object_id: u64) -> Result<ClassChain> {
        let small = self.accessor.small();
        let mut classes = Vec::new();
        let mut id = class_object_id;
        while id != 0 {
            let dump = small.get_class_dump(id)?;
            let load_class = small.get_load_class_by_class_object_id(id)?;
            let name = small.get_utf8(load_class.class_name_id)?.characters.clone();
            let mut static_fields = Vec::with_capacity(dump.static_fields.len());
            for field in &dump.static_fields {
                static_fields.push(NamedStaticField {
                    name: small.get_utf8(field.name_id)?.characters.clone(),
                    value: field.value,
                });
            }
            let mut instance_fields = Vec::with_capacity(dump.instance_fields.len());
            for field in &dump.instance_fields {
                instance_fields.push(NamedInstanceField {
                    name: small.get_utf8(field.name_id)?.characters.clone(),
                    field_type: field.field_type,
                });
            }
            classes.push(Class {
                name,
                static_fields,
                instance_fields,
            });
            id = dump.super_class_object_id;
        }
        Ok(ClassChain { classes })
    }

    /// Reads an instance dump and its payload and resolves its class.
    pub fn parse_normal_object(&mut self, object_id: u64) -> Result<NormalObject> {
        let header = self.accessor.get_instance_header(object_id)?;
        let bytes = self
            .accessor
            .read_bytes_from_current(header.bytes_that_follow as usize)?;
        let chain = self.parse_class(header.class_object_id)?;
        Ok(NormalObject {
            id_size: self.accessor.id_size(),
            chain,
            bytes,
        })
    }

    /// Turns a reference to a java.lang.String instance into the string
    /// contents. Handles both byte-array (compact strings) and
    /// char-array value fields.
    pub fn parse_java_string(&mut self, value: &JavaValue) -> Result<String> {
        let object_id = value.as_object()?;
        let object = self.parse_normal_object(object_id)?;
        if object.chain.name() != JAVA_LANG_STRING {
            return Err(HprofError::format(format!(
                "object {object_id} is a {} and not a {JAVA_LANG_STRING}",
                object.chain.name()
            )));
        }
        let value_field = object.field_value("value")?;
        let array_id = value_field.value.as_object()?;
        let (element_type, payload) = self.parse_primitive_array(array_id)?;
        match element_type {
            JavaType::Byte => Ok(String::from_utf8_lossy(&payload).to_string()),
            JavaType::Char => {
                let code_units: Vec<u16> = payload
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(String::from_utf16_lossy(&code_units))
            }
            other => Err(HprofError::format(format!(
                "string value array has element type {other}, expected byte or char"
            ))),
        }
    }

    /// Reads a primitive array header and its whole payload.
    pub fn parse_primitive_array(&mut self, array_object_id: u64) -> Result<(JavaType, Vec<u8>)> {
        let header = self.accessor.get_prim_array_header(array_object_id)?;
        let sizes = SizeInfo::new(self.accessor.id_size());
        let len = u64::from(header.number_of_elements) * sizes.of_type(header.element_type);
        let payload = self.accessor.read_bytes_from_current(len as usize)?;
        Ok((header.element_type, payload))
    }

    /// Reads an object array and decodes every element identifier.
    pub fn parse_object_array(&mut self, array_object_id: u64) -> Result<ObjectArray> {
        let header = self.accessor.get_obj_array_header(array_object_id)?;
        let id_size = self.accessor.id_size();
        let len = u64::from(header.number_of_elements) * u64::from(id_size.in_bytes());
        let payload = self.accessor.read_bytes_from_current(len as usize)?;
        let mut primitives = PrimitiveReader::new(&payload[..], id_size);
        let mut elements = Vec::with_capacity(header.number_of_elements as usize);
        for _ in 0..header.number_of_elements {
            elements.push(primitives.read_identifier()?);
        }
        Ok(ObjectArray {
            array_class_id: header.array_class_id,
            elements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::sizes::SizeInfo;
    use crate::test_support::{heap_fixture, parse_in_memory};

    #[test]
    fn class_chain_terminates_at_root() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        let chain = heap.parse_class(100).unwrap();
        let names: Vec<&str> = chain.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["App", "java/lang/Object"]);
        assert_eq!(chain.name(), "App");
    }

    #[test]
    fn field_values_decode_at_computed_offsets() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        let object = heap.parse_normal_object(1000).unwrap();

        let count = object.field_value("count").unwrap();
        assert_eq!(count.value, JavaValue::Int(7));
        assert_eq!(count.origin, "App");

        let next = object.field_value("next").unwrap();
        assert_eq!(next.value, JavaValue::Object(4000));

        // inherited field lives past all of App's own fields
        let flag = object.field_value("flag").unwrap();
        assert_eq!(flag.value, JavaValue::Boolean(true));
        assert_eq!(flag.origin, "java/lang/Object");

        assert!(matches!(
            object.field_value("missing"),
            Err(HprofError::NotFound(_))
        ));
    }

    #[test]
    fn chain_field_widths_sum_to_payload_length() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        let object = heap.parse_normal_object(1000).unwrap();
        let sizes = SizeInfo::new(IdSize::U8);
        let total: u64 = object
            .chain
            .classes
            .iter()
            .flat_map(|c| &c.instance_fields)
            .map(|f| sizes.of_type(f.field_type))
            .sum();
        assert_eq!(total, object.bytes.len() as u64);
    }

    #[test]
    fn byte_array_string() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        let s = heap.parse_java_string(&JavaValue::Object(4000)).unwrap();
        assert_eq!(s, "hi!");
    }

    #[test]
    fn char_array_string() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        let s = heap.parse_java_string(&JavaValue::Object(4100)).unwrap();
        assert_eq!(s, "OK");
    }

    #[test]
    fn non_string_object_is_rejected() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        assert!(matches!(
            heap.parse_java_string(&JavaValue::Object(1000)),
            Err(HprofError::Format(_))
        ));
        assert!(matches!(
            heap.parse_java_string(&JavaValue::Int(1)),
            Err(HprofError::Format(_))
        ));
    }

    #[test]
    fn object_array_elements() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        let array = heap.parse_object_array(5000).unwrap();
        assert_eq!(array.array_class_id, 400);
        assert_eq!(array.elements, vec![1000, 4000]);
    }

    #[test]
    fn static_field_lookup_walks_the_chain() {
        let mut accessor = parse_in_memory(heap_fixture()).into_accessor();
        let mut heap = Heap::new(&mut accessor);
        let chain = heap.parse_class(100).unwrap();
        assert!(matches!(
            chain.static_field("nope"),
            Err(HprofError::NotFound(_))
        ));
    }
}
