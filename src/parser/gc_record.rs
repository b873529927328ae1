use std::fmt;

use crate::errors::{HprofError, Result};

pub const SUB_TAG_GC_ROOT_JNI_GLOBAL: u8 = 0x01;
pub const SUB_TAG_GC_ROOT_JNI_LOCAL: u8 = 0x02;
pub const SUB_TAG_GC_ROOT_JAVA_FRAME: u8 = 0x03;
pub const SUB_TAG_GC_ROOT_STICKY_CLASS: u8 = 0x05;
pub const SUB_TAG_GC_ROOT_THREAD_OBJ: u8 = 0x08;
pub const SUB_TAG_GC_CLASS_DUMP: u8 = 0x20;
pub const SUB_TAG_GC_INSTANCE_DUMP: u8 = 0x21;
pub const SUB_TAG_GC_OBJ_ARRAY_DUMP: u8 = 0x22;
pub const SUB_TAG_GC_PRIM_ARRAY_DUMP: u8 = 0x23;

/// Java value type tags as they appear on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JavaType {
    Object = 2,
    Boolean = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
}

impl JavaType {
    pub fn from_tag(tag: u8) -> Result<JavaType> {
        match tag {
            2 => Ok(JavaType::Object),
            4 => Ok(JavaType::Boolean),
            5 => Ok(JavaType::Char),
            6 => Ok(JavaType::Float),
            7 => Ok(JavaType::Double),
            8 => Ok(JavaType::Byte),
            9 => Ok(JavaType::Short),
            10 => Ok(JavaType::Int),
            11 => Ok(JavaType::Long),
            x => Err(HprofError::unsupported(format!("unknown Java type tag {x}"))),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Single-letter JVM descriptor for this type.
    pub fn descriptor_letter(self) -> char {
        match self {
            JavaType::Object => 'L',
            JavaType::Boolean => 'Z',
            JavaType::Char => 'C',
            JavaType::Float => 'F',
            JavaType::Double => 'D',
            JavaType::Byte => 'B',
            JavaType::Short => 'S',
            JavaType::Int => 'I',
            JavaType::Long => 'J',
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JavaType::Object => "object",
            JavaType::Boolean => "boolean",
            JavaType::Char => "char",
            JavaType::Float => "float",
            JavaType::Double => "double",
            JavaType::Byte => "byte",
            JavaType::Short => "short",
            JavaType::Int => "int",
            JavaType::Long => "long",
        };
        f.write_str(name)
    }
}

/// A decoded value together with its wire type. Downstream consumers
/// narrow through the `as_*` accessors, which fail on a type mismatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JavaValue {
    Object(u64),
    Boolean(bool),
    Char(u16),
    Float(f32),
    Double(f64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

impl JavaValue {
    pub fn java_type(&self) -> JavaType {
        match self {
            JavaValue::Object(_) => JavaType::Object,
            JavaValue::Boolean(_) => JavaType::Boolean,
            JavaValue::Char(_) => JavaType::Char,
            JavaValue::Float(_) => JavaType::Float,
            JavaValue::Double(_) => JavaType::Double,
            JavaValue::Byte(_) => JavaType::Byte,
            JavaValue::Short(_) => JavaType::Short,
            JavaValue::Int(_) => JavaType::Int,
            JavaValue::Long(_) => JavaType::Long,
        }
    }

    pub fn as_object(&self) -> Result<u64> {
        match self {
            JavaValue::Object(id) => Ok(*id),
            other => Err(HprofError::format(format!("value {other:?} is not an object reference"))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            JavaValue::Boolean(b) => Ok(*b),
            other => Err(HprofError::format(format!("value {other:?} is not a boolean"))),
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            JavaValue::Int(i) => Ok(*i),
            other => Err(HprofError::format(format!("value {other:?} is not an int"))),
        }
    }

    pub fn as_long(&self) -> Result<i64> {
        match self {
            JavaValue::Long(l) => Ok(*l),
            other => Err(HprofError::format(format!("value {other:?} is not a long"))),
        }
    }
}

/// Stack-frame line number; negative values are sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber(pub i32);

impl LineNumber {
    pub const UNKNOWN: LineNumber = LineNumber(-1);
    pub const COMPILED_METHOD: LineNumber = LineNumber(-2);
    pub const NATIVE_METHOD: LineNumber = LineNumber(-3);
}

impl fmt::Display for LineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            n if n > 0 => write!(f, "{n}"),
            -1 => f.write_str("Unknown"),
            -2 => f.write_str("CompiledMethod"),
            -3 => f.write_str("NativeMethod"),
            _ => f.write_str("Error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootJniGlobal {
    pub object_id: u64,
    pub jni_global_ref_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootJniLocal {
    pub object_id: u64,
    pub thread_serial_number: u32,
    pub frame_number_in_stack_trace: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootJavaFrame {
    pub object_id: u64,
    pub thread_serial_number: u32,
    pub frame_number_in_stack_trace: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootStickyClass {
    pub object_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootThreadObject {
    pub thread_object_id: u64,
    pub thread_sequence_number: u32,
    pub stack_sequence_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstPoolEntry {
    pub index: u16,
    pub value: JavaValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticField {
    pub name_id: u64,
    pub value: JavaValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceField {
    pub name_id: u64,
    pub field_type: JavaType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDump {
    pub class_object_id: u64,
    pub stack_trace_serial_number: u32,
    pub super_class_object_id: u64,
    pub class_loader_object_id: u64,
    pub signers_object_id: u64,
    pub protection_domain_object_id: u64,
    pub instance_size: i32,
    pub constant_pool: Vec<ConstPoolEntry>,
    pub static_fields: Vec<StaticField>,
    pub instance_fields: Vec<InstanceField>,
}

/// Header of an instance dump; the field payload stays in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceDumpHeader {
    pub object_id: u64,
    pub stack_trace_serial_number: u32,
    pub class_object_id: u64,
    pub bytes_that_follow: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjArrayDumpHeader {
    pub array_object_id: u64,
    pub stack_trace_serial_number: u32,
    pub number_of_elements: u32,
    pub array_class_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimArrayDumpHeader {
    pub array_object_id: u64,
    pub stack_trace_serial_number: u32,
    pub number_of_elements: u32,
    pub element_type: JavaType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_type_round_trips_through_tag() {
        for tag in [2u8, 4, 5, 6, 7, 8, 9, 10, 11] {
            let ty = JavaType::from_tag(tag).unwrap();
            assert_eq!(ty.tag(), tag);
        }
    }

    #[test]
    fn java_type_rejects_unknown_tag() {
        assert!(matches!(JavaType::from_tag(3), Err(HprofError::Unsupported(_))));
        assert!(matches!(JavaType::from_tag(12), Err(HprofError::Unsupported(_))));
    }

    #[test]
    fn java_value_narrowing() {
        assert_eq!(JavaValue::Object(7).as_object().unwrap(), 7);
        assert!(JavaValue::Boolean(true).as_bool().unwrap());
        assert_eq!(JavaValue::Int(-3).as_int().unwrap(), -3);
        assert_eq!(JavaValue::Long(1 << 40).as_long().unwrap(), 1 << 40);
        assert!(matches!(JavaValue::Int(0).as_long(), Err(HprofError::Format(_))));
        assert!(matches!(JavaValue::Object(1).as_bool(), Err(HprofError::Format(_))));
    }

    #[test]
    fn line_number_rendering() {
        assert_eq!(LineNumber(42).to_string(), "42");
        assert_eq!(LineNumber::UNKNOWN.to_string(), "Unknown");
        assert_eq!(LineNumber::COMPILED_METHOD.to_string(), "CompiledMethod");
        assert_eq!(LineNumber::NATIVE_METHOD.to_string(), "NativeMethod");
    }
}
