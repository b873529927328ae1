use crate::parser::gc_record::{
    ClassDump, InstanceDumpHeader, JavaType, ObjArrayDumpHeader, PrimArrayDumpHeader,
};
use crate::parser::primitives::IdSize;

/// Full and payload-only on-disk sizes of a header-only record. `full`
/// covers the header plus its payload, excluding the sub-tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSize {
    pub full: u64,
    pub payload: u64,
}

/// Computes the on-disk byte length of decoded records for a given
/// identifier size. All arithmetic is 64-bit; element counts come from
/// the wire and can make 32-bit products overflow.
#[derive(Debug, Clone, Copy)]
pub struct SizeInfo {
    id: u64,
}

impl SizeInfo {
    pub fn new(id_size: IdSize) -> SizeInfo {
        SizeInfo {
            id: u64::from(id_size.in_bytes()),
        }
    }

    pub fn of_type(&self, ty: JavaType) -> u64 {
        match ty {
            JavaType::Object => self.id,
            JavaType::Byte | JavaType::Boolean => 1,
            JavaType::Char | JavaType::Short => 2,
            JavaType::Float | JavaType::Int => 4,
            JavaType::Double | JavaType::Long => 8,
        }
    }

    pub fn of_jni_global(&self) -> u64 {
        2 * self.id
    }

    pub fn of_jni_local(&self) -> u64 {
        self.id + 8
    }

    pub fn of_java_frame(&self) -> u64 {
        self.id + 8
    }

    pub fn of_sticky_class(&self) -> u64 {
        self.id
    }

    pub fn of_thread_object(&self) -> u64 {
        self.id + 8
    }

    pub fn of_class_dump(&self, dump: &ClassDump) -> u64 {
        // 7 identifiers + stack trace serial + instance size + three u2 counts
        let fixed = 7 * self.id + 2 * 4 + 3 * 2;
        let constant_pool: u64 = dump
            .constant_pool
            .iter()
            .map(|e| 2 + 1 + self.of_type(e.value.java_type()))
            .sum();
        let static_fields: u64 = dump
            .static_fields
            .iter()
            .map(|f| self.id + 1 + self.of_type(f.value.java_type()))
            .sum();
        let instance_fields = dump.instance_fields.len() as u64 * (self.id + 1);
        fixed + constant_pool + static_fields + instance_fields
    }

    pub fn of_instance_dump(&self, header: &InstanceDumpHeader) -> ObjectSize {
        let payload = u64::from(header.bytes_that_follow);
        ObjectSize {
            full: 2 * self.id + 2 * 4 + payload,
            payload,
        }
    }

    pub fn of_obj_array_dump(&self, header: &ObjArrayDumpHeader) -> ObjectSize {
        let payload = u64::from(header.number_of_elements) * self.id;
        ObjectSize {
            full: 2 * self.id + 2 * 4 + payload,
            payload,
        }
    }

    pub fn of_prim_array_dump(&self, header: &PrimArrayDumpHeader) -> ObjectSize {
        let payload = u64::from(header.number_of_elements) * self.of_type(header.element_type);
        ObjectSize {
            full: self.id + 2 * 4 + 1 + payload,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::gc_record::{ConstPoolEntry, InstanceField, JavaValue, StaticField};
    use crate::parser::primitives::IdSize;
    use crate::parser::record_parser::RecordParser;

    fn sizes8() -> SizeInfo {
        SizeInfo::new(IdSize::U8)
    }

    #[test]
    fn gc_root_sizes() {
        let s = sizes8();
        assert_eq!(s.of_jni_global(), 16);
        assert_eq!(s.of_jni_local(), 16);
        assert_eq!(s.of_java_frame(), 16);
        assert_eq!(s.of_sticky_class(), 8);
        assert_eq!(s.of_thread_object(), 16);

        let s4 = SizeInfo::new(IdSize::U4);
        assert_eq!(s4.of_jni_global(), 8);
        assert_eq!(s4.of_sticky_class(), 4);
    }

    #[test]
    fn type_widths() {
        let s = sizes8();
        assert_eq!(s.of_type(JavaType::Boolean), 1);
        assert_eq!(s.of_type(JavaType::Byte), 1);
        assert_eq!(s.of_type(JavaType::Char), 2);
        assert_eq!(s.of_type(JavaType::Short), 2);
        assert_eq!(s.of_type(JavaType::Float), 4);
        assert_eq!(s.of_type(JavaType::Int), 4);
        assert_eq!(s.of_type(JavaType::Double), 8);
        assert_eq!(s.of_type(JavaType::Long), 8);
        assert_eq!(s.of_type(JavaType::Object), 8);
        assert_eq!(SizeInfo::new(IdSize::U4).of_type(JavaType::Object), 4);
    }

    #[test]
    fn class_dump_size() {
        let dump = ClassDump {
            class_object_id: 1,
            stack_trace_serial_number: 1,
            super_class_object_id: 0,
            class_loader_object_id: 0,
            signers_object_id: 0,
            protection_domain_object_id: 0,
            instance_size: 12,
            constant_pool: vec![ConstPoolEntry { index: 1, value: JavaValue::Int(5) }],
            static_fields: vec![StaticField { name_id: 2, value: JavaValue::Boolean(true) }],
            instance_fields: vec![
                InstanceField { name_id: 3, field_type: JavaType::Long },
                InstanceField { name_id: 4, field_type: JavaType::Object },
            ],
        };
        // fixed 7*8+8+6 = 70, cp 2+1+4 = 7, static 8+1+1 = 10, instance 2*9 = 18
        assert_eq!(sizes8().of_class_dump(&dump), 105);
    }

    // The decoder must consume exactly as many bytes as the size
    // calculator reports for the decoded record.
    #[test]
    fn class_dump_size_matches_bytes_consumed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u64.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&8i32.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes()); // constant pool
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.push(JavaType::Boolean.tag());
        bytes.push(0x00);
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.push(JavaType::Double.tag());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes()); // static fields
        bytes.extend_from_slice(&9u64.to_be_bytes());
        bytes.push(JavaType::Char.tag());
        bytes.extend_from_slice(&0x0041u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes()); // instance fields
        bytes.extend_from_slice(&10u64.to_be_bytes());
        bytes.push(JavaType::Int.tag());
        let total = bytes.len() as u64;

        let mut parser = RecordParser::new(&bytes[..], IdSize::U8);
        let dump = parser.parse_class_dump().unwrap();
        assert_eq!(sizes8().of_class_dump(&dump), total);
    }

    #[test]
    fn header_only_record_sizes() {
        let s = sizes8();
        let instance = InstanceDumpHeader {
            object_id: 1,
            stack_trace_serial_number: 1,
            class_object_id: 2,
            bytes_that_follow: 4,
        };
        assert_eq!(s.of_instance_dump(&instance), ObjectSize { full: 28, payload: 4 });

        let obj_array = ObjArrayDumpHeader {
            array_object_id: 1,
            stack_trace_serial_number: 1,
            number_of_elements: 3,
            array_class_id: 2,
        };
        assert_eq!(s.of_obj_array_dump(&obj_array), ObjectSize { full: 48, payload: 24 });

        let prim_array = PrimArrayDumpHeader {
            array_object_id: 1,
            stack_trace_serial_number: 1,
            number_of_elements: 5,
            element_type: JavaType::Short,
        };
        assert_eq!(s.of_prim_array_dump(&prim_array), ObjectSize { full: 27, payload: 10 });
    }

    #[test]
    fn array_payload_size_does_not_overflow_32_bits() {
        let header = ObjArrayDumpHeader {
            array_object_id: 1,
            stack_trace_serial_number: 1,
            number_of_elements: u32::MAX,
            array_class_id: 2,
        };
        let size = sizes8().of_obj_array_dump(&header);
        assert_eq!(size.payload, u64::from(u32::MAX) * 8);
    }
}
