//! Builds hprof bytes: for synthesizing dumps in tests, or for tools that want to emit a reduced
//! copy of a heap.
//!
//! The writer doesn't validate anything; it will happily write a class whose declared instance
//! size doesn't match its fields, which is handy for testing how readers cope.

use crate::heap_dump::{FieldType, FieldValue, PrimitiveArrayType, SubRecordTag};
use crate::{Id, IdSize, LineNum, RecordTag, Serial};

/// Top level records, in the order the methods are called.
pub struct HprofWriter {
    id_size: IdSize,
    bytes: Vec<u8>,
}

impl HprofWriter {
    pub fn new(label: &str, id_size: IdSize, timestamp_millis: u64) -> HprofWriter {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(label.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&(id_size.size_in_bytes() as u32).to_be_bytes());
        bytes.extend_from_slice(&((timestamp_millis >> 32) as u32).to_be_bytes());
        bytes.extend_from_slice(&(timestamp_millis as u32).to_be_bytes());

        HprofWriter { id_size, bytes }
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    /// A record with any tag and body, including tags readers won't know.
    pub fn raw_record(&mut self, tag_byte: u8, body: &[u8]) -> &mut Self {
        self.bytes.push(tag_byte);
        // micros since header timestamp
        self.bytes.extend_from_slice(&0_u32.to_be_bytes());
        self.bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.bytes.extend_from_slice(body);
        self
    }

    fn record<F: FnOnce(&mut Encoder)>(&mut self, tag: RecordTag, build: F) -> &mut Self {
        let mut body = Encoder::new(self.id_size);
        build(&mut body);
        self.raw_record(tag.tag_byte(), &body.bytes)
    }

    pub fn string(&mut self, id: Id, text: &str) -> &mut Self {
        self.record(RecordTag::Utf8, |e| {
            e.id(id);
            e.bytes(text.as_bytes());
        })
    }

    pub fn load_class(
        &mut self,
        class_serial: Serial,
        class_obj_id: Id,
        stack_trace_serial: Serial,
        class_name_id: Id,
    ) -> &mut Self {
        self.record(RecordTag::LoadClass, |e| {
            e.u32(class_serial);
            e.id(class_obj_id);
            e.u32(stack_trace_serial);
            e.id(class_name_id);
        })
    }

    pub fn unload_class(&mut self, class_serial: Serial) -> &mut Self {
        self.record(RecordTag::UnloadClass, |e| e.u32(class_serial))
    }

    pub fn stack_frame(
        &mut self,
        id: Id,
        method_name_id: Id,
        method_signature_id: Id,
        source_file_name_id: Id,
        class_serial: Serial,
        line_num: LineNum,
    ) -> &mut Self {
        self.record(RecordTag::StackFrame, |e| {
            e.id(id);
            e.id(method_name_id);
            e.id(method_signature_id);
            e.id(source_file_name_id);
            e.u32(class_serial);
            e.i32(match line_num {
                LineNum::Normal(n) => n as i32,
                LineNum::Unknown => -1,
                LineNum::CompiledMethod => -2,
                LineNum::NativeMethod => -3,
            });
        })
    }

    pub fn stack_trace(
        &mut self,
        stack_trace_serial: Serial,
        thread_serial: Serial,
        frame_ids: &[Id],
    ) -> &mut Self {
        self.record(RecordTag::StackTrace, |e| {
            e.u32(stack_trace_serial);
            e.u32(thread_serial);
            e.u32(frame_ids.len() as u32);
            for &id in frame_ids {
                e.id(id);
            }
        })
    }

    pub fn heap_dump(&mut self, dump: &HeapDumpWriter) -> &mut Self {
        self.raw_record(RecordTag::HeapDump.tag_byte(), &dump.encoder.bytes)
    }

    pub fn heap_dump_segment(&mut self, dump: &HeapDumpWriter) -> &mut Self {
        self.raw_record(RecordTag::HeapDumpSegment.tag_byte(), &dump.encoder.bytes)
    }

    pub fn heap_dump_end(&mut self) -> &mut Self {
        self.raw_record(RecordTag::HeapDumpEnd.tag_byte(), &[])
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// The body of one HEAP_DUMP or HEAP_DUMP_SEGMENT record.
pub struct HeapDumpWriter {
    encoder: Encoder,
}

impl HeapDumpWriter {
    pub fn new(id_size: IdSize) -> HeapDumpWriter {
        HeapDumpWriter {
            encoder: Encoder::new(id_size),
        }
    }

    pub fn len(&self) -> usize {
        self.encoder.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder.bytes.is_empty()
    }

    /// Arbitrary bytes, for writing malformed sub-records.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.encoder.bytes(bytes);
        self
    }

    fn tag(&mut self, tag: SubRecordTag) -> &mut Encoder {
        self.encoder.u8(tag.tag_byte());
        &mut self.encoder
    }

    pub fn heap_dump_info(&mut self, heap_id: u32, heap_name_id: Id) -> &mut Self {
        let e = self.tag(SubRecordTag::HeapDumpInfo);
        e.u32(heap_id);
        e.id(heap_name_id);
        self
    }

    /// Roots whose body is just the object id: unknown, sticky class, monitor used, and the ART
    /// additions (interned string, finalizing, debugger, reference cleanup, VM internal,
    /// unreachable).
    pub fn gc_root(&mut self, tag: SubRecordTag, obj_id: Id) -> &mut Self {
        self.tag(tag).id(obj_id);
        self
    }

    pub fn jni_global_root(&mut self, obj_id: Id, jni_global_ref_id: Id) -> &mut Self {
        let e = self.tag(SubRecordTag::RootJniGlobal);
        e.id(obj_id);
        e.id(jni_global_ref_id);
        self
    }

    fn thread_frame_root(
        &mut self,
        tag: SubRecordTag,
        obj_id: Id,
        thread_serial: Serial,
        frame_index: u32,
    ) -> &mut Self {
        let e = self.tag(tag);
        e.id(obj_id);
        e.u32(thread_serial);
        e.u32(frame_index);
        self
    }

    pub fn jni_local_root(
        &mut self,
        obj_id: Id,
        thread_serial: Serial,
        frame_index: u32,
    ) -> &mut Self {
        self.thread_frame_root(SubRecordTag::RootJniLocal, obj_id, thread_serial, frame_index)
    }

    pub fn java_frame_root(
        &mut self,
        obj_id: Id,
        thread_serial: Serial,
        frame_index: u32,
    ) -> &mut Self {
        self.thread_frame_root(SubRecordTag::RootJavaFrame, obj_id, thread_serial, frame_index)
    }

    pub fn jni_monitor_root(
        &mut self,
        obj_id: Id,
        thread_serial: Serial,
        frame_index: u32,
    ) -> &mut Self {
        self.thread_frame_root(SubRecordTag::RootJniMonitor, obj_id, thread_serial, frame_index)
    }

    pub fn native_stack_root(&mut self, obj_id: Id, thread_serial: Serial) -> &mut Self {
        let e = self.tag(SubRecordTag::RootNativeStack);
        e.id(obj_id);
        e.u32(thread_serial);
        self
    }

    pub fn thread_block_root(&mut self, obj_id: Id, thread_serial: Serial) -> &mut Self {
        let e = self.tag(SubRecordTag::RootThreadBlock);
        e.id(obj_id);
        e.u32(thread_serial);
        self
    }

    pub fn thread_object(
        &mut self,
        thread_obj_id: Id,
        thread_serial: Serial,
        stack_trace_serial: Serial,
    ) -> &mut Self {
        let e = self.tag(SubRecordTag::RootThreadObject);
        e.id(thread_obj_id);
        e.u32(thread_serial);
        e.u32(stack_trace_serial);
        self
    }

    pub fn class(
        &mut self,
        obj_id: Id,
        super_class_obj_id: Option<Id>,
        instance_size: u32,
        static_fields: &[(Id, FieldValue)],
        instance_fields: &[(Id, FieldType)],
    ) -> &mut Self {
        self.class_with_constants(
            obj_id,
            super_class_obj_id,
            instance_size,
            &[],
            static_fields,
            instance_fields,
        )
    }

    pub fn class_with_constants(
        &mut self,
        obj_id: Id,
        super_class_obj_id: Option<Id>,
        instance_size: u32,
        constants: &[(u16, FieldValue)],
        static_fields: &[(Id, FieldValue)],
        instance_fields: &[(Id, FieldType)],
    ) -> &mut Self {
        let e = self.tag(SubRecordTag::ClassDump);
        e.id(obj_id);
        // stack trace serial
        e.u32(0);
        e.id(super_class_obj_id.unwrap_or_else(|| Id::from(0)));
        // loader, signers, protection domain, 2 reserved
        for _ in 0..5 {
            e.id(Id::from(0));
        }
        e.u32(instance_size);

        e.u16(constants.len() as u16);
        for (index, value) in constants {
            e.u16(*index);
            e.u8(value.field_type().type_code());
            e.value(value);
        }

        e.u16(static_fields.len() as u16);
        for (name_id, value) in static_fields {
            e.id(*name_id);
            e.u8(value.field_type().type_code());
            e.value(value);
        }

        e.u16(instance_fields.len() as u16);
        for (name_id, field_type) in instance_fields {
            e.id(*name_id);
            e.u8(field_type.type_code());
        }
        self
    }

    /// An instance whose field blob is given as raw bytes.
    pub fn instance(&mut self, obj_id: Id, class_obj_id: Id, fields: &[u8]) -> &mut Self {
        let e = self.tag(SubRecordTag::InstanceDump);
        e.id(obj_id);
        e.u32(0);
        e.id(class_obj_id);
        e.u32(fields.len() as u32);
        e.bytes(fields);
        self
    }

    /// An instance whose field blob is the encoding of `values`: the class's own fields first,
    /// then its superclass's, and so on.
    pub fn instance_values(
        &mut self,
        obj_id: Id,
        class_obj_id: Id,
        values: &[FieldValue],
    ) -> &mut Self {
        let mut blob = Encoder::new(self.encoder.id_size);
        for v in values {
            blob.value(v);
        }
        self.instance(obj_id, class_obj_id, &blob.bytes)
    }

    pub fn object_array(
        &mut self,
        obj_id: Id,
        array_class_obj_id: Id,
        elements: &[Option<Id>],
    ) -> &mut Self {
        let e = self.tag(SubRecordTag::ObjectArrayDump);
        e.id(obj_id);
        e.u32(0);
        e.u32(elements.len() as u32);
        e.id(array_class_obj_id);
        for element in elements {
            e.id(element.unwrap_or_else(|| Id::from(0)));
        }
        self
    }

    /// Values not matching `primitive_type` are written as they are, giving a corrupt array.
    pub fn primitive_array(
        &mut self,
        obj_id: Id,
        primitive_type: PrimitiveArrayType,
        values: &[FieldValue],
    ) -> &mut Self {
        let e = self.tag(SubRecordTag::PrimitiveArrayDump);
        e.id(obj_id);
        e.u32(0);
        e.u32(values.len() as u32);
        e.u8(primitive_type.type_code());
        for v in values {
            e.value(v);
        }
        self
    }

    pub fn primitive_array_no_data(
        &mut self,
        obj_id: Id,
        primitive_type: PrimitiveArrayType,
        num_elements: u32,
    ) -> &mut Self {
        let e = self.tag(SubRecordTag::PrimitiveArrayNoData);
        e.id(obj_id);
        e.u32(0);
        e.u32(num_elements);
        e.u8(primitive_type.type_code());
        self
    }
}

struct Encoder {
    id_size: IdSize,
    bytes: Vec<u8>,
}

impl Encoder {
    fn new(id_size: IdSize) -> Encoder {
        Encoder {
            id_size,
            bytes: Vec::new(),
        }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_be_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_be_bytes());
    }

    fn id(&mut self, id: Id) -> &mut Self {
        match self.id_size {
            IdSize::U32 => self.bytes(&(id.id() as u32).to_be_bytes()),
            IdSize::U64 => self.bytes(&id.id().to_be_bytes()),
        }
        self
    }

    fn value(&mut self, value: &FieldValue) {
        match value {
            FieldValue::ObjectId(id) => {
                self.id(id.unwrap_or_else(|| Id::from(0)));
            }
            FieldValue::Boolean(v) => self.u8(*v as u8),
            FieldValue::Char(v) => self.u16(*v),
            FieldValue::Float(v) => self.bytes(&v.to_be_bytes()),
            FieldValue::Double(v) => self.bytes(&v.to_be_bytes()),
            FieldValue::Byte(v) => self.bytes(&v.to_be_bytes()),
            FieldValue::Short(v) => self.bytes(&v.to_be_bytes()),
            FieldValue::Int(v) => self.bytes(&v.to_be_bytes()),
            FieldValue::Long(v) => self.bytes(&v.to_be_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_framing() {
        let mut writer = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        writer.string(Id::from(0x0102_0304), "ab");
        let bytes = writer.into_bytes();

        let record = &bytes[19 + 12..];
        assert_eq!(
            &[0x01, 0, 0, 0, 0, 0, 0, 0, 6, 1, 2, 3, 4, b'a', b'b'][..],
            record
        );
    }

    #[test]
    fn instance_values_encode_in_order() {
        let mut dump = HeapDumpWriter::new(IdSize::U64);
        dump.instance_values(
            Id::from(1),
            Id::from(2),
            &[FieldValue::Int(7), FieldValue::ObjectId(None), FieldValue::Boolean(true)],
        );

        // tag, id, serial, class id, length
        let header_len = 1 + 8 + 4 + 8 + 4;
        assert_eq!(header_len + 4 + 8 + 1, dump.len());
        assert_eq!(&[0, 0, 0, 13], &dump.encoder.bytes[header_len - 4..header_len]);
    }
}
