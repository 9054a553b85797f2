//! Sub-records inside HEAP_DUMP and HEAP_DUMP_SEGMENT bodies.
//!
//! Segments can be hundreds of megabytes, so sub-records are read through a [Cursor] instead of
//! from one borrowed slice. Instance field bytes and array contents are not copied; the decoded
//! records carry the file offset where they start.

use crate::buffer::{Cursor, HprofBuffer};
use crate::{Decode, HprofError, Id, IdSize, Record, Serial};
use getset::{CopyGetters, Getters};
use nom::number::complete as number;
use strum_macros::EnumIter;

mod primitive_array;

pub use primitive_array::*;

// https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L175
// plus the extra tags ART writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum SubRecordTag {
    RootUnknown,
    RootJniGlobal,
    RootJniLocal,
    RootJavaFrame,
    RootNativeStack,
    RootStickyClass,
    RootThreadBlock,
    RootMonitorUsed,
    RootThreadObject,
    ClassDump,
    InstanceDump,
    ObjectArrayDump,
    PrimitiveArrayDump,
    HeapDumpInfo,
    RootInternedString,
    RootFinalizing,
    RootDebugger,
    RootReferenceCleanup,
    RootVmInternal,
    RootJniMonitor,
    RootUnreachable,
    PrimitiveArrayNoData,
}

impl SubRecordTag {
    pub fn from_tag_byte(tag_byte: u8) -> Option<SubRecordTag> {
        match tag_byte {
            0xFF => Some(SubRecordTag::RootUnknown),
            0x01 => Some(SubRecordTag::RootJniGlobal),
            0x02 => Some(SubRecordTag::RootJniLocal),
            0x03 => Some(SubRecordTag::RootJavaFrame),
            0x04 => Some(SubRecordTag::RootNativeStack),
            0x05 => Some(SubRecordTag::RootStickyClass),
            0x06 => Some(SubRecordTag::RootThreadBlock),
            0x07 => Some(SubRecordTag::RootMonitorUsed),
            0x08 => Some(SubRecordTag::RootThreadObject),
            0x20 => Some(SubRecordTag::ClassDump),
            0x21 => Some(SubRecordTag::InstanceDump),
            0x22 => Some(SubRecordTag::ObjectArrayDump),
            0x23 => Some(SubRecordTag::PrimitiveArrayDump),
            0xFE => Some(SubRecordTag::HeapDumpInfo),
            0x89 => Some(SubRecordTag::RootInternedString),
            0x8A => Some(SubRecordTag::RootFinalizing),
            0x8B => Some(SubRecordTag::RootDebugger),
            0x8C => Some(SubRecordTag::RootReferenceCleanup),
            0x8D => Some(SubRecordTag::RootVmInternal),
            0x8E => Some(SubRecordTag::RootJniMonitor),
            0x90 => Some(SubRecordTag::RootUnreachable),
            0xC3 => Some(SubRecordTag::PrimitiveArrayNoData),
            _ => None,
        }
    }

    pub fn tag_byte(&self) -> u8 {
        match self {
            SubRecordTag::RootUnknown => 0xFF,
            SubRecordTag::RootJniGlobal => 0x01,
            SubRecordTag::RootJniLocal => 0x02,
            SubRecordTag::RootJavaFrame => 0x03,
            SubRecordTag::RootNativeStack => 0x04,
            SubRecordTag::RootStickyClass => 0x05,
            SubRecordTag::RootThreadBlock => 0x06,
            SubRecordTag::RootMonitorUsed => 0x07,
            SubRecordTag::RootThreadObject => 0x08,
            SubRecordTag::ClassDump => 0x20,
            SubRecordTag::InstanceDump => 0x21,
            SubRecordTag::ObjectArrayDump => 0x22,
            SubRecordTag::PrimitiveArrayDump => 0x23,
            SubRecordTag::HeapDumpInfo => 0xFE,
            SubRecordTag::RootInternedString => 0x89,
            SubRecordTag::RootFinalizing => 0x8A,
            SubRecordTag::RootDebugger => 0x8B,
            SubRecordTag::RootReferenceCleanup => 0x8C,
            SubRecordTag::RootVmInternal => 0x8D,
            SubRecordTag::RootJniMonitor => 0x8E,
            SubRecordTag::RootUnreachable => 0x90,
            SubRecordTag::PrimitiveArrayNoData => 0xC3,
        }
    }
}

/// Why an object is a GC root.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
pub enum RootType {
    Unknown,
    /// JNI global reference
    NativeStatic,
    /// JNI local reference
    NativeLocal,
    /// Local variable in a Java frame
    JavaLocal,
    NativeStack,
    /// Classes the VM never unloads
    SystemClass,
    ThreadBlock,
    BusyMonitor,
    ThreadObject,
    InternedString,
    Finalizing,
    Debugger,
    ReferenceCleanup,
    VmInternal,
    NativeMonitor,
    Unreachable,
}

impl RootType {
    pub fn name(&self) -> &'static str {
        match self {
            RootType::Unknown => "UNKNOWN",
            RootType::NativeStatic => "NATIVE_STATIC",
            RootType::NativeLocal => "NATIVE_LOCAL",
            RootType::JavaLocal => "JAVA_LOCAL",
            RootType::NativeStack => "NATIVE_STACK",
            RootType::SystemClass => "SYSTEM_CLASS",
            RootType::ThreadBlock => "THREAD_BLOCK",
            RootType::BusyMonitor => "BUSY_MONITOR",
            RootType::ThreadObject => "THREAD_OBJECT",
            RootType::InternedString => "INTERNED_STRING",
            RootType::Finalizing => "FINALIZING",
            RootType::Debugger => "DEBUGGER",
            RootType::ReferenceCleanup => "REFERENCE_CLEANUP",
            RootType::VmInternal => "VM_INTERNAL",
            RootType::NativeMonitor => "NATIVE_MONITOR",
            RootType::Unreachable => "UNREACHABLE",
        }
    }

    /// The root kind a root sub-record tag declares. `None` for non-root tags.
    pub fn for_tag(tag: SubRecordTag) -> Option<RootType> {
        match tag {
            SubRecordTag::RootUnknown => Some(RootType::Unknown),
            SubRecordTag::RootJniGlobal => Some(RootType::NativeStatic),
            SubRecordTag::RootJniLocal => Some(RootType::NativeLocal),
            SubRecordTag::RootJavaFrame => Some(RootType::JavaLocal),
            SubRecordTag::RootNativeStack => Some(RootType::NativeStack),
            SubRecordTag::RootStickyClass => Some(RootType::SystemClass),
            SubRecordTag::RootThreadBlock => Some(RootType::ThreadBlock),
            SubRecordTag::RootMonitorUsed => Some(RootType::BusyMonitor),
            SubRecordTag::RootThreadObject => Some(RootType::ThreadObject),
            SubRecordTag::RootInternedString => Some(RootType::InternedString),
            SubRecordTag::RootFinalizing => Some(RootType::Finalizing),
            SubRecordTag::RootDebugger => Some(RootType::Debugger),
            SubRecordTag::RootReferenceCleanup => Some(RootType::ReferenceCleanup),
            SubRecordTag::RootVmInternal => Some(RootType::VmInternal),
            SubRecordTag::RootJniMonitor => Some(RootType::NativeMonitor),
            SubRecordTag::RootUnreachable => Some(RootType::Unreachable),
            SubRecordTag::ClassDump
            | SubRecordTag::InstanceDump
            | SubRecordTag::ObjectArrayDump
            | SubRecordTag::PrimitiveArrayDump
            | SubRecordTag::HeapDumpInfo
            | SubRecordTag::PrimitiveArrayNoData => None,
        }
    }
}

#[derive(CopyGetters, Copy, Clone, Debug, PartialEq)]
pub struct GcRoot {
    #[get_copy = "pub"]
    root_type: RootType,
    #[get_copy = "pub"]
    obj_id: Id,
    /// Present for roots tied to a thread (JNI local, Java frame, native stack, thread block,
    /// JNI monitor)
    #[get_copy = "pub"]
    thread_serial: Option<Serial>,
    /// Depth in the thread's stack, for roots that record one
    #[get_copy = "pub"]
    frame_index: Option<u32>,
    /// Only for JNI globals
    #[get_copy = "pub"]
    jni_global_ref_id: Option<Id>,
}

impl GcRoot {
    fn new(root_type: RootType, obj_id: Id) -> GcRoot {
        GcRoot {
            root_type,
            obj_id,
            thread_serial: None,
            frame_index: None,
            jni_global_ref_id: None,
        }
    }

    /// The root ART and the JVM imply for a ROOT_THREAD_OBJECT with a non-null object.
    pub(crate) fn for_thread_object(obj_id: Id, thread_serial: Serial) -> GcRoot {
        let mut root = GcRoot::new(RootType::ThreadObject, obj_id);
        root.thread_serial = Some(thread_serial);
        root
    }
}

#[derive(CopyGetters, Copy, Clone, Debug, PartialEq)]
pub struct GcRootThreadObj {
    /// May be missing for a thread newly attached through JNI
    #[get_copy = "pub"]
    thread_obj_id: Option<Id>,
    #[get_copy = "pub"]
    thread_serial: Serial,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
}

/// Everything after this sub-record belongs to the named heap.
#[derive(CopyGetters, Copy, Clone, Debug, PartialEq)]
pub struct HeapDumpInfo {
    #[get_copy = "pub"]
    heap_id: u32,
    #[get_copy = "pub"]
    heap_name_id: Id,
}

#[derive(CopyGetters, Getters, Clone, Debug, PartialEq)]
pub struct Class {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    super_class_obj_id: Option<Id>,
    #[get_copy = "pub"]
    class_loader_obj_id: Option<Id>,
    #[get_copy = "pub"]
    signers_obj_id: Option<Id>,
    #[get_copy = "pub"]
    protection_domain_obj_id: Option<Id>,
    #[get_copy = "pub"]
    instance_size_bytes: u32,
    #[get = "pub"]
    static_fields: Vec<StaticFieldEntry>,
    /// Only the fields this class declares; superclass fields live in the superclass record.
    #[get = "pub"]
    instance_field_descriptors: Vec<FieldDescriptor>,
}

impl Class {
    fn read(cursor: &mut Cursor, id_size: IdSize) -> Result<Class, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L201
        let obj_id = cursor.read_id(id_size)?;
        let stack_trace_serial = cursor.read_u32()?;
        let super_class_obj_id = non_null(cursor.read_id(id_size)?);
        let class_loader_obj_id = non_null(cursor.read_id(id_size)?);
        let signers_obj_id = non_null(cursor.read_id(id_size)?);
        let protection_domain_obj_id = non_null(cursor.read_id(id_size)?);
        // reserved
        cursor.read_id(id_size)?;
        cursor.read_id(id_size)?;
        let instance_size_bytes = cursor.read_u32()?;

        // constant pool entries carry nothing the graph needs
        let num_constants = cursor.read_u16()?;
        for _ in 0..num_constants {
            cursor.read_u16()?;
            let field_type = FieldType::read(cursor)?;
            cursor.skip(field_type.size_in_bytes(id_size) as u64)?;
        }

        let num_static_fields = cursor.read_u16()?;
        let mut static_fields = Vec::with_capacity(num_static_fields as usize);
        for _ in 0..num_static_fields {
            let name_id = cursor.read_id(id_size)?;
            let field_type = FieldType::read(cursor)?;
            let value = field_type.read_value(cursor, id_size)?;
            static_fields.push(StaticFieldEntry {
                name_id,
                field_type,
                value,
            });
        }

        let num_instance_fields = cursor.read_u16()?;
        let mut instance_field_descriptors = Vec::with_capacity(num_instance_fields as usize);
        for _ in 0..num_instance_fields {
            let name_id = cursor.read_id(id_size)?;
            let field_type = FieldType::read(cursor)?;
            instance_field_descriptors.push(FieldDescriptor {
                name_id,
                field_type,
            });
        }

        Ok(Class {
            obj_id,
            stack_trace_serial,
            super_class_obj_id,
            class_loader_obj_id,
            signers_obj_id,
            protection_domain_obj_id,
            instance_size_bytes,
            static_fields,
            instance_field_descriptors,
        })
    }
}

#[derive(CopyGetters, Copy, Clone, Debug, PartialEq)]
pub struct StaticFieldEntry {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    field_type: FieldType,
    #[get_copy = "pub"]
    value: FieldValue,
}

#[derive(CopyGetters, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    field_type: FieldType,
}

#[derive(CopyGetters, Copy, Clone, Debug, PartialEq)]
pub struct Instance {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    class_obj_id: Id,
    /// Where the field value blob starts in the file
    #[get_copy = "pub"]
    fields_offset: u64,
    #[get_copy = "pub"]
    fields_len: u32,
}

impl Instance {
    fn read(cursor: &mut Cursor, id_size: IdSize) -> Result<Instance, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L257
        let obj_id = cursor.read_id(id_size)?;
        let stack_trace_serial = cursor.read_u32()?;
        let class_obj_id = cursor.read_id(id_size)?;
        let fields_len = cursor.read_u32()?;
        let fields_offset = cursor.position();
        cursor.skip(fields_len as u64)?;

        Ok(Instance {
            obj_id,
            stack_trace_serial,
            class_obj_id,
            fields_offset,
            fields_len,
        })
    }
}

#[derive(CopyGetters, Copy, Clone, Debug, PartialEq)]
pub struct ObjectArray {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    array_class_obj_id: Id,
    #[get_copy = "pub"]
    num_elements: u32,
    /// Where the element ids start in the file
    #[get_copy = "pub"]
    contents_offset: u64,
}

impl ObjectArray {
    fn read(cursor: &mut Cursor, id_size: IdSize) -> Result<ObjectArray, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L270
        let obj_id = cursor.read_id(id_size)?;
        let stack_trace_serial = cursor.read_u32()?;
        let num_elements = cursor.read_u32()?;
        let array_class_obj_id = cursor.read_id(id_size)?;
        let contents_offset = cursor.position();
        cursor.skip(num_elements as u64 * id_size.size_in_bytes() as u64)?;

        Ok(ObjectArray {
            obj_id,
            stack_trace_serial,
            array_class_obj_id,
            num_elements,
            contents_offset,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubRecord {
    GcRoot(GcRoot),
    GcRootThreadObj(GcRootThreadObj),
    HeapDumpInfo(HeapDumpInfo),
    // boxed so that the far more common instance records don't pay for class dump fields
    Class(Box<Class>),
    Instance(Instance),
    ObjectArray(ObjectArray),
    PrimitiveArray(PrimitiveArray),
}

impl SubRecord {
    /// Decode the sub-record at the cursor, leaving the cursor just past it.
    pub fn read(cursor: &mut Cursor, id_size: IdSize) -> Result<SubRecord, HprofError> {
        let offset = cursor.position();
        let tag_byte = cursor.read_u8()?;
        let tag = SubRecordTag::from_tag_byte(tag_byte).ok_or_else(|| {
            HprofError::format(
                offset,
                format!("unknown heap dump sub-record tag {:#04X}", tag_byte),
            )
        })?;

        let record = match tag {
            SubRecordTag::RootUnknown
            | SubRecordTag::RootStickyClass
            | SubRecordTag::RootMonitorUsed
            | SubRecordTag::RootInternedString
            | SubRecordTag::RootFinalizing
            | SubRecordTag::RootDebugger
            | SubRecordTag::RootReferenceCleanup
            | SubRecordTag::RootVmInternal
            | SubRecordTag::RootUnreachable => {
                SubRecord::GcRoot(GcRoot::new(root_type(tag), cursor.read_id(id_size)?))
            }
            SubRecordTag::RootJniGlobal => {
                let mut root = GcRoot::new(RootType::NativeStatic, cursor.read_id(id_size)?);
                root.jni_global_ref_id = Some(cursor.read_id(id_size)?);
                SubRecord::GcRoot(root)
            }
            SubRecordTag::RootJniLocal
            | SubRecordTag::RootJavaFrame
            | SubRecordTag::RootJniMonitor => {
                let mut root = GcRoot::new(root_type(tag), cursor.read_id(id_size)?);
                root.thread_serial = Some(cursor.read_u32()?);
                root.frame_index = frame_index(cursor.read_u32()?);
                SubRecord::GcRoot(root)
            }
            SubRecordTag::RootNativeStack | SubRecordTag::RootThreadBlock => {
                let mut root = GcRoot::new(root_type(tag), cursor.read_id(id_size)?);
                root.thread_serial = Some(cursor.read_u32()?);
                SubRecord::GcRoot(root)
            }
            SubRecordTag::RootThreadObject => SubRecord::GcRootThreadObj(GcRootThreadObj {
                thread_obj_id: non_null(cursor.read_id(id_size)?),
                thread_serial: cursor.read_u32()?,
                stack_trace_serial: cursor.read_u32()?,
            }),
            SubRecordTag::HeapDumpInfo => SubRecord::HeapDumpInfo(HeapDumpInfo {
                heap_id: cursor.read_u32()?,
                heap_name_id: cursor.read_id(id_size)?,
            }),
            SubRecordTag::ClassDump => {
                SubRecord::Class(Box::new(Class::read(cursor, id_size)?))
            }
            SubRecordTag::InstanceDump => SubRecord::Instance(Instance::read(cursor, id_size)?),
            SubRecordTag::ObjectArrayDump => {
                SubRecord::ObjectArray(ObjectArray::read(cursor, id_size)?)
            }
            SubRecordTag::PrimitiveArrayDump => {
                SubRecord::PrimitiveArray(PrimitiveArray::read(cursor, id_size, true)?)
            }
            SubRecordTag::PrimitiveArrayNoData => {
                SubRecord::PrimitiveArray(PrimitiveArray::read(cursor, id_size, false)?)
            }
        };

        Ok(record)
    }
}

fn root_type(tag: SubRecordTag) -> RootType {
    // only called with root tags
    RootType::for_tag(tag).unwrap_or(RootType::Unknown)
}

/// Frame numbers are -1 when the VM doesn't know the frame
fn frame_index(raw: u32) -> Option<u32> {
    if raw == u32::MAX {
        None
    } else {
        Some(raw)
    }
}

fn non_null(id: Id) -> Option<Id> {
    if id.id() == 0 {
        None
    } else {
        Some(id)
    }
}

/// Iterates over the sub-records in one HEAP_DUMP or HEAP_DUMP_SEGMENT body.
///
/// A sub-record with an unknown tag, or one that runs past the end of the body, is a fatal
/// format error since the remaining bytes can't be framed. Iteration stops after an error.
pub struct SubRecords<'b> {
    cursor: Cursor<'b>,
    end: u64,
    id_size: IdSize,
    failed: bool,
}

impl<'b> SubRecords<'b> {
    pub fn new(buffer: &'b dyn HprofBuffer, record: &Record, id_size: IdSize) -> SubRecords<'b> {
        SubRecords {
            cursor: Cursor::at(buffer, record.body_offset()),
            end: record.body_offset() + record.body_len() as u64,
            id_size,
            failed: false,
        }
    }

    fn read_next(&mut self) -> Result<SubRecord, HprofError> {
        let offset = self.cursor.position();
        let record = SubRecord::read(&mut self.cursor, self.id_size)?;
        if self.cursor.position() > self.end {
            return Err(HprofError::format(
                offset,
                format!(
                    "sub-record runs {} bytes past the end of its heap dump segment",
                    self.cursor.position() - self.end
                ),
            ));
        }
        Ok(record)
    }
}

impl<'b> Iterator for SubRecords<'b> {
    type Item = Result<SubRecord, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.position() >= self.end {
            return None;
        }

        let res = self.read_next();
        if res.is_err() {
            self.failed = true;
        }
        Some(res)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    ObjectId,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl FieldType {
    pub fn from_type_code(code: u8) -> Option<FieldType> {
        match code {
            // 1 is an older "array object" code that some producers still write
            0x01 | 0x02 => Some(FieldType::ObjectId),
            0x04 => Some(FieldType::Boolean),
            0x05 => Some(FieldType::Char),
            0x06 => Some(FieldType::Float),
            0x07 => Some(FieldType::Double),
            0x08 => Some(FieldType::Byte),
            0x09 => Some(FieldType::Short),
            0x0A => Some(FieldType::Int),
            0x0B => Some(FieldType::Long),
            _ => None,
        }
    }

    pub fn type_code(&self) -> u8 {
        match self {
            FieldType::ObjectId => 0x02,
            FieldType::Boolean => 0x04,
            FieldType::Char => 0x05,
            FieldType::Float => 0x06,
            FieldType::Double => 0x07,
            FieldType::Byte => 0x08,
            FieldType::Short => 0x09,
            FieldType::Int => 0x0A,
            FieldType::Long => 0x0B,
        }
    }

    pub fn size_in_bytes(&self, id_size: IdSize) -> usize {
        match self {
            FieldType::ObjectId => id_size.size_in_bytes(),
            FieldType::Boolean | FieldType::Byte => 1,
            FieldType::Char | FieldType::Short => 2,
            FieldType::Float | FieldType::Int => 4,
            FieldType::Double | FieldType::Long => 8,
        }
    }

    pub fn java_type_name(&self) -> &'static str {
        match self {
            FieldType::ObjectId => "Object",
            FieldType::Boolean => "boolean",
            FieldType::Char => "char",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Byte => "byte",
            FieldType::Short => "short",
            FieldType::Int => "int",
            FieldType::Long => "long",
        }
    }

    pub fn parse_value<'a>(
        &self,
        input: &'a [u8],
        id_size: IdSize,
    ) -> nom::IResult<&'a [u8], FieldValue> {
        match self {
            FieldType::ObjectId => Id::decode(input, id_size)
                .map(|(input, id)| (input, FieldValue::ObjectId(non_null(id)))),
            FieldType::Boolean => {
                number::be_u8(input).map(|(input, b)| (input, FieldValue::Boolean(b != 0)))
            }
            FieldType::Char => {
                number::be_u16(input).map(|(input, c)| (input, FieldValue::Char(c)))
            }
            FieldType::Float => {
                number::be_f32(input).map(|(input, f)| (input, FieldValue::Float(f)))
            }
            FieldType::Double => {
                number::be_f64(input).map(|(input, f)| (input, FieldValue::Double(f)))
            }
            FieldType::Byte => number::be_i8(input).map(|(input, b)| (input, FieldValue::Byte(b))),
            FieldType::Short => {
                number::be_i16(input).map(|(input, s)| (input, FieldValue::Short(s)))
            }
            FieldType::Int => number::be_i32(input).map(|(input, i)| (input, FieldValue::Int(i))),
            FieldType::Long => {
                number::be_i64(input).map(|(input, l)| (input, FieldValue::Long(l)))
            }
        }
    }

    fn read(cursor: &mut Cursor) -> Result<FieldType, HprofError> {
        let offset = cursor.position();
        let code = cursor.read_u8()?;
        FieldType::from_type_code(code).ok_or_else(|| {
            HprofError::format(offset, format!("unknown field type {:#04X}", code))
        })
    }

    fn read_value(&self, cursor: &mut Cursor, id_size: IdSize) -> Result<FieldValue, HprofError> {
        let offset = cursor.position();
        let bytes = cursor.read_bytes(self.size_in_bytes(id_size))?;
        self.parse_value(&bytes, id_size)
            .map(|(_, value)| value)
            .map_err(|e| HprofError::from_nom(offset, "field value", e))
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// `None` for null references
    ObjectId(Option<Id>),
    Boolean(bool),
    Char(u16),
    Float(f32),
    Double(f64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::ObjectId(_) => FieldType::ObjectId,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Char(_) => FieldType::Char,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Byte(_) => FieldType::Byte,
            FieldValue::Short(_) => FieldType::Short,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Long(_) => FieldType::Long,
        }
    }

    pub fn as_object_id(&self) -> Option<Id> {
        match self {
            FieldValue::ObjectId(id) => *id,
            _ => None,
        }
    }

    /// Any integral value widened to `i64`, for reading counts and offsets out of objects.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Byte(v) => Some(*v as i64),
            FieldValue::Short(v) => Some(*v as i64),
            FieldValue::Char(v) => Some(*v as i64),
            FieldValue::Int(v) => Some(*v as i64),
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryBuffer;
    use crate::writer::{HeapDumpWriter, HprofWriter};
    use crate::{Header, RecordTag, Records};
    use itertools::Itertools;
    use strum::IntoEnumIterator;

    fn sub_records(bytes: Vec<u8>) -> Vec<Result<SubRecord, HprofError>> {
        let buffer = MemoryBuffer::new(bytes);
        let header = Header::read(&buffer).unwrap();
        Records::new(&buffer, &header)
            .map(|r| r.unwrap())
            .filter(|r| r.tag() == Some(RecordTag::HeapDumpSegment))
            .flat_map(|r| SubRecords::new(&buffer, &r, header.id_size()).collect_vec())
            .collect_vec()
    }

    #[test]
    fn tag_bytes_round_trip() {
        for tag in SubRecordTag::iter() {
            assert_eq!(Some(tag), SubRecordTag::from_tag_byte(tag.tag_byte()));
        }
    }

    #[test]
    fn every_root_tag_has_a_root_type() {
        let root_tags = SubRecordTag::iter()
            .filter(|t| RootType::for_tag(*t).is_some())
            .count();

        assert_eq!(16, root_tags);
        assert_eq!(RootType::iter().count(), root_tags);
    }

    #[test]
    fn reads_class_with_statics_and_constants() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.class_with_constants(
            Id::from(100),
            Some(Id::from(99)),
            12,
            &[(1, FieldValue::Int(3)), (2, FieldValue::Long(4))],
            &[(Id::from(7), FieldValue::ObjectId(Some(Id::from(200))))],
            &[
                (Id::from(8), FieldType::Int),
                (Id::from(9), FieldType::ObjectId),
            ],
        );
        hprof.heap_dump_segment(&dump);

        let records = sub_records(hprof.into_bytes());

        assert_eq!(1, records.len());
        match &records[0] {
            Ok(SubRecord::Class(c)) => {
                assert_eq!(Id::from(100), c.obj_id());
                assert_eq!(Some(Id::from(99)), c.super_class_obj_id());
                assert_eq!(None, c.class_loader_obj_id());
                assert_eq!(12, c.instance_size_bytes());
                assert_eq!(
                    vec![FieldValue::ObjectId(Some(Id::from(200)))],
                    c.static_fields().iter().map(|s| s.value()).collect_vec()
                );
                assert_eq!(
                    vec![FieldType::Int, FieldType::ObjectId],
                    c.instance_field_descriptors()
                        .iter()
                        .map(|f| f.field_type())
                        .collect_vec()
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reads_android_roots_and_heap_info() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.3", IdSize::U64, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U64);
        dump.heap_dump_info(b'A' as u32, Id::from(5));
        dump.gc_root(SubRecordTag::RootInternedString, Id::from(10));
        dump.jni_monitor_root(Id::from(11), 3, 2);
        dump.java_frame_root(Id::from(12), 4, u32::MAX);
        dump.thread_object(Id::from(13), 4, 6);
        hprof.heap_dump_segment(&dump);

        let records = sub_records(hprof.into_bytes())
            .into_iter()
            .map(|r| r.unwrap())
            .collect_vec();

        assert_eq!(
            SubRecord::HeapDumpInfo(HeapDumpInfo {
                heap_id: 65,
                heap_name_id: Id::from(5)
            }),
            records[0]
        );
        match records[1] {
            SubRecord::GcRoot(r) => {
                assert_eq!(RootType::InternedString, r.root_type());
                assert_eq!(None, r.thread_serial());
            }
            ref other => panic!("unexpected {:?}", other),
        }
        match records[2] {
            SubRecord::GcRoot(r) => {
                assert_eq!(RootType::NativeMonitor, r.root_type());
                assert_eq!(Some(3), r.thread_serial());
                assert_eq!(Some(2), r.frame_index());
            }
            ref other => panic!("unexpected {:?}", other),
        }
        match records[3] {
            SubRecord::GcRoot(r) => {
                assert_eq!(RootType::JavaLocal, r.root_type());
                assert_eq!(None, r.frame_index());
            }
            ref other => panic!("unexpected {:?}", other),
        }
        match records[4] {
            SubRecord::GcRootThreadObj(t) => {
                assert_eq!(Some(Id::from(13)), t.thread_obj_id());
                assert_eq!(4, t.thread_serial());
                assert_eq!(6, t.stack_trace_serial());
            }
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn instance_and_array_contents_are_located_not_copied() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.instance(Id::from(1), Id::from(100), &[0xAA, 0xBB]);
        dump.object_array(Id::from(2), Id::from(101), &[Some(Id::from(1)), None]);
        dump.primitive_array_no_data(Id::from(3), PrimitiveArrayType::Int, 1000);
        hprof.heap_dump_segment(&dump);
        let bytes = hprof.into_bytes();

        let records = sub_records(bytes.clone())
            .into_iter()
            .map(|r| r.unwrap())
            .collect_vec();

        match records[0] {
            SubRecord::Instance(i) => {
                assert_eq!(2, i.fields_len());
                let start = i.fields_offset() as usize;
                assert_eq!(&[0xAA, 0xBB], &bytes[start..start + 2]);
            }
            ref other => panic!("unexpected {:?}", other),
        }
        match records[1] {
            SubRecord::ObjectArray(a) => {
                assert_eq!(2, a.num_elements());
                assert_eq!(Id::from(101), a.array_class_obj_id());
            }
            ref other => panic!("unexpected {:?}", other),
        }
        match records[2] {
            SubRecord::PrimitiveArray(p) => {
                assert_eq!(1000, p.num_elements());
                assert_eq!(None, p.contents_offset());
            }
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_sub_tag_is_fatal() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.gc_root(SubRecordTag::RootStickyClass, Id::from(1));
        dump.raw(&[0x77, 0, 0, 0, 1]);
        hprof.heap_dump_segment(&dump);

        let records = sub_records(hprof.into_bytes());

        assert_eq!(2, records.len());
        assert!(records[0].is_ok());
        match &records[1] {
            Err(HprofError::Format { message, .. }) => assert!(message.contains("0x77")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn overrunning_segment_is_fatal() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        // a sticky class root needs 5 bytes; give the segment only 3, then a string after it
        hprof.raw_record(RecordTag::HeapDumpSegment.tag_byte(), &[0x05, 0, 0]);
        hprof.string(Id::from(1), "abc");

        let records = sub_records(hprof.into_bytes());

        assert_eq!(1, records.len());
        assert!(records[0].is_err());
    }

    #[test]
    fn bad_field_type_is_format_error() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.raw(&[0x20]);
        // id, serial, super, loader, signers, domain, 2 reserved
        for _ in 0..8 {
            dump.raw(&[0, 0, 0, 1]);
        }
        // instance size, no constants, no statics, 1 field of type 3
        dump.raw(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 9, 3]);
        hprof.heap_dump_segment(&dump);

        match &sub_records(hprof.into_bytes())[0] {
            Err(HprofError::Format { message, .. }) => {
                assert!(message.contains("field type"), "{}", message)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn field_values_parse_big_endian() {
        let (rest, v) = FieldType::Int
            .parse_value(&[0xFF, 0xFF, 0xFF, 0xFE, 9], IdSize::U32)
            .unwrap();
        assert_eq!(FieldValue::Int(-2), v);
        assert_eq!(&[9], rest);

        let (_, v) = FieldType::ObjectId
            .parse_value(&[0, 0, 0, 0], IdSize::U32)
            .unwrap();
        assert_eq!(FieldValue::ObjectId(None), v);
        assert_eq!(Some(-2), FieldValue::Int(-2).as_i64());
        assert_eq!(None, FieldValue::Float(1.0).as_i64());
    }
}
