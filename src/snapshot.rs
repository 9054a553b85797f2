//! The object graph of a parsed dump.
//!
//! All heaps, classes, instances and roots are owned by [Snapshot] and addressed by [Id].
//! Instance field values and array contents are not copied out of the dump; they're decoded from
//! the buffer when asked for, so the buffer lives as long as the snapshot.

use crate::analysis::{self, DominatorMap, RetainedSizes};
use crate::buffer::{self, BufferOptions, HprofBuffer, MemoryBuffer};
use crate::heap_dump::{
    FieldValue, GcRoot, GcRootThreadObj, PrimitiveArrayContents, PrimitiveArrayType, RootType,
};
use crate::{parser, Elements, Header, HprofError, Id, IdSize, RecordTag, Serial};
use getset::{CopyGetters, Getters};
use std::collections;
use std::path;
use std::sync::OnceLock;
use strum::IntoEnumIterator;

mod class_obj;
mod heap;
mod instance;
mod stack;
mod visitor;

pub use class_obj::{ClassObj, Field, LayoutField, StaticField};
pub use heap::*;
pub use instance::{ArrayInstance, ArrayType, ClassInstance, HeapObject, Instance};
pub use stack::{StackFrame, StackTrace};
pub use visitor::{walk, Visitor};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    Class(usize),
    Instance(usize),
}

/// Where an object lives: index into `heaps`, then into that heap's classes or instances.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Location {
    pub(crate) heap: usize,
    pub(crate) slot: Slot,
}

/// Counts of what was read, for diagnostics.
#[derive(Getters, CopyGetters, Clone, Debug, PartialEq)]
pub struct RecordStats {
    /// Every known tag is present, with 0 if the dump had none
    #[get = "pub"]
    record_counts: collections::HashMap<RecordTag, u64>,
    #[get = "pub"]
    root_counts: collections::HashMap<RootType, u64>,
    /// Records with tags this crate doesn't know, skipped by length
    #[get_copy = "pub"]
    unknown_records: u64,
}

impl RecordStats {
    pub(crate) fn new() -> RecordStats {
        RecordStats {
            record_counts: RecordTag::iter().map(|t| (t, 0)).collect(),
            root_counts: RootType::iter().map(|t| (t, 0)).collect(),
            unknown_records: 0,
        }
    }

    pub(crate) fn count_record(&mut self, tag: Option<RecordTag>) {
        match tag {
            Some(t) => *self.record_counts.entry(t).or_insert(0) += 1,
            None => self.unknown_records += 1,
        }
    }

    pub(crate) fn count_root(&mut self, root_type: RootType) {
        *self.root_counts.entry(root_type).or_insert(0) += 1;
    }

    pub fn record_count(&self, tag: RecordTag) -> u64 {
        self.record_counts.get(&tag).copied().unwrap_or(0)
    }
}

/// A field value with object references looked up in the snapshot.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value<'s> {
    /// A null reference, or one to an object the dump doesn't contain
    Null,
    Object(HeapObject<'s>),
    Primitive(FieldValue),
}

pub struct Snapshot {
    pub(crate) buffer: Box<dyn HprofBuffer>,
    pub(crate) header: Header,
    pub(crate) heaps: Vec<Heap>,
    pub(crate) index: collections::HashMap<Id, Location>,
    pub(crate) strings: collections::HashMap<Id, String>,
    pub(crate) class_ids_by_name: collections::HashMap<String, Id>,
    pub(crate) classes_by_serial: collections::HashMap<Serial, Id>,
    pub(crate) stack_traces: collections::HashMap<Serial, StackTrace>,
    pub(crate) threads: collections::HashMap<Serial, GcRootThreadObj>,
    pub(crate) layouts: collections::HashMap<Id, Vec<LayoutField>>,
    pub(crate) stats: RecordStats,
    pub(crate) dominators: OnceLock<DominatorMap>,
}

impl Snapshot {
    /// Map and parse the file at `path` with default [BufferOptions].
    pub fn open<P: AsRef<path::Path>>(path: P) -> Result<Snapshot, HprofError> {
        Snapshot::open_with_options(path, &BufferOptions::default())
    }

    pub fn open_with_options<P: AsRef<path::Path>>(
        path: P,
        options: &BufferOptions,
    ) -> Result<Snapshot, HprofError> {
        Snapshot::from_buffer(buffer::open_file(path, *options)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Snapshot, HprofError> {
        Snapshot::from_buffer(Box::new(MemoryBuffer::new(bytes)))
    }

    pub fn from_buffer(buffer: Box<dyn HprofBuffer>) -> Result<Snapshot, HprofError> {
        parser::parse(buffer)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn id_size(&self) -> IdSize {
        self.header.id_size()
    }

    pub fn stats(&self) -> &RecordStats {
        &self.stats
    }

    /// In the order they were first seen; the default heap is always first.
    pub fn heaps(&self) -> &[Heap] {
        &self.heaps
    }

    pub fn heap(&self, heap_id: u32) -> Option<&Heap> {
        self.heaps.iter().find(|h| h.id() == heap_id)
    }

    pub fn heap_by_name(&self, name: &str) -> Option<&Heap> {
        self.heaps.iter().find(|h| h.name() == name)
    }

    pub fn string(&self, id: Id) -> Option<&str> {
        self.strings.get(&id).map(|s| s.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassObj> {
        self.heaps.iter().flat_map(|h| h.classes().iter())
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.heaps.iter().flat_map(|h| h.instances().iter())
    }

    /// Every root in every heap. An object can be a root more than once.
    pub fn gc_roots(&self) -> impl Iterator<Item = &GcRoot> {
        self.heaps.iter().flat_map(|h| h.roots().iter())
    }

    pub fn contains(&self, id: Id) -> bool {
        self.index.contains_key(&id)
    }

    pub fn resolve(&self, id: Id) -> Option<HeapObject> {
        self.index.get(&id).map(|loc| {
            let heap = &self.heaps[loc.heap];
            match loc.slot {
                Slot::Class(i) => HeapObject::Class(&heap.classes()[i]),
                Slot::Instance(i) => HeapObject::Instance(&heap.instances()[i]),
            }
        })
    }

    pub fn find_class(&self, id: Id) -> Option<&ClassObj> {
        self.resolve(id).and_then(|o| o.as_class())
    }

    /// Names as written in the dump, e.g. `java/lang/String`. If several loaders define the
    /// same name, the first one parsed wins.
    pub fn find_class_by_name(&self, name: &str) -> Option<&ClassObj> {
        self.class_ids_by_name
            .get(name)
            .and_then(|id| self.find_class(*id))
    }

    pub fn find_instance(&self, id: Id) -> Option<&Instance> {
        self.resolve(id).and_then(|o| o.as_instance())
    }

    /// The class loaded with `class_serial`, unless it was unloaded.
    pub fn find_class_by_serial(&self, class_serial: Serial) -> Option<&ClassObj> {
        self.classes_by_serial
            .get(&class_serial)
            .and_then(|id| self.find_class(*id))
    }

    pub fn super_class(&self, class: &ClassObj) -> Option<&ClassObj> {
        class.super_class_id().and_then(|id| self.find_class(id))
    }

    pub fn class_of(&self, instance: &Instance) -> Option<&ClassObj> {
        instance.class_id().and_then(|id| self.find_class(id))
    }

    /// Index into [Snapshot::heaps] of the heap holding `id`.
    pub fn heap_index_of(&self, id: Id) -> Option<usize> {
        self.index.get(&id).map(|loc| loc.heap)
    }

    pub fn thread(&self, thread_serial: Serial) -> Option<&GcRootThreadObj> {
        self.threads.get(&thread_serial)
    }

    pub fn stack_trace(&self, stack_trace_serial: Serial) -> Option<&StackTrace> {
        self.stack_traces.get(&stack_trace_serial)
    }

    /// Where `instance` was allocated, if the dump recorded it.
    pub fn allocation_trace(&self, instance: &Instance) -> Option<&StackTrace> {
        self.stack_trace(instance.stack_trace_serial())
    }

    /// All instance fields of `class_id` (inherited included) with their offsets in an
    /// instance's field blob: the class's own fields first, then its superclass's, and so on.
    pub fn layout(&self, class_id: Id) -> Option<&[LayoutField]> {
        self.layouts.get(&class_id).map(|l| l.as_slice())
    }

    /// Bytes the object itself occupies: declared instance size for instances, element bytes for
    /// arrays, static value bytes for classes.
    pub fn shallow_size(&self, object: HeapObject) -> u64 {
        match object {
            HeapObject::Class(c) => c.static_fields_size(self.id_size()),
            HeapObject::Instance(Instance::Class(i)) => i.size(self.find_class(i.class_id())),
            HeapObject::Instance(Instance::Array(a)) => a.size(self.id_size()),
        }
    }

    /// Decode every field of `instance`, in layout order.
    ///
    /// Instances of classes the dump doesn't contain have no fields.
    pub fn field_values(
        &self,
        instance: &ClassInstance,
    ) -> Result<Vec<(&Field, FieldValue)>, HprofError> {
        let layout = match self.layout(instance.class_id()) {
            Some(l) => l,
            None => return Ok(Vec::new()),
        };

        let blob = self
            .buffer
            .slice_at(instance.fields_offset(), instance.fields_len() as usize)?;
        let id_size = self.id_size();

        layout
            .iter()
            .map(|lf| {
                let offset = instance.fields_offset() + lf.offset() as u64;
                let input = blob.get(lf.offset()..).unwrap_or(&[]);
                lf.field()
                    .field_type()
                    .parse_value(input, id_size)
                    .map(|(_, v)| (lf.field(), v))
                    .map_err(|e| {
                        let what = format!(
                            "field {} of instance {:#x}",
                            lf.field().name(),
                            instance.id()
                        );
                        HprofError::from_nom(offset, &what, e)
                    })
            })
            .collect()
    }

    /// The value of the first field called `name`, searching the instance's own class before
    /// its superclasses.
    pub fn field_value(
        &self,
        instance: &ClassInstance,
        name: &str,
    ) -> Result<Option<FieldValue>, HprofError> {
        Ok(self
            .field_values(instance)?
            .into_iter()
            .find(|(f, _)| f.name() == name)
            .map(|(_, v)| v))
    }

    /// Like [Snapshot::field_values], with references resolved to the objects they point to.
    pub fn values(&self, instance: &ClassInstance) -> Result<Vec<(&Field, Value)>, HprofError> {
        Ok(self
            .field_values(instance)?
            .into_iter()
            .map(|(f, v)| (f, self.resolve_value(v)))
            .collect())
    }

    pub fn resolve_value(&self, value: FieldValue) -> Value {
        match value {
            FieldValue::ObjectId(Some(id)) => {
                self.resolve(id).map(Value::Object).unwrap_or(Value::Null)
            }
            FieldValue::ObjectId(None) => Value::Null,
            other => Value::Primitive(other),
        }
    }

    /// Elements of an object array; `None` for null slots. Empty for primitive arrays.
    pub fn object_array_elements(
        &self,
        array: &ArrayInstance,
    ) -> Result<Vec<Option<Id>>, HprofError> {
        let offset = match (array.array_type(), array.contents_offset()) {
            (ArrayType::Object, Some(offset)) => offset,
            _ => return Ok(Vec::new()),
        };

        let id_size = self.id_size();
        let contents = self.buffer.slice_at(offset, array.size(id_size) as usize)?;
        Elements::<Id>::new(&contents, array.num_elements(), id_size)
            .map(|r| r.map(|id| if id.id() == 0 { None } else { Some(id) }))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HprofError::from_nom(offset, "object array elements", e))
    }

    /// Every element of an array as a value. Empty when the dump left out the contents.
    pub fn array_values(&self, array: &ArrayInstance) -> Result<Vec<FieldValue>, HprofError> {
        let offset = match array.contents_offset() {
            Some(offset) => offset,
            None => return Ok(Vec::new()),
        };

        let element_type = match array.array_type() {
            ArrayType::Object => {
                return Ok(self
                    .object_array_elements(array)?
                    .into_iter()
                    .map(FieldValue::ObjectId)
                    .collect())
            }
            ArrayType::Primitive(p) => p.field_type(),
        };

        let id_size = self.id_size();
        let contents = self.buffer.slice_at(offset, array.size(id_size) as usize)?;
        let mut input: &[u8] = &contents;
        let mut values = Vec::with_capacity(array.num_elements() as usize);
        for _ in 0..array.num_elements() {
            let (rest, v) = element_type
                .parse_value(input, id_size)
                .map_err(|e| HprofError::from_nom(offset, "array element", e))?;
            values.push(v);
            input = rest;
        }
        Ok(values)
    }

    /// Outgoing references of any object: instance object fields (inherited included), object
    /// array elements, and the static object fields of a class. Nulls and references to objects
    /// missing from the dump are left out.
    pub fn references(&self, id: Id) -> Result<Vec<Id>, HprofError> {
        let mut refs = Vec::new();
        self.collect_references(id, &mut refs)?;
        Ok(refs)
    }

    pub(crate) fn collect_references(&self, id: Id, refs: &mut Vec<Id>) -> Result<(), HprofError> {
        let mut push = |value: Option<Id>| {
            if let Some(target) = value {
                if self.contains(target) {
                    refs.push(target);
                }
            }
        };

        match self.resolve(id) {
            None => {}
            Some(HeapObject::Class(c)) => {
                for s in c.static_fields() {
                    push(s.value().as_object_id());
                }
            }
            Some(HeapObject::Instance(Instance::Class(i))) => {
                for (_, v) in self.field_values(i)? {
                    push(v.as_object_id());
                }
            }
            Some(HeapObject::Instance(Instance::Array(a))) => {
                for element in self.object_array_elements(a)? {
                    push(element);
                }
            }
        }
        Ok(())
    }

    /// The text of a `java.lang.String` instance. `None` if `instance` isn't a string or its
    /// contents aren't in the dump.
    ///
    /// Handles both `char[]` values and compact `byte[]` values (Latin-1, or UTF-16 when the
    /// `coder` field is 1), honouring `offset` and `count` fields when present.
    pub fn string_value(&self, instance: &Instance) -> Result<Option<String>, HprofError> {
        let instance = match instance.as_class_instance() {
            Some(i) => i,
            None => return Ok(None),
        };
        match self.find_class(instance.class_id()) {
            Some(c) if c.name() == "java/lang/String" || c.name() == "java.lang.String" => {}
            _ => return Ok(None),
        }

        let values = self.field_values(instance)?;
        let field = |name: &str| {
            values
                .iter()
                .find(|(f, _)| f.name() == name)
                .map(|(_, v)| *v)
        };

        let array = match field("value")
            .and_then(|v| v.as_object_id())
            .and_then(|id| self.find_instance(id))
            .and_then(|i| i.as_array())
        {
            Some(a) => a,
            None => return Ok(None),
        };
        let (primitive_type, contents_offset) = match (array.array_type(), array.contents_offset())
        {
            (ArrayType::Primitive(p), Some(offset)) => (p, offset),
            _ => return Ok(None),
        };

        let bytes = self
            .buffer
            .slice_at(contents_offset, array.size(self.id_size()) as usize)?;
        let contents = PrimitiveArrayContents::new(primitive_type, array.num_elements(), &bytes);
        let to_err = |e| HprofError::from_nom(contents_offset, "string contents", e);

        let units: Vec<u16> = match primitive_type {
            PrimitiveArrayType::Char => match contents.chars() {
                Some(chars) => chars.collect::<Result<_, _>>().map_err(to_err)?,
                None => return Ok(None),
            },
            PrimitiveArrayType::Byte if field("coder").and_then(|v| v.as_i64()) == Some(1) => bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
            PrimitiveArrayType::Byte => match contents.bytes() {
                Some(latin1) => latin1
                    .map(|b| b.map(|b| b as u8 as u16))
                    .collect::<Result<_, _>>()
                    .map_err(to_err)?,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        let start = field("offset")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            .max(0) as usize;
        let start = start.min(units.len());
        let end = match field("count").and_then(|v| v.as_i64()) {
            Some(count) => start.saturating_add(count.max(0) as usize).min(units.len()),
            None => units.len(),
        };

        Ok(Some(String::from_utf16_lossy(&units[start..end])))
    }

    /// Immediate dominators of everything reachable from the GC roots, computed on first use.
    pub fn dominators(&self) -> Result<&DominatorMap, HprofError> {
        if let Some(d) = self.dominators.get() {
            return Ok(d);
        }
        let computed = analysis::compute_dominators(self)?;
        Ok(self.dominators.get_or_init(|| computed))
    }

    pub fn retained_sizes(&self) -> Result<RetainedSizes, HprofError> {
        analysis::compute_retained_sizes(self, self.dominators()?)
    }
}
