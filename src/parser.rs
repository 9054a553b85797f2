//! One streaming pass over the records of a dump, then a resolution pass that links classes to
//! superclasses and instances to classes.

use crate::buffer::HprofBuffer;
use crate::heap_dump::{self, GcRoot, GcRootThreadObj, SubRecord, SubRecords};
use crate::snapshot::{
    ArrayInstance, ArrayType, ClassInstance, ClassObj, Field, Heap, Instance, LayoutField,
    Location, RecordStats, Slot, Snapshot, StackFrame, StackTrace, StaticField, DEFAULT_HEAP_ID,
};
use crate::{
    Header, HprofError, Id, IdSize, LoadClass, Record, RecordTag, Records, Serial, UnloadClass,
    Utf8,
};
use log::{debug, info, warn};
use std::borrow::Cow;
use std::collections;
use std::sync::OnceLock;

pub(crate) fn parse(buffer: Box<dyn HprofBuffer>) -> Result<Snapshot, HprofError> {
    let header = Header::read(&*buffer)?;
    info!(
        "Reading {:?} dump with {}-byte ids",
        header.label(),
        header.id_size().size_in_bytes()
    );

    let mut builder = SnapshotBuilder::new(header.id_size());
    for record in Records::new(&*buffer, &header) {
        builder.read_record(&*buffer, record?)?;
    }

    builder.build(buffer, header)
}

/// Classes are kept as read until the end, since their names and field names may only be
/// resolvable once every string has been seen.
struct HeapBuilder {
    id: u32,
    name_id: Option<Id>,
    classes: Vec<heap_dump::Class>,
    instances: Vec<Instance>,
    roots: Vec<GcRoot>,
}

impl HeapBuilder {
    fn new(id: u32) -> HeapBuilder {
        HeapBuilder {
            id,
            name_id: None,
            classes: Vec::new(),
            instances: Vec::new(),
            roots: Vec::new(),
        }
    }
}

struct SnapshotBuilder {
    id_size: IdSize,
    stats: RecordStats,
    strings: collections::HashMap<Id, String>,
    class_name_ids: collections::HashMap<Id, Id>,
    classes_by_serial: collections::HashMap<Serial, Id>,
    frames: collections::HashMap<Id, crate::StackFrame>,
    traces: Vec<(Serial, Serial, Vec<Id>)>,
    threads: collections::HashMap<Serial, GcRootThreadObj>,
    heaps: Vec<HeapBuilder>,
    current_heap: usize,
    index: collections::HashMap<Id, Location>,
}

impl SnapshotBuilder {
    fn new(id_size: IdSize) -> SnapshotBuilder {
        SnapshotBuilder {
            id_size,
            stats: RecordStats::new(),
            strings: collections::HashMap::new(),
            class_name_ids: collections::HashMap::new(),
            classes_by_serial: collections::HashMap::new(),
            frames: collections::HashMap::new(),
            traces: Vec::new(),
            threads: collections::HashMap::new(),
            heaps: vec![HeapBuilder::new(DEFAULT_HEAP_ID)],
            current_heap: 0,
            index: collections::HashMap::new(),
        }
    }

    fn read_record(&mut self, buffer: &dyn HprofBuffer, record: Record) -> Result<(), HprofError> {
        let tag = record.tag();
        self.stats.count_record(tag);
        let id_size = self.id_size;

        match tag {
            None => warn!(
                "Skipping record with unknown tag {:#04X} at offset {} ({} bytes)",
                record.tag_byte(),
                record.record_offset(),
                record.body_len()
            ),
            Some(RecordTag::Utf8) => {
                let body = body(buffer, &record)?;
                let utf8 = Utf8::parse(&body, id_size).map_err(|e| nom_error(&record, e))?;
                self.strings.insert(utf8.name_id(), utf8.text_lossy());
            }
            Some(RecordTag::LoadClass) => {
                let body = body(buffer, &record)?;
                let load = LoadClass::parse(&body, id_size).map_err(|e| nom_error(&record, e))?;
                self.classes_by_serial
                    .insert(load.class_serial(), load.class_obj_id());
                self.class_name_ids
                    .insert(load.class_obj_id(), load.class_name_id());
            }
            Some(RecordTag::UnloadClass) => {
                let body = body(buffer, &record)?;
                let unload = UnloadClass::parse(&body).map_err(|e| nom_error(&record, e))?;
                // the class object stays in the graph
                self.classes_by_serial.remove(&unload.class_serial());
            }
            Some(RecordTag::StackFrame) => {
                let body = body(buffer, &record)?;
                let frame =
                    crate::StackFrame::parse(&body, id_size).map_err(|e| nom_error(&record, e))?;
                self.frames.insert(frame.id(), frame);
            }
            Some(RecordTag::StackTrace) => {
                let body = body(buffer, &record)?;
                let trace =
                    crate::StackTrace::parse(&body, id_size).map_err(|e| nom_error(&record, e))?;
                let frame_ids = trace
                    .frame_ids()
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| nom_error(&record, e))?;
                self.traces
                    .push((trace.stack_trace_serial(), trace.thread_serial(), frame_ids));
            }
            Some(RecordTag::HeapDump) | Some(RecordTag::HeapDumpSegment) => {
                self.read_heap_dump(buffer, &record)?
            }
            Some(other) => debug!(
                "Skipping {:?} record at offset {}",
                other,
                record.record_offset()
            ),
        }

        Ok(())
    }

    fn read_heap_dump(
        &mut self,
        buffer: &dyn HprofBuffer,
        record: &Record,
    ) -> Result<(), HprofError> {
        for sub_record in SubRecords::new(buffer, record, self.id_size) {
            match sub_record? {
                SubRecord::GcRoot(root) => self.add_root(root),
                SubRecord::GcRootThreadObj(thread) => {
                    self.threads.insert(thread.thread_serial(), thread);
                    if let Some(obj_id) = thread.thread_obj_id() {
                        self.add_root(GcRoot::for_thread_object(obj_id, thread.thread_serial()));
                    }
                }
                SubRecord::HeapDumpInfo(info) => {
                    self.switch_heap(info.heap_id(), info.heap_name_id())
                }
                SubRecord::Class(class) => {
                    let heap = &mut self.heaps[self.current_heap];
                    let location = Location {
                        heap: self.current_heap,
                        slot: Slot::Class(heap.classes.len()),
                    };
                    let id = class.obj_id();
                    heap.classes.push(*class);
                    index_object(&mut self.index, id, location);
                }
                SubRecord::Instance(instance) => {
                    let heap_id = self.heaps[self.current_heap].id;
                    self.add_instance(Instance::Class(ClassInstance::new(
                        instance.obj_id(),
                        instance.class_obj_id(),
                        heap_id,
                        instance.stack_trace_serial(),
                        instance.fields_offset(),
                        instance.fields_len(),
                    )));
                }
                SubRecord::ObjectArray(array) => {
                    let heap_id = self.heaps[self.current_heap].id;
                    self.add_instance(Instance::Array(ArrayInstance::new(
                        array.obj_id(),
                        ArrayType::Object,
                        Some(array.array_class_obj_id()),
                        heap_id,
                        array.stack_trace_serial(),
                        array.num_elements(),
                        Some(array.contents_offset()),
                    )));
                }
                SubRecord::PrimitiveArray(array) => {
                    let heap_id = self.heaps[self.current_heap].id;
                    self.add_instance(Instance::Array(ArrayInstance::new(
                        array.obj_id(),
                        ArrayType::Primitive(array.primitive_type()),
                        None,
                        heap_id,
                        array.stack_trace_serial(),
                        array.num_elements(),
                        array.contents_offset(),
                    )));
                }
            }
        }

        Ok(())
    }

    fn add_root(&mut self, root: GcRoot) {
        self.stats.count_root(root.root_type());
        self.heaps[self.current_heap].roots.push(root);
    }

    fn add_instance(&mut self, instance: Instance) {
        let heap = &mut self.heaps[self.current_heap];
        let location = Location {
            heap: self.current_heap,
            slot: Slot::Instance(heap.instances.len()),
        };
        let id = instance.id();
        heap.instances.push(instance);
        index_object(&mut self.index, id, location);
    }

    fn switch_heap(&mut self, heap_id: u32, name_id: Id) {
        self.current_heap = match self.heaps.iter().position(|h| h.id == heap_id) {
            Some(i) => i,
            None => {
                self.heaps.push(HeapBuilder::new(heap_id));
                self.heaps.len() - 1
            }
        };
        self.heaps[self.current_heap].name_id = Some(name_id);
    }

    fn string_or(&self, id: Id, fallback: impl FnOnce() -> String) -> String {
        self.strings.get(&id).cloned().unwrap_or_else(fallback)
    }

    fn build(self, buffer: Box<dyn HprofBuffer>, header: Header) -> Result<Snapshot, HprofError> {
        let mut heaps = Vec::with_capacity(self.heaps.len());
        let mut class_ids_by_name = collections::HashMap::new();

        for hb in &self.heaps {
            let name = hb
                .name_id
                .and_then(|id| self.strings.get(&id).cloned())
                .unwrap_or_else(|| Heap::default_name(hb.id));
            let mut heap = Heap::new(hb.id, name);

            for class in &hb.classes {
                let class_obj = self.class_obj(hb.id, class);
                class_ids_by_name
                    .entry(class_obj.name().clone())
                    .or_insert_with(|| class_obj.id());
                heap.push_class(class_obj);
            }
            for instance in &hb.instances {
                heap.push_instance(instance.clone());
            }
            for root in &hb.roots {
                heap.push_root(*root);
            }

            heaps.push(heap);
        }

        let stack_traces = self.stack_traces();
        let SnapshotBuilder {
            id_size,
            stats,
            strings,
            classes_by_serial,
            threads,
            index,
            ..
        } = self;

        let mut snapshot = Snapshot {
            buffer,
            header,
            heaps,
            index,
            strings,
            class_ids_by_name,
            classes_by_serial,
            stack_traces,
            threads,
            layouts: collections::HashMap::new(),
            stats,
            dominators: OnceLock::new(),
        };

        link_subclasses(&mut snapshot);
        link_instances(&mut snapshot);
        snapshot.layouts = build_layouts(&snapshot, id_size);
        check_instance_sizes(&snapshot)?;

        info!(
            "Read {} classes and {} instances in {} heaps, {} GC roots",
            snapshot.classes().count(),
            snapshot.instances().count(),
            snapshot.heaps().len(),
            snapshot.gc_roots().count()
        );

        Ok(snapshot)
    }

    fn class_obj(&self, heap_id: u32, class: &heap_dump::Class) -> ClassObj {
        let name = self
            .class_name_ids
            .get(&class.obj_id())
            .and_then(|name_id| self.strings.get(name_id).cloned())
            .unwrap_or_else(|| format!("unknown-class-{:#x}", class.obj_id()));

        let field_name =
            |name_id: Id| self.string_or(name_id, || format!("unknown-field-{:#x}", name_id));

        let fields = class
            .instance_field_descriptors()
            .iter()
            .map(|fd| Field::new(field_name(fd.name_id()), fd.field_type()))
            .collect();
        let static_fields = class
            .static_fields()
            .iter()
            .map(|s| {
                StaticField::new(Field::new(field_name(s.name_id()), s.field_type()), s.value())
            })
            .collect();

        ClassObj::new(
            class.obj_id(),
            name,
            heap_id,
            class.super_class_obj_id(),
            class.class_loader_obj_id(),
            class.stack_trace_serial(),
            class.instance_size_bytes(),
            fields,
            static_fields,
        )
    }

    fn stack_traces(&self) -> collections::HashMap<Serial, StackTrace> {
        self.traces
            .iter()
            .map(|(serial, thread_serial, frame_ids)| {
                let frames = frame_ids
                    .iter()
                    .filter_map(|id| match self.frames.get(id) {
                        Some(f) => Some(self.stack_frame(f)),
                        None => {
                            debug!("Stack trace {} refers to missing frame {:#x}", serial, id);
                            None
                        }
                    })
                    .collect();
                (*serial, StackTrace::new(*serial, *thread_serial, frames))
            })
            .collect()
    }

    fn stack_frame(&self, frame: &crate::StackFrame) -> StackFrame {
        let unknown = || "(unknown)".to_owned();
        StackFrame::new(
            frame.id(),
            self.string_or(frame.method_name_id(), unknown),
            self.string_or(frame.method_signature_id(), unknown),
            self.string_or(frame.source_file_name_id(), unknown),
            frame.class_serial(),
            frame.line_num(),
        )
    }
}

fn body<'b>(buffer: &'b dyn HprofBuffer, record: &Record) -> Result<Cow<'b, [u8]>, HprofError> {
    buffer.slice_at(record.body_offset(), record.body_len() as usize)
}

fn nom_error<I>(record: &Record, e: nom::Err<(I, nom::error::ErrorKind)>) -> HprofError {
    let what = match record.tag() {
        Some(tag) => format!("{:?} record", tag),
        None => format!("record with tag {:#04X}", record.tag_byte()),
    };
    HprofError::from_nom(record.body_offset(), &what, e)
}

/// Ids are unique across heaps in well formed dumps; if not, the first object wins lookups.
fn index_object(index: &mut collections::HashMap<Id, Location>, id: Id, location: Location) {
    if index.contains_key(&id) {
        debug!("Duplicate object id {:#x}", id);
    } else {
        index.insert(id, location);
    }
}

fn class_location(snapshot: &Snapshot, id: Id) -> Option<(usize, usize)> {
    match snapshot.index.get(&id) {
        Some(Location {
            heap,
            slot: Slot::Class(slot),
        }) => Some((*heap, *slot)),
        _ => None,
    }
}

fn link_subclasses(snapshot: &mut Snapshot) {
    let links = snapshot
        .classes()
        .filter_map(|c| c.super_class_id().map(|s| (s, c.id())))
        .collect::<Vec<_>>();

    for (super_id, class_id) in links {
        match class_location(snapshot, super_id) {
            Some((heap, slot)) => snapshot.heaps[heap].class_mut(slot).add_subclass(class_id),
            None => debug!("Class {:#x} has missing superclass {:#x}", class_id, super_id),
        }
    }
}

/// Registers every instance with its class. Primitive arrays don't name a class in the dump, so
/// they get the class named like `int[]` or `[I` if there is one.
fn link_instances(snapshot: &mut Snapshot) {
    let mut links = Vec::new();
    let mut missing = 0_u64;

    for (heap_index, heap) in snapshot.heaps.iter().enumerate() {
        for (slot, instance) in heap.instances().iter().enumerate() {
            let class_id = match instance {
                Instance::Array(a) => match a.array_type() {
                    ArrayType::Primitive(p) => p
                        .array_class_names()
                        .iter()
                        .find_map(|n| snapshot.class_ids_by_name.get(n).copied()),
                    ArrayType::Object => a.class_id(),
                },
                Instance::Class(i) => Some(i.class_id()),
            };

            match class_id.and_then(|id| class_location(snapshot, id).map(|loc| (id, loc))) {
                Some((class_id, loc)) => {
                    links.push((heap_index, slot, instance.id(), class_id, loc))
                }
                None => missing += 1,
            }
        }
    }

    for (heap_index, slot, instance_id, class_id, (class_heap, class_slot)) in links {
        if let Instance::Array(a) = snapshot.heaps[heap_index].instance_mut(slot) {
            a.set_class_id(class_id);
        }
        snapshot.heaps[class_heap]
            .class_mut(class_slot)
            .add_instance(instance_id);
    }

    if missing > 0 {
        debug!("{} instances have no class in the dump", missing);
    }
}

/// Walks each class's superclass chain once, guarding against cycles in malformed dumps.
fn build_layouts(
    snapshot: &Snapshot,
    id_size: IdSize,
) -> collections::HashMap<Id, Vec<LayoutField>> {
    let mut layouts = collections::HashMap::new();

    for class in snapshot.classes() {
        let mut layout = Vec::new();
        let mut offset = 0;
        let mut seen = collections::HashSet::new();
        let mut current = Some(class);

        while let Some(c) = current {
            if !seen.insert(c.id()) {
                warn!("Superclass cycle through class {}", c.name());
                break;
            }
            for field in c.fields() {
                layout.push(LayoutField::new(field.clone(), offset, c.id()));
                offset += field.field_type().size_in_bytes(id_size);
            }
            current = snapshot.super_class(c);
        }

        layouts.insert(class.id(), layout);
    }

    layouts
}

/// Fails on an instance whose fields blob is too short for its class's field layout, since
/// neither its values nor its references could be decoded. Longer or otherwise mismatched blobs
/// are only logged, once per class.
fn check_instance_sizes(snapshot: &Snapshot) -> Result<(), HprofError> {
    let id_size = snapshot.id_size();
    let mut reported = collections::HashSet::new();

    for instance in snapshot.instances().filter_map(|i| i.as_class_instance()) {
        let class = match snapshot.find_class(instance.class_id()) {
            Some(c) => c,
            None => continue,
        };
        let layout_len = snapshot
            .layout(class.id())
            .and_then(|l| l.last())
            .map(|lf| lf.offset() + lf.field().field_type().size_in_bytes(id_size))
            .unwrap_or(0);

        if (instance.fields_len() as usize) < layout_len {
            return Err(HprofError::format(
                instance.fields_offset(),
                format!(
                    "instance {:#x} of {} has {} bytes of fields but its layout needs {}",
                    instance.id(),
                    class.name(),
                    instance.fields_len(),
                    layout_len
                ),
            ));
        }
        if instance.fields_len() != class.instance_size() && reported.insert(class.id()) {
            warn!(
                "Instance {:#x} of {} has {} bytes of fields but the class declares {}",
                instance.id(),
                class.name(),
                instance.fields_len(),
                class.instance_size()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferOptions, HprofBuffer, MemoryBuffer};
    use crate::heap_dump::{FieldType, FieldValue, RootType, SubRecordTag};
    use crate::test_fixtures::*;
    use crate::writer::{HeapDumpWriter, HprofWriter};
    use crate::LineNum;
    use itertools::Itertools;
    use std::io::Write;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn heap_counts(snapshot: &Snapshot) -> Vec<(String, usize, usize, usize)> {
        snapshot
            .heaps()
            .iter()
            .map(|h| {
                (
                    h.name().clone(),
                    h.class_count(),
                    h.instance_count(),
                    h.roots().len(),
                )
            })
            .collect_vec()
    }

    fn class_names(snapshot: &Snapshot) -> Vec<String> {
        snapshot
            .classes()
            .sorted()
            .map(|c| c.name().clone())
            .collect_vec()
    }

    #[test]
    fn counts_match_sub_records_per_heap() {
        init_logging();
        let snapshot = Snapshot::from_bytes(sample_dump(IdSize::U32, false)).unwrap();

        assert_eq!(
            vec![
                ("default".to_owned(), 6, 7, 4),
                ("app".to_owned(), 0, 2, 1)
            ],
            heap_counts(&snapshot)
        );
        assert_eq!(5, snapshot.gc_roots().count());
        assert_eq!(Some(b'A' as u32), snapshot.heap_by_name("app").map(|h| h.id()));
    }

    #[test]
    fn unknown_record_is_skipped() {
        init_logging();
        let plain = Snapshot::from_bytes(sample_dump(IdSize::U64, false)).unwrap();
        let with_unknown = Snapshot::from_bytes(sample_dump(IdSize::U64, true)).unwrap();

        assert_eq!(heap_counts(&plain), heap_counts(&with_unknown));
        assert_eq!(class_names(&plain), class_names(&with_unknown));
        assert_eq!(1, with_unknown.stats().unknown_records());
    }

    #[test]
    fn parsing_twice_gives_same_snapshot() {
        let bytes = sample_dump(IdSize::U64, false);
        let first = Snapshot::from_bytes(bytes.clone()).unwrap();
        let second = Snapshot::from_bytes(bytes).unwrap();

        assert_eq!(class_names(&first), class_names(&second));
        assert_eq!(heap_counts(&first), heap_counts(&second));
        assert_eq!(first.dominators().unwrap(), second.dominators().unwrap());
    }

    #[test]
    fn shard_size_does_not_change_snapshot() {
        init_logging();
        let bytes = sample_dump(IdSize::U64, true);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let reference = Snapshot::from_bytes(bytes.clone()).unwrap();

        for &(shard_size, padding) in &[(1 << 30, 1024), (4096, 128), (97, 8), (13, 0), (7, 3)] {
            let options = BufferOptions::default()
                .with_shard_size(shard_size)
                .with_shard_padding(padding);
            let snapshot = Snapshot::open_with_options(file.path(), &options).unwrap();

            assert_eq!(heap_counts(&reference), heap_counts(&snapshot));
            assert_eq!(class_names(&reference), class_names(&snapshot));
            assert_eq!(
                reference.dominators().unwrap(),
                snapshot.dominators().unwrap(),
                "shard size {}",
                shard_size
            );
            let hi = snapshot.find_instance(Id::from(STRING_HI)).unwrap();
            assert_eq!(Some("hi".to_owned()), snapshot.string_value(hi).unwrap());
        }
    }

    #[test]
    fn resolution_links_classes_and_instances() {
        let snapshot = Snapshot::from_bytes(sample_dump(IdSize::U32, false)).unwrap();

        let node = snapshot.find_class_by_name("com/example/Node").unwrap();
        assert_eq!(vec![Id::from(LEAF)], *node.subclasses());
        assert_eq!(
            vec![Id::from(NODE_A), Id::from(NODE_C), Id::from(APP_NODE)],
            *node.instances()
        );

        let object = snapshot.find_class(Id::from(OBJECT)).unwrap();
        assert_eq!(4, object.subclasses().len());
        assert_eq!(None, snapshot.super_class(object));
        assert_eq!(
            "com/example/Node",
            snapshot
                .super_class(snapshot.find_class(Id::from(LEAF)).unwrap())
                .unwrap()
                .name()
        );

        // primitive arrays are linked by name
        let chars = snapshot.find_instance(Id::from(CHARS_HI)).unwrap();
        assert_eq!(Some(Id::from(CHAR_ARRAY)), chars.class_id());
        let ints = snapshot.find_instance(Id::from(APP_INTS)).unwrap();
        assert_eq!(None, ints.class_id());
    }

    #[test]
    fn roots_threads_and_traces() {
        let snapshot = Snapshot::from_bytes(sample_dump(IdSize::U64, false)).unwrap();

        let roots = snapshot
            .gc_roots()
            .map(|r| (r.root_type(), r.obj_id().id()))
            .collect_vec();
        assert_eq!(
            vec![
                (RootType::SystemClass, OBJECT),
                (RootType::ThreadObject, THREAD),
                (RootType::JavaLocal, LEAF_B),
                (RootType::Unknown, ARRAY),
                (RootType::NativeStatic, APP_NODE),
            ],
            roots
        );

        let thread = snapshot.thread(1).unwrap();
        assert_eq!(Some(Id::from(THREAD)), thread.thread_obj_id());

        let trace = snapshot.stack_trace(thread.stack_trace_serial()).unwrap();
        assert_eq!(1, trace.frames().len());
        let frame = &trace.frames()[0];
        assert_eq!("main", frame.method_name());
        assert_eq!("Main.java", frame.source_file());
        assert_eq!(LineNum::Normal(42), frame.line_num());
        assert_eq!(
            "com/example/Node",
            snapshot.find_class_by_serial(frame.class_serial()).unwrap().name()
        );
    }

    #[test]
    fn unload_forgets_serial_but_keeps_class() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        hprof.string(Id::from(1), "a/B");
        hprof.load_class(7, Id::from(10), 0, Id::from(1));
        hprof.unload_class(7);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.class(Id::from(10), None, 0, &[], &[]);
        hprof.heap_dump(&dump);

        let snapshot = Snapshot::from_bytes(hprof.into_bytes()).unwrap();

        assert!(snapshot.find_class_by_serial(7).is_none());
        assert_eq!("a/B", snapshot.find_class(Id::from(10)).unwrap().name());
        assert_eq!(1, snapshot.stats().record_count(RecordTag::HeapDump));
    }

    #[test]
    fn missing_names_get_placeholders() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.class(
            Id::from(0x10),
            Some(Id::from(0x99)),
            4,
            &[],
            &[(Id::from(0x20), FieldType::Int)],
        );
        dump.instance_values(Id::from(0x11), Id::from(0x10), &[FieldValue::Int(5)]);
        dump.instance_values(Id::from(0x12), Id::from(0x77), &[FieldValue::Int(5)]);
        hprof.heap_dump_segment(&dump);

        let snapshot = Snapshot::from_bytes(hprof.into_bytes()).unwrap();

        let class = snapshot.find_class(Id::from(0x10)).unwrap();
        assert_eq!("unknown-class-0x10", class.name());
        assert_eq!("unknown-field-0x20", class.fields()[0].name());
        // missing superclass and missing class are not errors
        assert!(snapshot.super_class(class).is_none());
        let orphan = snapshot
            .find_instance(Id::from(0x12))
            .and_then(|i| i.as_class_instance())
            .unwrap();
        assert!(snapshot.field_values(orphan).unwrap().is_empty());
    }

    #[test]
    fn truncated_file_fails_with_offset() {
        let mut bytes = sample_dump(IdSize::U32, false);
        let len = bytes.len();
        bytes.truncate(len - 10);

        match Snapshot::from_bytes(bytes) {
            Err(e) => assert!(e.offset().is_some(), "{}", e),
            Ok(_) => panic!("parsed a truncated dump"),
        }
    }

    #[test]
    fn bad_sub_record_fails_parse() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.gc_root(SubRecordTag::RootStickyClass, Id::from(1));
        dump.raw(&[0x42]);
        hprof.heap_dump_segment(&dump);

        match Snapshot::from_bytes(hprof.into_bytes()) {
            Err(HprofError::Format { message, .. }) => assert!(message.contains("0x42")),
            Err(e) => panic!("unexpected {:?}", e),
            Ok(_) => panic!("parsed a bad sub-record"),
        }
    }

    #[test]
    fn heap_switches_return_to_existing_heaps() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.3", IdSize::U32, 0);
        hprof.string(Id::from(1), "app");
        hprof.string(Id::from(2), "image");

        let mut first = HeapDumpWriter::new(IdSize::U32);
        first.class(Id::from(0x10), None, 0, &[], &[]);
        first.instance(Id::from(0x20), Id::from(0x10), &[]);
        first.heap_dump_info(b'A' as u32, Id::from(1));
        first.instance(Id::from(0x21), Id::from(0x10), &[]);
        first.gc_root(SubRecordTag::RootUnknown, Id::from(0x21));
        first.heap_dump_info(b'I' as u32, Id::from(2));
        first.class(Id::from(0x11), Some(Id::from(0x10)), 0, &[], &[]);
        first.instance(Id::from(0x22), Id::from(0x11), &[]);
        hprof.heap_dump_segment(&first);

        // starts in the image heap left current by the previous segment
        let mut second = HeapDumpWriter::new(IdSize::U32);
        second.instance(Id::from(0x23), Id::from(0x11), &[]);
        second.heap_dump_info(b'A' as u32, Id::from(1));
        second.instance(Id::from(0x24), Id::from(0x10), &[]);
        second.gc_root(SubRecordTag::RootUnknown, Id::from(0x24));
        hprof.heap_dump_segment(&second);

        let snapshot = Snapshot::from_bytes(hprof.into_bytes()).unwrap();

        assert_eq!(3, snapshot.heaps().len());
        assert_eq!(
            vec![
                ("default".to_owned(), 1, 1, 0),
                ("app".to_owned(), 0, 2, 2),
                ("image".to_owned(), 1, 2, 0)
            ],
            heap_counts(&snapshot)
        );
        let app = snapshot.heap_by_name("app").unwrap();
        assert_eq!(b'A' as u32, app.id());
        assert_eq!(
            vec![Id::from(0x21), Id::from(0x24)],
            app.instances().iter().map(|i| i.id()).collect_vec()
        );
        assert_eq!(Some(2), snapshot.heap_index_of(Id::from(0x23)));
        assert_eq!(Some(1), snapshot.heap_index_of(Id::from(0x24)));
    }

    #[test]
    fn short_instance_blob_fails_parse() {
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        hprof.string(Id::from(1), "x");
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.class(Id::from(0xa), None, 8, &[], &[(Id::from(1), FieldType::Long)]);
        dump.instance(Id::from(0xb), Id::from(0xa), &[0, 0, 0, 1]);
        dump.instance_values(Id::from(0xc), Id::from(0xa), &[FieldValue::Long(2)]);
        dump.gc_root(SubRecordTag::RootUnknown, Id::from(0xb));
        dump.gc_root(SubRecordTag::RootUnknown, Id::from(0xc));
        hprof.heap_dump_segment(&dump);

        match Snapshot::from_bytes(hprof.into_bytes()) {
            Err(HprofError::Format { message, .. }) => {
                assert!(message.contains("0xb"), "{}", message);
                assert!(message.contains("needs 8"), "{}", message);
            }
            Err(e) => panic!("unexpected {:?}", e),
            Ok(_) => panic!("parsed an instance too short for its fields"),
        }
    }

    #[test]
    fn long_instance_blob_is_only_logged() {
        init_logging();
        let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.2", IdSize::U32, 0);
        let mut dump = HeapDumpWriter::new(IdSize::U32);
        dump.class(Id::from(0xa), None, 4, &[], &[(Id::from(1), FieldType::ObjectId)]);
        dump.instance(Id::from(0xb), Id::from(0xa), &[0, 0, 0, 0xc, 0xff, 0xff]);
        dump.instance_values(Id::from(0xc), Id::from(0xa), &[FieldValue::ObjectId(None)]);
        dump.gc_root(SubRecordTag::RootUnknown, Id::from(0xb));
        hprof.heap_dump_segment(&dump);

        let snapshot = Snapshot::from_bytes(hprof.into_bytes()).unwrap();
        let dominators = snapshot.dominators().unwrap();

        assert_eq!(vec![Id::from(0xc)], snapshot.references(Id::from(0xb)).unwrap());
        assert_eq!(2, dominators.len());
        assert_eq!(Some(8), snapshot.retained_sizes().unwrap().retained_size(Id::from(0xb)));
    }

    #[test]
    fn empty_input_fails() {
        assert!(Snapshot::from_bytes(Vec::new()).is_err());
        let empty: Box<dyn HprofBuffer> = Box::new(MemoryBuffer::new(b"JAVA PROFILE".to_vec()));
        assert!(Snapshot::from_buffer(empty).is_err());
    }
}
