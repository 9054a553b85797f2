//! A small but complete dump shared by the parser, model and analysis tests.
//!
//! Default heap:
//! - classes `java/lang/Object` (100), `java/lang/String` (101), `com/example/Node` (102),
//!   `com/example/Leaf extends Node` (103), `char[]` (104), `[Ljava/lang/Object;` (105)
//! - `Node.INSTANCE` (static) -> 200
//! - 200 Node { next: 201, id: 1 }
//! - 201 Leaf { payload: 202, next: 203, id: 2 }
//! - 202 String { value: 210, count: 2, hash: 0 } = "hi"
//! - 203 Node { next: 200, id: 3 }
//! - 210 char[] "hi"
//! - 211 Object[] [200, null, 999 (not in the dump)]
//! - 400 thread object (plain Object)
//! - roots: sticky class 100, thread object 400, java frame 201, unknown 211
//!
//! App heap (`'A'`, named "app"):
//! - 220 Node { next: null, id: 4 }, JNI global root
//! - 221 int[5] without contents

use crate::heap_dump::{FieldType, FieldValue, PrimitiveArrayType, SubRecordTag};
use crate::writer::{HeapDumpWriter, HprofWriter};
use crate::{Id, IdSize, LineNum};

pub(crate) const OBJECT: u64 = 100;
pub(crate) const STRING: u64 = 101;
pub(crate) const NODE: u64 = 102;
pub(crate) const LEAF: u64 = 103;
pub(crate) const CHAR_ARRAY: u64 = 104;
pub(crate) const OBJECT_ARRAY: u64 = 105;

pub(crate) const NODE_A: u64 = 200;
pub(crate) const LEAF_B: u64 = 201;
pub(crate) const STRING_HI: u64 = 202;
pub(crate) const NODE_C: u64 = 203;
pub(crate) const CHARS_HI: u64 = 210;
pub(crate) const ARRAY: u64 = 211;
pub(crate) const APP_NODE: u64 = 220;
pub(crate) const APP_INTS: u64 = 221;
pub(crate) const THREAD: u64 = 400;
pub(crate) const MISSING: u64 = 999;

pub(crate) const UNKNOWN_TAG: u8 = 0x55;

fn id(n: u64) -> Id {
    Id::from(n)
}

fn obj(n: u64) -> FieldValue {
    FieldValue::ObjectId(if n == 0 { None } else { Some(id(n)) })
}

/// `unknown_record` inserts a record with an unknown tag between two valid records.
pub(crate) fn sample_dump(id_size: IdSize, unknown_record: bool) -> Vec<u8> {
    let mut hprof = HprofWriter::new("JAVA PROFILE 1.0.3", id_size, 1_600_000_000_000);

    let strings = [
        (1, "java/lang/Object"),
        (2, "java/lang/String"),
        (3, "com/example/Node"),
        (4, "com/example/Leaf"),
        (5, "value"),
        (6, "count"),
        (7, "next"),
        (8, "payload"),
        (9, "char[]"),
        (10, "[Ljava/lang/Object;"),
        (11, "INSTANCE"),
        (12, "app"),
        (13, "main"),
        (14, "([Ljava/lang/String;)V"),
        (15, "Main.java"),
        (16, "id"),
        (17, "hash"),
    ];
    for (i, (name_id, text)) in strings.iter().enumerate() {
        hprof.string(id(*name_id), text);
        if unknown_record && i == 0 {
            hprof.raw_record(UNKNOWN_TAG, &[1, 2, 3, 4, 5, 6, 7]);
        }
    }

    for (serial, (class_id, name_id)) in [
        (OBJECT, 1),
        (STRING, 2),
        (NODE, 3),
        (LEAF, 4),
        (CHAR_ARRAY, 9),
        (OBJECT_ARRAY, 10),
    ]
    .iter()
    .enumerate()
    {
        hprof.load_class(serial as u32 + 1, id(*class_id), 0, id(*name_id));
    }

    hprof.stack_frame(id(300), id(13), id(14), id(15), 3, LineNum::Normal(42));
    hprof.stack_trace(1, 1, &[id(300)]);

    let id_bytes = id_size.size_in_bytes() as u32;

    let mut dump = HeapDumpWriter::new(id_size);
    dump.class(id(OBJECT), None, 0, &[], &[]);
    dump.class(
        id(STRING),
        Some(id(OBJECT)),
        id_bytes + 8,
        &[],
        &[
            (id(5), FieldType::ObjectId),
            (id(6), FieldType::Int),
            (id(17), FieldType::Int),
        ],
    );
    dump.class(
        id(NODE),
        Some(id(OBJECT)),
        id_bytes + 4,
        &[(id(11), obj(NODE_A))],
        &[(id(7), FieldType::ObjectId), (id(16), FieldType::Int)],
    );
    dump.class(
        id(LEAF),
        Some(id(NODE)),
        2 * id_bytes + 4,
        &[],
        &[(id(8), FieldType::ObjectId)],
    );
    dump.class(id(CHAR_ARRAY), Some(id(OBJECT)), 0, &[], &[]);
    dump.class(id(OBJECT_ARRAY), Some(id(OBJECT)), 0, &[], &[]);

    dump.gc_root(SubRecordTag::RootStickyClass, id(OBJECT));
    dump.thread_object(id(THREAD), 1, 1);
    dump.java_frame_root(id(LEAF_B), 1, 0);
    dump.gc_root(SubRecordTag::RootUnknown, id(ARRAY));

    dump.instance_values(id(THREAD), id(OBJECT), &[]);
    dump.instance_values(id(NODE_A), id(NODE), &[obj(LEAF_B), FieldValue::Int(1)]);
    dump.instance_values(
        id(LEAF_B),
        id(LEAF),
        &[obj(STRING_HI), obj(NODE_C), FieldValue::Int(2)],
    );
    dump.instance_values(
        id(STRING_HI),
        id(STRING),
        &[obj(CHARS_HI), FieldValue::Int(2), FieldValue::Int(0)],
    );
    dump.instance_values(id(NODE_C), id(NODE), &[obj(NODE_A), FieldValue::Int(3)]);
    dump.primitive_array(
        id(CHARS_HI),
        PrimitiveArrayType::Char,
        &[FieldValue::Char(b'h' as u16), FieldValue::Char(b'i' as u16)],
    );
    dump.object_array(
        id(ARRAY),
        id(OBJECT_ARRAY),
        &[Some(id(NODE_A)), None, Some(id(MISSING))],
    );
    hprof.heap_dump_segment(&dump);

    let mut app = HeapDumpWriter::new(id_size);
    app.heap_dump_info(b'A' as u32, id(12));
    app.instance_values(id(APP_NODE), id(NODE), &[obj(0), FieldValue::Int(4)]);
    app.jni_global_root(id(APP_NODE), id(77));
    app.primitive_array_no_data(id(APP_INTS), PrimitiveArrayType::Int, 5);
    hprof.heap_dump_segment(&app);

    hprof.heap_dump_end();
    hprof.into_bytes()
}
