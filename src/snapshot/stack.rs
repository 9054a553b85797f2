use crate::{Id, LineNum, Serial};
use getset::{CopyGetters, Getters};

/// One frame of a stack trace with its strings resolved.
#[derive(Getters, CopyGetters, Clone, Debug, PartialEq)]
pub struct StackFrame {
    #[get_copy = "pub"]
    id: Id,
    #[get = "pub"]
    method_name: String,
    #[get = "pub"]
    method_signature: String,
    #[get = "pub"]
    source_file: String,
    #[get_copy = "pub"]
    class_serial: Serial,
    #[get_copy = "pub"]
    line_num: LineNum,
}

impl StackFrame {
    pub(crate) fn new(
        id: Id,
        method_name: String,
        method_signature: String,
        source_file: String,
        class_serial: Serial,
        line_num: LineNum,
    ) -> StackFrame {
        StackFrame {
            id,
            method_name,
            method_signature,
            source_file,
            class_serial,
            line_num,
        }
    }
}

#[derive(Getters, CopyGetters, Clone, Debug, PartialEq)]
pub struct StackTrace {
    #[get_copy = "pub"]
    serial: Serial,
    #[get_copy = "pub"]
    thread_serial: Serial,
    /// Innermost first. Frames missing from the dump are left out.
    #[get = "pub"]
    frames: Vec<StackFrame>,
}

impl StackTrace {
    pub(crate) fn new(
        serial: Serial,
        thread_serial: Serial,
        frames: Vec<StackFrame>,
    ) -> StackTrace {
        StackTrace {
            serial,
            thread_serial,
            frames,
        }
    }
}
