//! Reconstructs the object graph held in a JVM / Android hprof heap dump and runs dominator
//! analysis over it.
//!
//! The pipeline is: file bytes ([buffer]) -> tagged records ([Records], [heap_dump]) ->
//! [snapshot::Snapshot] (heaps, classes, instances, GC roots) -> [analysis] (dominators and
//! retained sizes).
//!
//! ```no_run
//! use hprof_snapshot::snapshot::Snapshot;
//!
//! let snapshot = Snapshot::open("dump.hprof")?;
//! let dominators = snapshot.dominators()?;
//! println!("{} reachable objects", dominators.len());
//! # Ok::<(), hprof_snapshot::HprofError>(())
//! ```

use getset::CopyGetters;
use nom::bytes::complete as bytes;
use nom::number::complete as number;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt::{Error, Formatter};
use std::{cmp, fmt};
use strum_macros::EnumIter;

pub mod analysis;
pub mod buffer;
mod elements;
mod error;
pub mod heap_dump;
mod parser;
pub mod snapshot;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_fixtures;

use buffer::{Cursor, HprofBuffer};
pub use elements::{Decode, Elements};
pub use error::HprofError;

#[derive(CopyGetters, Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Id {
    // inflate 4-byte ids to 8-byte since if we have a small 32-bit heap, no worries about memory anyway
    #[get_copy = "pub"]
    id: u64,
}

impl From<u64> for Id {
    fn from(id: u64) -> Self {
        Id { id }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.id)
    }
}

impl fmt::UpperHex for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        fmt::UpperHex::fmt(&self.id, f)
    }
}

impl fmt::LowerHex for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        fmt::LowerHex::fmt(&self.id, f)
    }
}

pub type Serial = u32;

/// Width of every object, class and string identifier in a dump, fixed by the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSize {
    U32,
    U64,
}

impl IdSize {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            IdSize::U32 => 4,
            IdSize::U64 => 8,
        }
    }
}

impl TryFrom<u32> for IdSize {
    type Error = HprofError;

    fn try_from(num: u32) -> Result<Self, Self::Error> {
        match num {
            4 => Ok(IdSize::U32),
            8 => Ok(IdSize::U64),
            _ => Err(HprofError::UnsupportedIdSize(num)),
        }
    }
}

// https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp

/// Labels are short; anything without a NUL in this many bytes is not an hprof.
const MAX_LABEL_LEN: u64 = 64;

const LABEL_PREFIX: &str = "JAVA PROFILE ";

const SUPPORTED_VERSIONS: [&str; 3] = ["1.0.1", "1.0.2", "1.0.3"];

#[derive(CopyGetters, Clone)]
pub struct Header {
    label: String,
    #[get_copy = "pub"]
    id_size: IdSize,
    /// The timestamp for the hprof as the number of millis since epoch
    #[get_copy = "pub"]
    timestamp_millis: u64,
    /// Offset of the first record, i.e. the encoded size of the header
    #[get_copy = "pub"]
    records_offset: u64,
}

impl Header {
    /// e.g. `JAVA PROFILE 1.0.3`
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read and validate the header at the start of `buffer`.
    pub fn read(buffer: &dyn HprofBuffer) -> Result<Header, HprofError> {
        // label, NUL, u4 id size, u4 + u4 timestamp
        let prefix_len = cmp::min(buffer.len(), MAX_LABEL_LEN + 1 + 12);
        let prefix = buffer.slice_at(0, prefix_len as usize)?;

        let (rest, (label, id_size_num, timestamp_millis)) =
            Header::parse(&prefix).map_err(|e| HprofError::from_nom(0, "file header", e))?;

        let label = String::from_utf8_lossy(label).into_owned();
        let version = match label.strip_prefix(LABEL_PREFIX) {
            Some(v) => v,
            None => {
                return Err(HprofError::format(
                    0,
                    format!("unrecognized format label {:?}", label),
                ))
            }
        };
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(HprofError::format(
                0,
                format!("unsupported hprof version {:?}", version),
            ));
        }

        Ok(Header {
            label,
            id_size: IdSize::try_from(id_size_num)?,
            timestamp_millis,
            records_offset: (prefix.len() - rest.len()) as u64,
        })
    }

    fn parse(input: &[u8]) -> nom::IResult<&[u8], (&[u8], u32, u64)> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L63
        let (input, label) = bytes::take_until(&b"\0"[..])(input)?;
        let (input, _) = bytes::take_while_m_n(1, 1, |b| b == 0)(input)?;

        let (input, id_size_num) = number::be_u32(input)?;
        let (input, epoch_hi) = number::be_u32(input)?;
        let (input, epoch_lo) = number::be_u32(input)?;

        let epoch_timestamp = ((epoch_hi as u64) << 32) + (epoch_lo as u64);

        Ok((input, (label, id_size_num, epoch_timestamp)))
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_struct("Header")
            .field("label", &self.label())
            .field("timestamp_millis", &self.timestamp_millis())
            .field("id_size", &self.id_size())
            .finish()
    }
}

/// Walks the top level `{tag, micros, length, body}` records after the header.
///
/// Bodies are not read; each item says where its body lives so callers can decode only the
/// records they care about. Iteration stops after the first error.
pub struct Records<'b> {
    cursor: Cursor<'b>,
    failed: bool,
}

impl<'b> Records<'b> {
    pub fn new(buffer: &'b dyn HprofBuffer, header: &Header) -> Records<'b> {
        Records {
            cursor: Cursor::at(buffer, header.records_offset()),
            failed: false,
        }
    }

    fn read_record(&mut self) -> Result<Record, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L76
        let record_offset = self.cursor.position();
        let tag_byte = self.cursor.read_u8()?;
        let micros = self.cursor.read_u32()?;
        let body_len = self.cursor.read_u32()?;
        let body_offset = self.cursor.position();

        if (body_len as u64) > self.cursor.remaining() {
            return Err(HprofError::OutOfBounds {
                offset: body_offset,
                len: body_len as u64,
                limit: body_offset + self.cursor.remaining(),
            });
        }
        self.cursor.skip(body_len as u64)?;

        Ok(Record {
            tag_byte,
            micros_since_header_ts: micros,
            record_offset,
            body_offset,
            body_len,
        })
    }
}

impl<'b> Iterator for Records<'b> {
    type Item = Result<Record, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.cursor.has_remaining() {
            return None;
        }

        let res = self.read_record();
        if res.is_err() {
            self.failed = true;
        }
        Some(res)
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct Record {
    #[get_copy = "pub"]
    tag_byte: u8,
    #[get_copy = "pub"]
    micros_since_header_ts: u32,
    /// Where the record's tag byte is
    #[get_copy = "pub"]
    record_offset: u64,
    #[get_copy = "pub"]
    body_offset: u64,
    #[get_copy = "pub"]
    body_len: u32,
}

impl Record {
    /// `None` for tags this crate doesn't know; those records are still well framed and can be
    /// skipped.
    pub fn tag(&self) -> Option<RecordTag> {
        RecordTag::from_tag_byte(self.tag_byte)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Hash, EnumIter)]
pub enum RecordTag {
    Utf8,
    LoadClass,
    UnloadClass,
    StackFrame,
    StackTrace,
    AllocSites,
    StartThread,
    EndThread,
    HeapSummary,
    HeapDump,
    CpuSamples,
    ControlSettings,
    HeapDumpSegment,
    HeapDumpEnd,
}

impl RecordTag {
    pub fn from_tag_byte(tag_byte: u8) -> Option<RecordTag> {
        match tag_byte {
            0x01 => Some(RecordTag::Utf8),
            0x02 => Some(RecordTag::LoadClass),
            0x03 => Some(RecordTag::UnloadClass),
            0x04 => Some(RecordTag::StackFrame),
            0x05 => Some(RecordTag::StackTrace),
            0x06 => Some(RecordTag::AllocSites),
            0x07 => Some(RecordTag::HeapSummary),
            0x0A => Some(RecordTag::StartThread),
            0x0B => Some(RecordTag::EndThread),
            0x0C => Some(RecordTag::HeapDump),
            0x0D => Some(RecordTag::CpuSamples),
            0x0E => Some(RecordTag::ControlSettings),
            0x1C => Some(RecordTag::HeapDumpSegment),
            0x2C => Some(RecordTag::HeapDumpEnd),
            _ => None,
        }
    }

    pub fn tag_byte(&self) -> u8 {
        match self {
            RecordTag::Utf8 => 0x01,
            RecordTag::LoadClass => 0x02,
            RecordTag::UnloadClass => 0x03,
            RecordTag::StackFrame => 0x04,
            RecordTag::StackTrace => 0x05,
            RecordTag::AllocSites => 0x06,
            RecordTag::HeapSummary => 0x07,
            RecordTag::StartThread => 0x0A,
            RecordTag::EndThread => 0x0B,
            RecordTag::HeapDump => 0x0C,
            RecordTag::CpuSamples => 0x0D,
            RecordTag::ControlSettings => 0x0E,
            RecordTag::HeapDumpSegment => 0x1C,
            RecordTag::HeapDumpEnd => 0x2C,
        }
    }
}

impl cmp::Ord for RecordTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag_byte().cmp(&other.tag_byte())
    }
}

#[derive(CopyGetters, Copy, Clone)]
pub struct Utf8<'a> {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    text: &'a [u8],
}

impl<'a> Utf8<'a> {
    pub fn parse(input: &[u8], id_size: IdSize) -> ParseResult<Utf8> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L88
        let (input, id) = Id::decode(input, id_size)?;

        Ok(Utf8 {
            name_id: id,
            text: input,
        })
    }

    /// Note that in practice, there are nonzero Utf8 records with invalid UTF-8 bytes.
    pub fn text_as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.text)
    }

    /// Decodes the modified UTF-8 the VM writes (NUL as `C0 80`), replacing anything invalid.
    pub fn text_lossy(&self) -> String {
        if !self.text.windows(2).any(|w| w == [0xC0, 0x80]) {
            return String::from_utf8_lossy(self.text).into_owned();
        }

        let mut fixed = Vec::with_capacity(self.text.len());
        let mut i = 0;
        while i < self.text.len() {
            if self.text[i] == 0xC0 && self.text.get(i + 1) == Some(&0x80) {
                fixed.push(0);
                i += 2;
            } else {
                fixed.push(self.text[i]);
                i += 1;
            }
        }

        String::from_utf8_lossy(&fixed).into_owned()
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct LoadClass {
    #[get_copy = "pub"]
    class_serial: Serial,
    #[get_copy = "pub"]
    class_obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    class_name_id: Id,
}

impl LoadClass {
    pub fn parse(input: &[u8], id_size: IdSize) -> ParseResult<LoadClass> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L93
        let (input, class_serial) = number::be_u32(input)?;
        let (input, class_obj_id) = Id::decode(input, id_size)?;
        let (input, stack_trace_serial) = number::be_u32(input)?;
        let (_input, class_name_id) = Id::decode(input, id_size)?;

        Ok(LoadClass {
            class_serial,
            class_obj_id,
            stack_trace_serial,
            class_name_id,
        })
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct UnloadClass {
    #[get_copy = "pub"]
    class_serial: Serial,
}

impl UnloadClass {
    pub fn parse(input: &[u8]) -> ParseResult<UnloadClass> {
        let (_input, class_serial) = number::be_u32(input)?;

        Ok(UnloadClass { class_serial })
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct StackFrame {
    #[get_copy = "pub"]
    id: Id,
    #[get_copy = "pub"]
    method_name_id: Id,
    #[get_copy = "pub"]
    method_signature_id: Id,
    #[get_copy = "pub"]
    source_file_name_id: Id,
    #[get_copy = "pub"]
    class_serial: Serial,
    #[get_copy = "pub"]
    line_num: LineNum,
}

impl StackFrame {
    pub fn parse(input: &[u8], id_size: IdSize) -> ParseResult<Self> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L104
        let (input, id) = Id::decode(input, id_size)?;
        let (input, method_name_id) = Id::decode(input, id_size)?;
        let (input, method_signature_id) = Id::decode(input, id_size)?;
        let (input, source_file_name_id) = Id::decode(input, id_size)?;
        let (input, class_serial) = number::be_u32(input)?;
        let (_input, line_num) = LineNum::parse(input)?;

        Ok(StackFrame {
            id,
            method_name_id,
            method_signature_id,
            source_file_name_id,
            class_serial,
            line_num,
        })
    }
}

#[derive(CopyGetters, Clone)]
pub struct StackTrace<'a> {
    id_size: IdSize,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    thread_serial: Serial,
    #[get_copy = "pub"]
    num_frame_ids: u32,
    frame_ids: &'a [u8],
}

impl<'a> StackTrace<'a> {
    pub fn parse(input: &[u8], id_size: IdSize) -> ParseResult<StackTrace> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L116
        let (input, stack_trace_serial) = number::be_u32(input)?;
        let (input, thread_serial) = number::be_u32(input)?;
        let (input, num_frame_ids) = number::be_u32(input)?;
        let (_input, frame_ids) =
            bytes::take(num_frame_ids as usize * id_size.size_in_bytes())(input)?;

        Ok(StackTrace {
            id_size,
            stack_trace_serial,
            thread_serial,
            num_frame_ids,
            frame_ids,
        })
    }

    pub fn frame_ids(&self) -> Ids {
        Ids {
            iter: Elements::new(self.frame_ids, self.num_frame_ids, self.id_size),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineNum {
    Normal(u32),
    Unknown,
    CompiledMethod,
    NativeMethod,
}

impl LineNum {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L111
        let (input, num) = number::be_i32(input)?;

        Ok((
            input,
            match num {
                // ART writes 0 for frames without line info
                num if num >= 0 => LineNum::Normal(num as u32),
                -2 => LineNum::CompiledMethod,
                -3 => LineNum::NativeMethod,
                _ => LineNum::Unknown,
            },
        ))
    }
}

impl fmt::Display for LineNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            LineNum::Normal(n) => write!(f, "{}", n),
            LineNum::Unknown => write!(f, "Unknown"),
            LineNum::CompiledMethod => write!(f, "CompiledMethod"),
            LineNum::NativeMethod => write!(f, "NativeMethod"),
        }
    }
}

pub struct Ids<'a> {
    iter: Elements<'a, Id>,
}

impl<'a> Iterator for Ids<'a> {
    type Item = ParseResult<'a, Id>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

pub type ParseResult<'e, T> = Result<T, nom::Err<(&'e [u8], nom::error::ErrorKind)>>;
