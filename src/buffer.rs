//! Random access to the bytes of a dump, whether held in memory or mapped from disk.
//!
//! Dumps can be far larger than a single mapping should be, so big files are mapped as a
//! series of overlapping shards. Reads that fit in one shard borrow from it; reads that straddle
//! a shard boundary are copied. Either way callers see the same bytes for the same range.

use crate::HprofError;
use getset::CopyGetters;
use log::debug;
use std::borrow::Cow;
use std::{fs, path};

mod cursor;
mod mapped;

pub use cursor::Cursor;
pub use mapped::{MultiMappedBuffer, SimpleMappedBuffer};

/// Positional reads over a dump. All positions are absolute file offsets.
pub trait HprofBuffer: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `len` bytes at `position`, borrowed where possible.
    fn slice_at(&self, position: u64, len: usize) -> Result<Cow<'_, [u8]>, HprofError>;

    /// Fill `dst` with the bytes at `position`.
    fn read_at(&self, position: u64, dst: &mut [u8]) -> Result<(), HprofError> {
        let src = self.slice_at(position, dst.len())?;
        dst.copy_from_slice(&src);
        Ok(())
    }
}

pub(crate) fn check_bounds(position: u64, len: usize, limit: u64) -> Result<(), HprofError> {
    match position.checked_add(len as u64) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(HprofError::OutOfBounds {
            offset: position,
            len: len as u64,
            limit,
        }),
    }
}

/// A dump already in memory, e.g. one generated for a test or received over the network.
pub struct MemoryBuffer {
    bytes: Vec<u8>,
}

impl MemoryBuffer {
    pub fn new(bytes: Vec<u8>) -> MemoryBuffer {
        MemoryBuffer { bytes }
    }
}

impl HprofBuffer for MemoryBuffer {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn slice_at(&self, position: u64, len: usize) -> Result<Cow<'_, [u8]>, HprofError> {
        check_bounds(position, len, self.len())?;
        let start = position as usize;
        Ok(Cow::Borrowed(&self.bytes[start..start + len]))
    }
}

/// How a file is mapped.
#[derive(CopyGetters, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferOptions {
    /// Files no bigger than this are mapped in one piece. Larger files get one mapping per
    /// `shard_size` bytes.
    #[get_copy = "pub"]
    shard_size: u64,
    /// Each shard maps this many bytes past its nominal end so small reads near a boundary can
    /// still borrow.
    #[get_copy = "pub"]
    shard_padding: u64,
}

impl BufferOptions {
    /// Values of 0 are raised to 1.
    pub fn with_shard_size(mut self, shard_size: u64) -> BufferOptions {
        self.shard_size = shard_size.max(1);
        self
    }

    pub fn with_shard_padding(mut self, shard_padding: u64) -> BufferOptions {
        self.shard_padding = shard_padding;
        self
    }
}

impl Default for BufferOptions {
    fn default() -> Self {
        BufferOptions {
            shard_size: 1 << 30,
            shard_padding: 1024,
        }
    }
}

/// Map the file at `path` as a single mapping or as shards, depending on its size.
pub fn open_file<P: AsRef<path::Path>>(
    path: P,
    options: BufferOptions,
) -> Result<Box<dyn HprofBuffer>, HprofError> {
    let file = fs::File::open(path.as_ref()).map_err(|e| HprofError::io(0, e))?;
    let len = file.metadata().map_err(|e| HprofError::io(0, e))?.len();

    // zero length mappings are rejected by the OS; an empty buffer fails header parsing instead
    if len == 0 {
        return Ok(Box::new(MemoryBuffer::new(Vec::new())));
    }

    if len <= options.shard_size() {
        debug!("Mapping {} bytes from {:?}", len, path.as_ref());
        Ok(Box::new(SimpleMappedBuffer::new(&file)?))
    } else {
        debug!(
            "Mapping {} bytes from {:?} in shards of {}",
            len,
            path.as_ref(),
            options.shard_size()
        );
        Ok(Box::new(MultiMappedBuffer::new(&file, len, options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_buffer_bounds() {
        let buffer = MemoryBuffer::new(vec![1, 2, 3, 4]);

        assert_eq!(&[2, 3][..], &*buffer.slice_at(1, 2).unwrap());
        assert_eq!(0, buffer.slice_at(4, 0).unwrap().len());

        match buffer.slice_at(3, 2) {
            Err(HprofError::OutOfBounds {
                offset: 3,
                len: 2,
                limit: 4,
            }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn overflowing_position_is_out_of_bounds() {
        let buffer = MemoryBuffer::new(vec![0; 8]);

        assert!(buffer.slice_at(u64::MAX, 2).is_err());
    }

    #[test]
    fn empty_file_opens_as_empty_buffer() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let buffer = open_file(file.path(), BufferOptions::default()).unwrap();

        assert!(buffer.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();

        match open_file(dir.path().join("nope.hprof"), BufferOptions::default()) {
            Err(HprofError::Io { .. }) => {}
            Err(e) => panic!("unexpected {:?}", e),
            Ok(_) => panic!("opened a missing file"),
        }
    }

    #[test]
    fn zero_shard_size_is_raised() {
        assert_eq!(1, BufferOptions::default().with_shard_size(0).shard_size());
    }
}
