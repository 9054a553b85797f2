use crate::buffer::{check_bounds, BufferOptions, HprofBuffer};
use crate::HprofError;
use std::borrow::Cow;
use std::{cmp, fs};

/// The whole file in one mapping.
pub struct SimpleMappedBuffer {
    map: memmap::Mmap,
}

impl SimpleMappedBuffer {
    pub fn new(file: &fs::File) -> Result<SimpleMappedBuffer, HprofError> {
        // the file is treated as immutable for the lifetime of the mapping
        let map =
            unsafe { memmap::MmapOptions::new().map(file) }.map_err(|e| HprofError::io(0, e))?;

        Ok(SimpleMappedBuffer { map })
    }
}

impl HprofBuffer for SimpleMappedBuffer {
    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn slice_at(&self, position: u64, len: usize) -> Result<Cow<'_, [u8]>, HprofError> {
        check_bounds(position, len, self.len())?;
        let start = position as usize;
        Ok(Cow::Borrowed(&self.map[start..start + len]))
    }
}

/// One mapping per `shard_size` bytes, each running `shard_padding` bytes into the next.
///
/// Shard `i` covers `[i * shard_size, min(len, (i + 1) * shard_size + shard_padding))`.
pub struct MultiMappedBuffer {
    shards: Vec<memmap::Mmap>,
    shard_size: u64,
    len: u64,
}

impl MultiMappedBuffer {
    pub fn new(
        file: &fs::File,
        len: u64,
        options: BufferOptions,
    ) -> Result<MultiMappedBuffer, HprofError> {
        let shard_size = options.shard_size().max(1);
        let mut shards = Vec::with_capacity((len / shard_size + 1) as usize);

        let mut start = 0;
        while start < len {
            let shard_len = cmp::min(shard_size + options.shard_padding(), len - start);
            let map = unsafe {
                memmap::MmapOptions::new()
                    .offset(start)
                    .len(shard_len as usize)
                    .map(file)
            }
            .map_err(|e| HprofError::io(start, e))?;

            shards.push(map);
            start += shard_size;
        }

        Ok(MultiMappedBuffer {
            shards,
            shard_size,
            len,
        })
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, position: u64) -> (&memmap::Mmap, usize) {
        let index = (position / self.shard_size) as usize;
        let within = (position % self.shard_size) as usize;
        (&self.shards[index], within)
    }
}

impl HprofBuffer for MultiMappedBuffer {
    fn len(&self) -> u64 {
        self.len
    }

    fn slice_at(&self, position: u64, len: usize) -> Result<Cow<'_, [u8]>, HprofError> {
        check_bounds(position, len, self.len)?;
        if len == 0 {
            return Ok(Cow::Borrowed(&[]));
        }

        let (shard, within) = self.shard_for(position);
        if within + len <= shard.len() {
            return Ok(Cow::Borrowed(&shard[within..within + len]));
        }

        // straddles a boundary: stitch together the unpadded part of each shard touched
        let mut scratch = Vec::with_capacity(len);
        let mut pos = position;
        while scratch.len() < len {
            let (shard, within) = self.shard_for(pos);
            let take = cmp::min(len - scratch.len(), self.shard_size as usize - within);
            scratch.extend_from_slice(&shard[within..within + take]);
            pos += take as u64;
        }

        Ok(Cow::Owned(scratch))
    }
}
