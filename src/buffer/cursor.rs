use crate::buffer::HprofBuffer;
use crate::{HprofError, Id, IdSize};
use std::borrow::Cow;

/// A big-endian reader over a shared [HprofBuffer] with its own position.
///
/// Many cursors can read the same buffer at once; each just tracks where it is.
#[derive(Clone, Copy)]
pub struct Cursor<'b> {
    buffer: &'b dyn HprofBuffer,
    position: u64,
}

impl<'b> Cursor<'b> {
    pub fn new(buffer: &'b dyn HprofBuffer) -> Cursor<'b> {
        Cursor::at(buffer, 0)
    }

    pub fn at(buffer: &'b dyn HprofBuffer, position: u64) -> Cursor<'b> {
        Cursor { buffer, position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Positions past the end are allowed; the next read fails.
    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    pub fn remaining(&self) -> u64 {
        self.buffer.len().saturating_sub(self.position)
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn skip(&mut self, len: u64) -> Result<(), HprofError> {
        if len > self.remaining() {
            return Err(HprofError::OutOfBounds {
                offset: self.position,
                len,
                limit: self.buffer.len(),
            });
        }
        self.position += len;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Cow<'b, [u8]>, HprofError> {
        let bytes = self.buffer.slice_at(self.position, len)?;
        self.position += len as u64;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], HprofError> {
        let mut array = [0_u8; N];
        self.buffer.read_at(self.position, &mut array)?;
        self.position += N as u64;
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8, HprofError> {
        self.read_array::<1>().map(|a| a[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, HprofError> {
        self.read_array::<1>().map(i8::from_be_bytes)
    }

    pub fn read_bool(&mut self) -> Result<bool, HprofError> {
        self.read_u8().map(|b| b != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, HprofError> {
        self.read_array::<2>().map(u16::from_be_bytes)
    }

    /// A Java `char`: one UTF-16 code unit.
    pub fn read_char(&mut self) -> Result<u16, HprofError> {
        self.read_u16()
    }

    pub fn read_i16(&mut self) -> Result<i16, HprofError> {
        self.read_array::<2>().map(i16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, HprofError> {
        self.read_array::<4>().map(u32::from_be_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, HprofError> {
        self.read_array::<4>().map(i32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, HprofError> {
        self.read_array::<8>().map(u64::from_be_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, HprofError> {
        self.read_array::<8>().map(i64::from_be_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, HprofError> {
        self.read_u32().map(f32::from_bits)
    }

    pub fn read_f64(&mut self) -> Result<f64, HprofError> {
        self.read_u64().map(f64::from_bits)
    }

    pub fn read_id(&mut self, id_size: IdSize) -> Result<Id, HprofError> {
        match id_size {
            IdSize::U32 => self.read_u32().map(|id| Id::from(id as u64)),
            IdSize::U64 => self.read_u64().map(Id::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryBuffer;

    #[test]
    fn reads_big_endian_and_advances() {
        let mut bytes = vec![
            0x01, 0x02, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x2A, 0x3F, 0x80, 0x00, 0x00, 0x80,
        ];
        bytes.extend_from_slice(&[0x00, 0x41, 0x01]);
        bytes.extend_from_slice(&(-3_i64).to_be_bytes());
        bytes.extend_from_slice(&2.5_f64.to_be_bytes());
        let buffer = MemoryBuffer::new(bytes);
        let mut cursor = Cursor::new(&buffer);

        assert_eq!(0x0102, cursor.read_u16().unwrap());
        assert_eq!(-2, cursor.read_i16().unwrap());
        assert_eq!(42, cursor.read_u32().unwrap());
        assert_eq!(1.0, cursor.read_f32().unwrap());
        assert_eq!(-128, cursor.read_i8().unwrap());
        assert_eq!(13, cursor.position());
        assert_eq!(u16::from(b'A'), cursor.read_char().unwrap());
        assert!(cursor.read_bool().unwrap());
        assert_eq!(16, cursor.remaining());
        assert_eq!(-3, cursor.read_i64().unwrap());
        assert_eq!(2.5, cursor.read_f64().unwrap());
        assert_eq!(32, cursor.position());
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn ids_follow_id_size() {
        let buffer = MemoryBuffer::new(vec![0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0, 9]);
        let mut cursor = Cursor::new(&buffer);

        assert_eq!(Id::from(7), cursor.read_id(IdSize::U32).unwrap());
        assert_eq!(Id::from(9), cursor.read_id(IdSize::U64).unwrap());
    }

    #[test]
    fn read_past_end_fails_without_moving() {
        let buffer = MemoryBuffer::new(vec![0, 0, 0]);
        let mut cursor = Cursor::at(&buffer, 1);

        match cursor.read_u32() {
            Err(HprofError::OutOfBounds { offset: 1, .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(1, cursor.position());
        assert!(cursor.skip(3).is_err());
        cursor.skip(2).unwrap();
        assert_eq!(0, cursor.remaining());
    }

    #[test]
    fn cursors_are_independent() {
        let buffer = MemoryBuffer::new((0..16).collect());
        let mut a = Cursor::new(&buffer);
        let mut b = Cursor::at(&buffer, 8);

        assert_eq!(0, a.read_u8().unwrap());
        assert_eq!(8, b.read_u8().unwrap());
        assert_eq!(1, a.read_u8().unwrap());
        assert_eq!(&[9, 10][..], &*b.read_bytes(2).unwrap());
    }
}
