use crate::{IdSize, ParseResult};
use nom::number::complete as number;
use std::marker;

/// A fixed width value that can be decoded from the front of a slice.
///
/// `Context` is whatever the width depends on: the dump's [IdSize] for ids, nothing for Java
/// primitives.
pub trait Decode: Sized {
    type Context: Copy;

    fn decode(input: &[u8], context: Self::Context) -> nom::IResult<&[u8], Self>;
}

/// Decodes `count` consecutive values from a slice, e.g. the frame ids of a stack trace or the
/// elements of an array.
///
/// Yields at most one error, then stops.
pub struct Elements<'a, T: Decode> {
    context: T::Context,
    input: &'a [u8],
    count: u32,
    phantom: marker::PhantomData<T>,
}

impl<'a, T: Decode> Elements<'a, T> {
    pub fn new(input: &'a [u8], count: u32, context: T::Context) -> Elements<'a, T> {
        Elements {
            context,
            input,
            count,
            phantom: marker::PhantomData,
        }
    }
}

impl<'a, T: Decode> Iterator for Elements<'a, T> {
    type Item = ParseResult<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count == 0 {
            return None;
        }

        match T::decode(self.input, self.context) {
            Ok((rest, value)) => {
                self.input = rest;
                self.count -= 1;
                Some(Ok(value))
            }
            Err(e) => {
                self.count = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.count as usize))
    }
}

impl Decode for bool {
    type Context = ();

    fn decode(input: &[u8], _: ()) -> nom::IResult<&[u8], bool> {
        number::be_u8(input).map(|(input, b)| (input, b != 0))
    }
}

macro_rules! decode_primitive {
    ($prim_type:ty, $parser:ident) => {
        impl Decode for $prim_type {
            type Context = ();

            fn decode(input: &[u8], _: ()) -> nom::IResult<&[u8], $prim_type> {
                number::$parser(input)
            }
        }
    };
}

decode_primitive!(u16, be_u16);
decode_primitive!(f32, be_f32);
decode_primitive!(f64, be_f64);
decode_primitive!(i8, be_i8);
decode_primitive!(i16, be_i16);
decode_primitive!(i32, be_i32);
decode_primitive!(i64, be_i64);

impl Decode for crate::Id {
    type Context = IdSize;

    fn decode(input: &[u8], id_size: IdSize) -> nom::IResult<&[u8], Self> {
        let (input, id) = match id_size {
            IdSize::U32 => number::be_u32(input).map(|(i, id)| (i, id as u64))?,
            IdSize::U64 => number::be_u64(input)?,
        };

        Ok((input, crate::Id::from(id)))
    }
}
