use crate::buffer::Cursor;
use crate::heap_dump::FieldType;
use crate::{Elements, HprofError, Id, IdSize, ParseResult, Serial};
use getset::CopyGetters;

/// A PRIMITIVE_ARRAY_DUMP, or ART's PRIMITIVE_ARRAY_NODATA which has the same header but no
/// element bytes.
#[derive(CopyGetters, Copy, Clone, Debug, PartialEq)]
pub struct PrimitiveArray {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    primitive_type: PrimitiveArrayType,
    #[get_copy = "pub"]
    num_elements: u32,
    /// Where the elements start in the file; `None` when the dump omitted them
    #[get_copy = "pub"]
    contents_offset: Option<u64>,
}

impl PrimitiveArray {
    pub(crate) fn read(
        cursor: &mut Cursor,
        id_size: IdSize,
        with_contents: bool,
    ) -> Result<PrimitiveArray, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L279
        let obj_id = cursor.read_id(id_size)?;
        let stack_trace_serial = cursor.read_u32()?;
        let num_elements = cursor.read_u32()?;
        let type_offset = cursor.position();
        let type_byte = cursor.read_u8()?;

        let primitive_type = PrimitiveArrayType::from_type_code(type_byte).ok_or_else(|| {
            HprofError::format(
                type_offset,
                format!("unexpected primitive array type {:#04X}", type_byte),
            )
        })?;

        let contents_offset = if with_contents {
            let offset = cursor.position();
            cursor.skip(num_elements as u64 * primitive_type.size_in_bytes() as u64)?;
            Some(offset)
        } else {
            None
        };

        Ok(PrimitiveArray {
            obj_id,
            stack_trace_serial,
            primitive_type,
            num_elements,
            contents_offset,
        })
    }

    pub fn contents_len(&self) -> u64 {
        self.num_elements as u64 * self.primitive_type.size_in_bytes() as u64
    }
}

/// The elements of a primitive array, read from the array's contents.
///
/// Methods for accessing the contents always return Some for the method matching the array type
/// and None otherwise (e.g. if it's a PrimitiveArrayType::Float, floats() will always be Some).
#[derive(CopyGetters)]
pub struct PrimitiveArrayContents<'a> {
    #[get_copy = "pub"]
    primitive_type: PrimitiveArrayType,
    #[get_copy = "pub"]
    num_elements: u32,
    contents: &'a [u8],
}

macro_rules! iterator_method {
    ($method_name:tt, $type_variant:tt, $iter_struct:tt) => {
        pub fn $method_name(&self) -> Option<$iter_struct> {
            match self.primitive_type {
                PrimitiveArrayType::$type_variant => Some($iter_struct {
                    iter: Elements::new(self.contents, self.num_elements, ()),
                }),
                _ => None,
            }
        }
    };
}

impl<'a> PrimitiveArrayContents<'a> {
    /// `contents` must hold at least `num_elements` elements; shorter contents make the
    /// iterators yield a parse error at the first missing element.
    pub fn new(
        primitive_type: PrimitiveArrayType,
        num_elements: u32,
        contents: &'a [u8],
    ) -> PrimitiveArrayContents<'a> {
        PrimitiveArrayContents {
            primitive_type,
            num_elements,
            contents,
        }
    }

    iterator_method!(booleans, Boolean, Booleans);
    iterator_method!(chars, Char, Chars);
    iterator_method!(floats, Float, Floats);
    iterator_method!(doubles, Double, Doubles);
    iterator_method!(bytes, Byte, Bytes);
    iterator_method!(shorts, Short, Shorts);
    iterator_method!(ints, Int, Ints);
    iterator_method!(longs, Long, Longs);
}

macro_rules! iter_struct {
    ($struct_name:ident, $item_type:ty) => {
        pub struct $struct_name<'a> {
            iter: Elements<'a, $item_type>,
        }

        impl<'a> Iterator for $struct_name<'a> {
            type Item = ParseResult<'a, $item_type>;

            fn next(&mut self) -> Option<Self::Item> {
                self.iter.next()
            }
        }
    };
}

iter_struct!(Booleans, bool);
iter_struct!(Chars, u16);
iter_struct!(Floats, f32);
iter_struct!(Doubles, f64);
iter_struct!(Bytes, i8);
iter_struct!(Shorts, i16);
iter_struct!(Ints, i32);
iter_struct!(Longs, i64);

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum PrimitiveArrayType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl PrimitiveArrayType {
    pub fn from_type_code(code: u8) -> Option<PrimitiveArrayType> {
        match code {
            0x04 => Some(PrimitiveArrayType::Boolean),
            0x05 => Some(PrimitiveArrayType::Char),
            0x06 => Some(PrimitiveArrayType::Float),
            0x07 => Some(PrimitiveArrayType::Double),
            0x08 => Some(PrimitiveArrayType::Byte),
            0x09 => Some(PrimitiveArrayType::Short),
            0x0A => Some(PrimitiveArrayType::Int),
            0x0B => Some(PrimitiveArrayType::Long),
            _ => None,
        }
    }

    pub fn type_code(&self) -> u8 {
        match self {
            PrimitiveArrayType::Boolean => 0x04,
            PrimitiveArrayType::Char => 0x05,
            PrimitiveArrayType::Float => 0x06,
            PrimitiveArrayType::Double => 0x07,
            PrimitiveArrayType::Byte => 0x08,
            PrimitiveArrayType::Short => 0x09,
            PrimitiveArrayType::Int => 0x0A,
            PrimitiveArrayType::Long => 0x0B,
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        match self {
            PrimitiveArrayType::Boolean | PrimitiveArrayType::Byte => 1,
            PrimitiveArrayType::Char | PrimitiveArrayType::Short => 2,
            PrimitiveArrayType::Float | PrimitiveArrayType::Int => 4,
            PrimitiveArrayType::Double | PrimitiveArrayType::Long => 8,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            PrimitiveArrayType::Boolean => FieldType::Boolean,
            PrimitiveArrayType::Char => FieldType::Char,
            PrimitiveArrayType::Float => FieldType::Float,
            PrimitiveArrayType::Double => FieldType::Double,
            PrimitiveArrayType::Byte => FieldType::Byte,
            PrimitiveArrayType::Short => FieldType::Short,
            PrimitiveArrayType::Int => FieldType::Int,
            PrimitiveArrayType::Long => FieldType::Long,
        }
    }

    pub fn java_type_name(&self) -> &'static str {
        match self {
            PrimitiveArrayType::Boolean => "boolean",
            PrimitiveArrayType::Char => "char",
            PrimitiveArrayType::Float => "float",
            PrimitiveArrayType::Double => "double",
            PrimitiveArrayType::Byte => "byte",
            PrimitiveArrayType::Short => "short",
            PrimitiveArrayType::Int => "int",
            PrimitiveArrayType::Long => "long",
        }
    }

    /// JVM descriptor character, as used in array class names like `[I`
    pub fn descriptor(&self) -> char {
        match self {
            PrimitiveArrayType::Boolean => 'Z',
            PrimitiveArrayType::Char => 'C',
            PrimitiveArrayType::Float => 'F',
            PrimitiveArrayType::Double => 'D',
            PrimitiveArrayType::Byte => 'B',
            PrimitiveArrayType::Short => 'S',
            PrimitiveArrayType::Int => 'I',
            PrimitiveArrayType::Long => 'J',
        }
    }

    /// The names dumps use for this array's class: `int[]` (Android) and `[I` (JVM).
    pub fn array_class_names(&self) -> [String; 2] {
        [
            format!("{}[]", self.java_type_name()),
            format!("[{}", self.descriptor()),
        ]
    }
}
