use crate::heap_dump::PrimitiveArrayType;
use crate::snapshot::ClassObj;
use crate::{Id, IdSize, Serial};
use getset::CopyGetters;

/// An object in a heap that isn't a class: a plain instance or an array.
#[derive(Clone, Debug, PartialEq)]
pub enum Instance {
    Class(ClassInstance),
    Array(ArrayInstance),
}

impl Instance {
    pub fn id(&self) -> Id {
        match self {
            Instance::Class(i) => i.id(),
            Instance::Array(a) => a.id(),
        }
    }

    /// `None` for primitive arrays whose class isn't in the dump.
    pub fn class_id(&self) -> Option<Id> {
        match self {
            Instance::Class(i) => Some(i.class_id()),
            Instance::Array(a) => a.class_id(),
        }
    }

    pub fn heap_id(&self) -> u32 {
        match self {
            Instance::Class(i) => i.heap_id(),
            Instance::Array(a) => a.heap_id(),
        }
    }

    pub fn stack_trace_serial(&self) -> Serial {
        match self {
            Instance::Class(i) => i.stack_trace_serial(),
            Instance::Array(a) => a.stack_trace_serial(),
        }
    }

    pub fn as_class_instance(&self) -> Option<&ClassInstance> {
        match self {
            Instance::Class(i) => Some(i),
            Instance::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayInstance> {
        match self {
            Instance::Class(_) => None,
            Instance::Array(a) => Some(a),
        }
    }
}

/// An instance of a (non-array) class. Field values stay in the dump until asked for.
#[derive(CopyGetters, Clone, Debug, PartialEq)]
pub struct ClassInstance {
    #[get_copy = "pub"]
    id: Id,
    #[get_copy = "pub"]
    class_id: Id,
    #[get_copy = "pub"]
    heap_id: u32,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    /// Where the field value blob starts in the dump
    #[get_copy = "pub"]
    fields_offset: u64,
    #[get_copy = "pub"]
    fields_len: u32,
}

impl ClassInstance {
    pub(crate) fn new(
        id: Id,
        class_id: Id,
        heap_id: u32,
        stack_trace_serial: Serial,
        fields_offset: u64,
        fields_len: u32,
    ) -> ClassInstance {
        ClassInstance {
            id,
            class_id,
            heap_id,
            stack_trace_serial,
            fields_offset,
            fields_len,
        }
    }

    /// The class's declared instance size, or the blob length when the class is missing.
    pub fn size(&self, class: Option<&ClassObj>) -> u64 {
        class
            .map(|c| c.instance_size() as u64)
            .unwrap_or(self.fields_len as u64)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArrayType {
    Object,
    Primitive(PrimitiveArrayType),
}

impl ArrayType {
    pub fn element_size(&self, id_size: IdSize) -> usize {
        match self {
            ArrayType::Object => id_size.size_in_bytes(),
            ArrayType::Primitive(p) => p.size_in_bytes(),
        }
    }
}

#[derive(CopyGetters, Clone, Debug, PartialEq)]
pub struct ArrayInstance {
    #[get_copy = "pub"]
    id: Id,
    #[get_copy = "pub"]
    array_type: ArrayType,
    /// Declared by object array dumps; for primitive arrays, the `int[]` / `[I` style class
    /// when the dump has one
    #[get_copy = "pub"]
    class_id: Option<Id>,
    #[get_copy = "pub"]
    heap_id: u32,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    num_elements: u32,
    /// Where the elements start in the dump; `None` when the dump left them out
    #[get_copy = "pub"]
    contents_offset: Option<u64>,
}

impl ArrayInstance {
    pub(crate) fn new(
        id: Id,
        array_type: ArrayType,
        class_id: Option<Id>,
        heap_id: u32,
        stack_trace_serial: Serial,
        num_elements: u32,
        contents_offset: Option<u64>,
    ) -> ArrayInstance {
        ArrayInstance {
            id,
            array_type,
            class_id,
            heap_id,
            stack_trace_serial,
            num_elements,
            contents_offset,
        }
    }

    pub fn size(&self, id_size: IdSize) -> u64 {
        self.num_elements as u64 * self.array_type.element_size(id_size) as u64
    }

    pub(crate) fn set_class_id(&mut self, class_id: Id) {
        self.class_id = Some(class_id);
    }
}

/// Anything an id can resolve to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HeapObject<'s> {
    Class(&'s ClassObj),
    Instance(&'s Instance),
}

impl<'s> HeapObject<'s> {
    pub fn id(&self) -> Id {
        match self {
            HeapObject::Class(c) => c.id(),
            HeapObject::Instance(i) => i.id(),
        }
    }

    pub fn heap_id(&self) -> u32 {
        match self {
            HeapObject::Class(c) => c.heap_id(),
            HeapObject::Instance(i) => i.heap_id(),
        }
    }

    pub fn as_class(&self) -> Option<&'s ClassObj> {
        match self {
            HeapObject::Class(c) => Some(c),
            HeapObject::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&'s Instance> {
        match self {
            HeapObject::Class(_) => None,
            HeapObject::Instance(i) => Some(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_sizes_follow_element_type() {
        let ints = ArrayInstance::new(
            Id::from(1),
            ArrayType::Primitive(PrimitiveArrayType::Int),
            None,
            0,
            0,
            10,
            None,
        );
        let objects = ArrayInstance::new(Id::from(2), ArrayType::Object, None, 0, 0, 10, Some(0));

        assert_eq!(40, ints.size(IdSize::U64));
        assert_eq!(40, objects.size(IdSize::U32));
        assert_eq!(80, objects.size(IdSize::U64));
    }

    #[test]
    fn instance_size_falls_back_to_blob() {
        let i = ClassInstance::new(Id::from(1), Id::from(2), 0, 0, 100, 24);

        assert_eq!(24, i.size(None));
        assert_eq!(Some(Id::from(2)), Instance::Class(i).class_id());
    }
}
