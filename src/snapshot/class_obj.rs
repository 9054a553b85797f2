use crate::heap_dump::{FieldType, FieldValue};
use crate::{Id, IdSize, Serial};
use getset::{CopyGetters, Getters};
use std::cmp::Ordering;
use std::fmt;

/// A field declared by a class: its name and type.
#[derive(Getters, CopyGetters, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    #[get = "pub"]
    name: String,
    #[get_copy = "pub"]
    field_type: FieldType,
}

impl Field {
    pub fn new(name: String, field_type: FieldType) -> Field {
        Field { name, field_type }
    }
}

#[derive(Getters, CopyGetters, Clone, Debug, PartialEq)]
pub struct StaticField {
    #[get = "pub"]
    field: Field,
    #[get_copy = "pub"]
    value: FieldValue,
}

impl StaticField {
    pub(crate) fn new(field: Field, value: FieldValue) -> StaticField {
        StaticField { field, value }
    }
}

/// Where one field lives in an instance's field blob.
#[derive(Getters, CopyGetters, Clone, Debug, PartialEq)]
pub struct LayoutField {
    #[get = "pub"]
    field: Field,
    /// Byte offset from the start of the blob
    #[get_copy = "pub"]
    offset: usize,
    /// The class in the hierarchy that declares the field
    #[get_copy = "pub"]
    declaring_class_id: Id,
}

impl LayoutField {
    pub(crate) fn new(field: Field, offset: usize, declaring_class_id: Id) -> LayoutField {
        LayoutField {
            field,
            offset,
            declaring_class_id,
        }
    }
}

/// A loaded class.
///
/// Superclass, subclasses and instances are ids to look up in the
/// [Snapshot](crate::snapshot::Snapshot), not owned objects.
///
/// Classes compare and order by name only, so sorting a class list gives stable output across
/// dumps where ids differ.
#[derive(Getters, CopyGetters, Clone, Debug)]
pub struct ClassObj {
    #[get_copy = "pub"]
    id: Id,
    /// Internal form as written in the dump, e.g. `java/lang/String` or `[I`
    #[get = "pub"]
    name: String,
    #[get_copy = "pub"]
    heap_id: u32,
    #[get_copy = "pub"]
    super_class_id: Option<Id>,
    #[get_copy = "pub"]
    class_loader_id: Option<Id>,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    /// As declared in the dump: the size of the field blob of each instance, inherited fields
    /// included
    #[get_copy = "pub"]
    instance_size: u32,
    /// Instance fields declared by this class, not its superclasses
    #[get = "pub"]
    fields: Vec<Field>,
    #[get = "pub"]
    static_fields: Vec<StaticField>,
    #[get = "pub"]
    instances: Vec<Id>,
    #[get = "pub"]
    subclasses: Vec<Id>,
}

impl ClassObj {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Id,
        name: String,
        heap_id: u32,
        super_class_id: Option<Id>,
        class_loader_id: Option<Id>,
        stack_trace_serial: Serial,
        instance_size: u32,
        fields: Vec<Field>,
        static_fields: Vec<StaticField>,
    ) -> ClassObj {
        ClassObj {
            id,
            name,
            heap_id,
            super_class_id,
            class_loader_id,
            stack_trace_serial,
            instance_size,
            fields,
            static_fields,
            instances: Vec::new(),
            subclasses: Vec::new(),
        }
    }

    /// Name in source form: `java.lang.String`
    pub fn display_name(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn static_field(&self, name: &str) -> Option<&StaticField> {
        self.static_fields.iter().find(|s| s.field().name() == name)
    }

    /// Bytes the static values occupy; used as the shallow size of the class object.
    pub fn static_fields_size(&self, id_size: IdSize) -> u64 {
        self.static_fields
            .iter()
            .map(|s| s.field().field_type().size_in_bytes(id_size) as u64)
            .sum()
    }

    pub(crate) fn add_instance(&mut self, id: Id) {
        self.instances.push(id);
    }

    pub(crate) fn add_subclass(&mut self, id: Id) {
        self.subclasses.push(id);
    }
}

impl fmt::Display for ClassObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl PartialEq for ClassObj {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassObj {}

impl PartialOrd for ClassObj {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassObj {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: u64, name: &str) -> ClassObj {
        ClassObj::new(
            Id::from(id),
            name.to_owned(),
            0,
            None,
            None,
            0,
            0,
            Vec::new(),
            vec![
                StaticField::new(
                    Field::new("a".to_owned(), FieldType::ObjectId),
                    FieldValue::ObjectId(None),
                ),
                StaticField::new(
                    Field::new("b".to_owned(), FieldType::Long),
                    FieldValue::Long(1),
                ),
            ],
        )
    }

    #[test]
    fn ordered_and_equal_by_name() {
        let mut classes = vec![class(3, "b/C"), class(1, "a/B"), class(2, "a/A")];
        classes.sort();

        assert_eq!(
            vec!["a/A", "a/B", "b/C"],
            classes.iter().map(|c| c.name().as_str()).collect::<Vec<_>>()
        );
        assert_eq!(class(10, "x/Y"), class(11, "x/Y"));
        assert_ne!(class(10, "x/Y"), class(10, "x/Z"));
    }

    #[test]
    fn static_lookup_and_size() {
        let c = class(1, "java/lang/Thread");

        assert_eq!("java.lang.Thread", c.to_string());
        assert_eq!(FieldValue::Long(1), c.static_field("b").unwrap().value());
        assert!(c.static_field("nope").is_none());
        assert_eq!(12, c.static_fields_size(IdSize::U32));
    }
}
