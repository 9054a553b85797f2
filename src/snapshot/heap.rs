use crate::heap_dump::GcRoot;
use crate::snapshot::{ClassObj, Instance};
use getset::{CopyGetters, Getters};

/// Android heap ids, as written by HEAP_DUMP_INFO
pub const DEFAULT_HEAP_ID: u32 = 0;
pub const APP_HEAP_ID: u32 = b'A' as u32;
pub const IMAGE_HEAP_ID: u32 = b'I' as u32;
pub const ZYGOTE_HEAP_ID: u32 = b'Z' as u32;

/// A named partition of the dump. JVM dumps have just the default heap.
#[derive(Getters, CopyGetters, Debug)]
pub struct Heap {
    #[get_copy = "pub"]
    id: u32,
    #[get = "pub"]
    name: String,
    #[get = "pub"]
    classes: Vec<ClassObj>,
    #[get = "pub"]
    instances: Vec<Instance>,
    /// Roots declared while this heap was current
    #[get = "pub"]
    roots: Vec<GcRoot>,
}

impl Heap {
    pub(crate) fn new(id: u32, name: String) -> Heap {
        Heap {
            id,
            name,
            classes: Vec::new(),
            instances: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// The name ART uses for a well known heap id.
    pub fn default_name(id: u32) -> String {
        match id {
            DEFAULT_HEAP_ID => "default".to_owned(),
            APP_HEAP_ID => "app".to_owned(),
            IMAGE_HEAP_ID => "image".to_owned(),
            ZYGOTE_HEAP_ID => "zygote".to_owned(),
            _ => format!("heap-{}", id),
        }
    }

    pub(crate) fn push_class(&mut self, class: ClassObj) {
        self.classes.push(class);
    }

    pub(crate) fn push_instance(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    pub(crate) fn push_root(&mut self, root: GcRoot) {
        self.roots.push(root);
    }

    pub(crate) fn class_mut(&mut self, slot: usize) -> &mut ClassObj {
        &mut self.classes[slot]
    }

    pub(crate) fn instance_mut(&mut self, slot: usize) -> &mut Instance {
        &mut self.instances[slot]
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
