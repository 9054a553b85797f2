use crate::analysis::{Dominator, DominatorMap};
use crate::snapshot::Snapshot;
use crate::{HprofError, Id};
use log::debug;
use std::collections;

/// Bytes kept alive by each reachable object: its own shallow size plus that of everything it
/// dominates. Also split by the heap the dominated objects live in.
#[derive(Clone, Debug, PartialEq)]
pub struct RetainedSizes {
    heap_count: usize,
    /// Indexed by position in [Snapshot::heaps]
    by_object: collections::HashMap<Id, Vec<u64>>,
    /// What the super-root retains, i.e. everything reachable
    root: Vec<u64>,
}

impl RetainedSizes {
    /// `None` for objects that aren't reachable.
    pub fn retained_size(&self, id: Id) -> Option<u64> {
        self.by_object.get(&id).map(|sizes| sizes.iter().sum())
    }

    /// The part of `id`'s retained size made of objects in the heap at `heap_index`.
    pub fn retained_size_in_heap(&self, id: Id, heap_index: usize) -> Option<u64> {
        self.by_object
            .get(&id)
            .map(|sizes| sizes.get(heap_index).copied().unwrap_or(0))
    }

    /// Shallow size of everything reachable.
    pub fn total(&self) -> u64 {
        self.root.iter().sum()
    }

    pub fn total_in_heap(&self, heap_index: usize) -> u64 {
        self.root.get(heap_index).copied().unwrap_or(0)
    }

    pub fn heap_count(&self) -> usize {
        self.heap_count
    }
}

/// Visits nodes so that everything a node dominates is finished before it, then adds each node's
/// total to its immediate dominator.
pub fn compute_retained_sizes(
    snapshot: &Snapshot,
    dominators: &DominatorMap,
) -> Result<RetainedSizes, HprofError> {
    let heap_count = snapshot.heaps().len();
    let mut by_object = collections::HashMap::with_capacity(dominators.len());

    for &id in dominators.reachable() {
        let mut sizes = vec![0; heap_count];
        if let (Some(object), Some(heap)) = (snapshot.resolve(id), snapshot.heap_index_of(id)) {
            sizes[heap] = snapshot.shallow_size(object);
        }
        by_object.insert(id, sizes);
    }

    let mut root = vec![0; heap_count];
    for &id in dominators.reachable().iter().rev() {
        let sizes = match by_object.get(&id) {
            Some(s) => s.clone(),
            None => continue,
        };
        let target = match dominators.immediate_dominator(id) {
            Some(Dominator::Object(parent)) => match by_object.get_mut(&parent) {
                Some(t) => t,
                None => continue,
            },
            Some(Dominator::Root) => &mut root,
            None => continue,
        };
        for (total, size) in target.iter_mut().zip(sizes) {
            *total += size;
        }
    }

    debug!(
        "{} bytes retained by {} reachable objects",
        root.iter().sum::<u64>(),
        dominators.len()
    );

    Ok(RetainedSizes {
        heap_count,
        by_object,
        root,
    })
}
