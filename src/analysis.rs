//! Reachability analysis over the reference graph: ordering, dominators and retained sizes.
//!
//! The graph is rooted at a synthetic super-root whose children are the GC roots, so objects
//! reachable from several unrelated roots are dominated by [Dominator::Root].

use crate::snapshot::Snapshot;
use crate::{HprofError, Id};
use std::collections;

mod dominators;
mod retained;
mod topological_sort;

pub use dominators::*;
pub use retained::*;
pub use topological_sort::*;

/// A directed graph of objects with a set of roots.
pub trait ReferenceGraph {
    /// Children of the super-root. Duplicates are allowed.
    fn roots(&self) -> Vec<Id>;

    /// Append the outgoing edges of `node` to `out`.
    fn successors(&self, node: Id, out: &mut Vec<Id>) -> Result<(), HprofError>;
}

impl ReferenceGraph for Snapshot {
    /// Every object referenced by a GC root that the dump contains, in the order the roots were
    /// read, each once.
    fn roots(&self) -> Vec<Id> {
        let mut seen = collections::HashSet::new();
        self.gc_roots()
            .map(|r| r.obj_id())
            .filter(|id| self.contains(*id) && seen.insert(*id))
            .collect()
    }

    fn successors(&self, node: Id, out: &mut Vec<Id>) -> Result<(), HprofError> {
        self.collect_references(node, out)
    }
}
