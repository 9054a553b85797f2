use crate::snapshot::{HeapObject, Snapshot};
use crate::{HprofError, Id};
use std::collections;

/// Callbacks for [walk].
pub trait Visitor {
    /// Called the first time an object is reached. Return false to not descend into its
    /// references.
    fn visit_enter(&mut self, object: HeapObject) -> bool;

    /// Called once everything reachable through an entered object has been visited.
    fn visit_leave(&mut self, _object: HeapObject) {}
}

/// Depth first traversal of the reference graph from `starts`, visiting each object once.
///
/// Cycles are fine: an object already entered is never entered again. Ids that don't resolve
/// are skipped. Uses an explicit stack, so deep object chains don't overflow.
pub fn walk<V, I>(snapshot: &Snapshot, starts: I, visitor: &mut V) -> Result<(), HprofError>
where
    V: Visitor + ?Sized,
    I: IntoIterator<Item = Id>,
{
    let mut visited = collections::HashSet::new();
    // (object, its references if it was entered, next reference to look at)
    let mut stack: Vec<(HeapObject, Vec<Id>, usize)> = Vec::new();

    for start in starts {
        enter(snapshot, start, visitor, &mut visited, &mut stack)?;

        while let Some((object, refs, next)) = stack.last_mut() {
            if *next < refs.len() {
                let child = refs[*next];
                *next += 1;
                enter(snapshot, child, visitor, &mut visited, &mut stack)?;
            } else {
                visitor.visit_leave(*object);
                stack.pop();
            }
        }
    }

    Ok(())
}

fn enter<'s, V: Visitor + ?Sized>(
    snapshot: &'s Snapshot,
    id: Id,
    visitor: &mut V,
    visited: &mut collections::HashSet<Id>,
    stack: &mut Vec<(HeapObject<'s>, Vec<Id>, usize)>,
) -> Result<(), HprofError> {
    let object = match snapshot.resolve(id) {
        Some(o) => o,
        None => return Ok(()),
    };
    if !visited.insert(id) {
        return Ok(());
    }

    if visitor.visit_enter(object) {
        stack.push((object, snapshot.references(id)?, 0));
    }
    Ok(())
}

impl Snapshot {
    /// [walk] from every GC root.
    pub fn walk_from_roots<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), HprofError> {
        let roots = self.gc_roots().map(|r| r.obj_id()).collect::<Vec<_>>();
        walk(self, roots, visitor)
    }
}
