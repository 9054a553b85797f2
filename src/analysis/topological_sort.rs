use crate::analysis::ReferenceGraph;
use crate::{HprofError, Id};
use std::collections;

/// A depth first traversal from the super-root. Nodes are numbered by discovery ("slots").
pub(crate) struct Traversal {
    /// Node id by slot
    pub(crate) ids: Vec<Id>,
    /// Slots in the order their traversal finished
    pub(crate) postorder: Vec<usize>,
    /// Every edge seen, as (from slot, to slot). `None` is the super-root.
    pub(crate) edges: Vec<(Option<usize>, usize)>,
}

impl Traversal {
    /// Visits each reachable node once. An explicit stack keeps long reference chains off the call
    /// stack.
    pub(crate) fn run<G: ReferenceGraph + ?Sized>(graph: &G) -> Result<Traversal, HprofError> {
        let mut slots = collections::HashMap::new();
        let mut traversal = Traversal {
            ids: Vec::new(),
            postorder: Vec::new(),
            edges: Vec::new(),
        };
        // (slot, successors, next successor to look at)
        let mut stack: Vec<(usize, Vec<Id>, usize)> = Vec::new();

        for root in graph.roots() {
            let (root_slot, is_new) = traversal.discover(&mut slots, root);
            traversal.edges.push((None, root_slot));
            if !is_new {
                continue;
            }
            stack.push((root_slot, successors(graph, root)?, 0));

            while let Some((slot, succs, next)) = stack.last_mut() {
                if *next < succs.len() {
                    let child = succs[*next];
                    *next += 1;
                    let from = *slot;

                    let (child_slot, is_new) = traversal.discover(&mut slots, child);
                    traversal.edges.push((Some(from), child_slot));
                    if is_new {
                        stack.push((child_slot, successors(graph, child)?, 0));
                    }
                } else {
                    traversal.postorder.push(*slot);
                    stack.pop();
                }
            }
        }

        Ok(traversal)
    }

    fn discover(&mut self, slots: &mut collections::HashMap<Id, usize>, id: Id) -> (usize, bool) {
        match slots.get(&id) {
            Some(&slot) => (slot, false),
            None => {
                let slot = self.ids.len();
                self.ids.push(id);
                slots.insert(id, slot);
                (slot, true)
            }
        }
    }
}

fn successors<G: ReferenceGraph + ?Sized>(graph: &G, node: Id) -> Result<Vec<Id>, HprofError> {
    let mut out = Vec::new();
    graph.successors(node, &mut out)?;
    Ok(out)
}

/// Every node reachable from the roots in reverse postorder: each node comes before everything
/// reachable from it, except along back edges of cycles.
pub fn topological_sort<G: ReferenceGraph + ?Sized>(graph: &G) -> Result<Vec<Id>, HprofError> {
    let traversal = Traversal::run(graph)?;
    Ok(traversal
        .postorder
        .iter()
        .rev()
        .map(|&slot| traversal.ids[slot])
        .collect())
}
