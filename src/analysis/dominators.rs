use crate::analysis::topological_sort::Traversal;
use crate::analysis::ReferenceGraph;
use crate::{HprofError, Id};
use log::debug;
use std::collections;
use std::fmt;

/// What immediately dominates a reachable object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dominator {
    /// The synthetic super-root above all GC roots
    Root,
    Object(Id),
}

impl fmt::Display for Dominator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dominator::Root => write!(f, "root"),
            Dominator::Object(id) => write!(f, "{:#x}", id),
        }
    }
}

/// Immediate dominators of everything reachable from a graph's roots.
///
/// Exactly the reachable nodes have an entry. Following [DominatorMap::immediate_dominator]
/// from any of them reaches [Dominator::Root] in finitely many steps, whatever cycles the graph
/// has.
#[derive(Clone, Debug, PartialEq)]
pub struct DominatorMap {
    order: Vec<Id>,
    idoms: collections::HashMap<Id, Dominator>,
    children: collections::HashMap<Dominator, Vec<Id>>,
}

impl DominatorMap {
    pub fn immediate_dominator(&self, id: Id) -> Option<Dominator> {
        self.idoms.get(&id).copied()
    }

    /// Number of reachable nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.idoms.contains_key(&id)
    }

    /// Reachable nodes in topological order; every node comes after its immediate dominator.
    pub fn reachable(&self) -> &[Id] {
        &self.order
    }

    /// Nodes whose immediate dominator is `dominator`, i.e. its children in the dominator tree.
    pub fn dominated_by(&self, dominator: Dominator) -> &[Id] {
        self.children
            .get(&dominator)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Dominators of `id` from the immediate one up to [Dominator::Root]. Empty if `id` isn't
    /// reachable.
    pub fn dominator_chain(&self, id: Id) -> Vec<Dominator> {
        let mut chain = Vec::new();
        let mut current = self.immediate_dominator(id);
        while let Some(d) = current {
            chain.push(d);
            current = match d {
                Dominator::Root => None,
                Dominator::Object(parent) => self.immediate_dominator(parent),
            };
        }
        chain
    }
}

const UNDEFINED: usize = usize::MAX;

/// Cooper, Harvey and Kennedy's "A Simple, Fast Dominance Algorithm": iterate over the nodes in
/// reverse postorder, setting each node's dominator to the nearest common dominator of its
/// already processed predecessors, until nothing changes.
pub fn compute_dominators<G: ReferenceGraph + ?Sized>(
    graph: &G,
) -> Result<DominatorMap, HprofError> {
    let traversal = Traversal::run(graph)?;
    let node_count = traversal.postorder.len();

    // 0 is the super-root; reachable nodes are 1..=node_count in reverse postorder
    let mut number_of_slot = vec![0; traversal.ids.len()];
    for (i, &slot) in traversal.postorder.iter().rev().enumerate() {
        number_of_slot[slot] = i + 1;
    }

    let mut predecessors = vec![Vec::new(); node_count + 1];
    for &(from, to) in &traversal.edges {
        let from = from.map_or(0, |slot| number_of_slot[slot]);
        predecessors[number_of_slot[to]].push(from);
    }

    let mut idom = vec![UNDEFINED; node_count + 1];
    idom[0] = 0;

    let mut iterations = 0;
    let mut changed = true;
    while changed {
        changed = false;
        iterations += 1;

        for node in 1..=node_count {
            let mut new_idom = UNDEFINED;
            for &p in &predecessors[node] {
                if idom[p] == UNDEFINED {
                    continue;
                }
                new_idom = if new_idom == UNDEFINED {
                    p
                } else {
                    intersect(&idom, p, new_idom)
                };
            }

            // the predecessor that discovered this node always precedes it
            debug_assert_ne!(UNDEFINED, new_idom, "node {} has no processed predecessor", node);
            if idom[node] != new_idom {
                idom[node] = new_idom;
                changed = true;
            }
        }
    }

    debug!(
        "Dominators of {} nodes converged after {} iterations",
        node_count, iterations
    );

    let order = traversal
        .postorder
        .iter()
        .rev()
        .map(|&slot| traversal.ids[slot])
        .collect::<Vec<_>>();

    let mut idoms = collections::HashMap::with_capacity(node_count);
    let mut children: collections::HashMap<Dominator, Vec<Id>> = collections::HashMap::new();
    for (i, &id) in order.iter().enumerate() {
        let dominator = match idom[i + 1] {
            0 => Dominator::Root,
            n => Dominator::Object(order[n - 1]),
        };
        idoms.insert(id, dominator);
        children.entry(dominator).or_insert_with(Vec::new).push(id);
    }

    Ok(DominatorMap {
        order,
        idoms,
        children,
    })
}

/// Nearest common ancestor of `a` and `b` in the dominator tree built so far. Dominators always
/// have lower numbers than what they dominate.
fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a];
        }
        while b > a {
            b = idom[b];
        }
    }
    a
}
