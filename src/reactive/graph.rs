//! Dependency graph parsed from `["cell_<id>"]` / `['cell_<id>']`
//! references in cell source.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::result_key;
use crate::project::Cell;

/// Those of `ids` whose exact `["cell_<id>"]` or `['cell_<id>']` subscript
/// appears in `code`.
pub fn references(code: &str, ids: impl IntoIterator<Item = i64>) -> BTreeSet<i64> {
    ids.into_iter()
        .filter(|id| {
            let key = result_key(*id);
            code.contains(&format!("[\"{key}\"]")) || code.contains(&format!("['{key}']"))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Cell ids in project order.
    order: Vec<i64>,
    /// id -> ids it reads from, restricted to cells in the project.
    upstream: HashMap<i64, BTreeSet<i64>>,
}

impl DependencyGraph {
    /// Build from backend cells. Self references are ignored.
    pub fn from_cells(cells: &[Cell]) -> Self {
        let backend: Vec<&Cell> = cells.iter().filter(|c| c.is_backend()).collect();
        let known: HashSet<i64> = backend.iter().map(|c| c.id).collect();
        let mut graph = Self::default();
        for cell in backend {
            let deps = references(&cell.code, known.iter().copied())
                .into_iter()
                .filter(|id| *id != cell.id)
                .collect();
            graph.order.push(cell.id);
            graph.upstream.insert(cell.id, deps);
        }
        graph
    }

    pub fn upstream(&self, id: i64) -> Option<&BTreeSet<i64>> {
        self.upstream.get(&id)
    }

    /// Cells that read `id` directly, in project order.
    pub fn dependents(&self, id: i64) -> Vec<i64> {
        self.order
            .iter()
            .copied()
            .filter(|c| self.upstream.get(c).is_some_and(|deps| deps.contains(&id)))
            .collect()
    }

    /// A dependency cycle as a closed path (`[a, b, a]`), if any exists.
    pub fn find_cycle(&self) -> Option<Vec<i64>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            id: i64,
            marks: &mut HashMap<i64, Mark>,
            path: &mut Vec<i64>,
        ) -> Option<Vec<i64>> {
            match marks.get(&id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|p| *p == id).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(id);
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            path.push(id);
            if let Some(deps) = graph.upstream.get(&id) {
                for dep in deps {
                    if let Some(cycle) = visit(graph, *dep, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(id, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        for id in &self.order {
            let mut path = Vec::new();
            if let Some(cycle) = visit(self, *id, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    /// Every transitive dependent of `root`, ordered so each cell comes after
    /// all of its upstream cells within the set. Cells caught in a cycle are
    /// appended in project order instead of being revisited.
    pub fn downstream_order(&self, root: i64) -> Vec<i64> {
        let mut reached = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for dep in self.dependents(id) {
                if dep != root && reached.insert(dep) {
                    stack.push(dep);
                }
            }
        }

        // Kahn over the reached subgraph, seeded in project order.
        let mut indegree: HashMap<i64, usize> = reached
            .iter()
            .map(|id| {
                let n = self.upstream[id].iter().filter(|u| reached.contains(u)).count();
                (*id, n)
            })
            .collect();
        let mut ordered = Vec::with_capacity(reached.len());
        let mut progressed = true;
        while progressed {
            progressed = false;
            for id in &self.order {
                if indegree.get(id) == Some(&0) {
                    indegree.remove(id);
                    ordered.push(*id);
                    for dep in self.dependents(*id) {
                        if let Some(n) = indegree.get_mut(&dep) {
                            *n = n.saturating_sub(1);
                        }
                    }
                    progressed = true;
                }
            }
        }
        ordered.extend(self.order.iter().filter(|id| indegree.contains_key(id)));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{CellKind, Language};

    fn cell(id: i64, code: &str) -> Cell {
        Cell::backend(id, Language::Javascript, "", code)
    }

    #[test]
    fn test_references_both_quote_styles() {
        let code = r#"results["cell_1"] + results['cell_22'] + cell_3 + ["cell_x"]"#;
        let refs = references(code, [1, 2, 3, 22]);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![1, 22]);
    }

    #[test]
    fn test_references_match_the_exact_key() {
        // a padded id is a different key
        assert!(references(r#"results["cell_01"]"#, [1]).is_empty());
        assert!(references(r#"results["cell_12"]"#, [1]).is_empty());
        let refs = references(r#"results["cell_-1"]"#, [-1, 1]);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![-1]);
    }

    #[test]
    fn test_negative_ids_form_edges() {
        let graph = DependencyGraph::from_cells(&[cell(-1, "1"), cell(2, r#"results['cell_-1']"#)]);
        assert_eq!(graph.dependents(-1), vec![2]);
    }

    #[test]
    fn test_dependents_ignore_self_and_unknown() {
        let cells = vec![
            cell(1, "return 1"),
            cell(2, r#"results["cell_1"]"#),
            cell(3, r#"results["cell_3"] + results["cell_9"]"#),
            cell(4, r#"results['cell_1']"#),
        ];
        let graph = DependencyGraph::from_cells(&cells);
        assert_eq!(graph.dependents(1), vec![2, 4]);
        assert!(graph.dependents(3).is_empty());
        assert!(graph.upstream(3).unwrap().is_empty());
    }

    #[test]
    fn test_frontend_cells_are_not_in_graph() {
        let mut ui = cell(2, r#"results["cell_1"]"#);
        ui.kind = CellKind::Frontend;
        let graph = DependencyGraph::from_cells(&[cell(1, "1"), ui]);
        assert!(graph.dependents(1).is_empty());
    }

    #[test]
    fn test_find_cycle() {
        let acyclic = DependencyGraph::from_cells(&[cell(1, "1"), cell(2, r#"results["cell_1"]"#)]);
        assert_eq!(acyclic.find_cycle(), None);

        let cyclic = DependencyGraph::from_cells(&[
            cell(1, r#"results["cell_2"]"#),
            cell(2, r#"results["cell_3"]"#),
            cell(3, r#"results["cell_1"]"#),
        ]);
        assert_eq!(cyclic.find_cycle(), Some(vec![1, 2, 3, 1]));
    }

    #[test]
    fn test_downstream_order_is_topological() {
        // 1 -> 2 -> 4, 1 -> 3 -> 4, listed with 4 first
        let cells = vec![
            cell(4, r#"results["cell_2"] + results["cell_3"]"#),
            cell(3, r#"results["cell_1"]"#),
            cell(2, r#"results["cell_1"]"#),
            cell(1, "1"),
            cell(5, "unrelated"),
        ];
        let graph = DependencyGraph::from_cells(&cells);
        assert_eq!(graph.downstream_order(1), vec![3, 2, 4]);
        assert_eq!(graph.downstream_order(2), vec![4]);
        assert!(graph.downstream_order(5).is_empty());
    }

    #[test]
    fn test_downstream_order_terminates_on_cycles() {
        let graph = DependencyGraph::from_cells(&[
            cell(1, r#"results["cell_2"]"#),
            cell(2, r#"results["cell_1"]"#),
        ]);
        assert_eq!(graph.downstream_order(1), vec![2]);
    }
}
