//! Topological sort over object dependency graphs.

use indexmap::IndexMap;

use crate::error::{DbError, Result};

/// Order nodes so that every prerequisite appears before its dependents.
///
/// The input maps each node to the list of nodes it depends on. Nodes that
/// appear only as prerequisites are treated as roots with no dependencies.
/// Ties are broken FIFO over the map's insertion order, which makes the
/// result deterministic for a given input.
pub fn topological_sort(deps: &IndexMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut graph: IndexMap<&str, Vec<&str>> = IndexMap::new();
    let mut in_degree: IndexMap<&str, usize> = IndexMap::new();

    for (child, parents) in deps {
        for parent in parents {
            graph.entry(parent.as_str()).or_default().push(child.as_str());
            *in_degree.entry(child.as_str()).or_insert(0) += 1;
            in_degree.entry(parent.as_str()).or_insert(0);
        }
        in_degree.entry(child.as_str()).or_insert(0);
    }

    let mut queue: std::collections::VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut sorted = Vec::with_capacity(in_degree.len());

    while let Some(node) = queue.pop_front() {
        sorted.push(node.to_string());
        if let Some(children) = graph.get(node) {
            for child in children {
                let degree = in_degree.get_mut(child).expect("child is registered");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if sorted.len() != in_degree.len() {
        return Err(DbError::CycleDetected);
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(pairs: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(node, parents)| {
                (
                    node.to_string(),
                    parents.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn diamond_sorts_prerequisites_first() {
        let deps = graph(&[
            ("A", &["B", "C"]),
            ("B", &["D"]),
            ("C", &["D"]),
            ("D", &[]),
        ]);
        assert_eq!(topological_sort(&deps).unwrap(), vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn implicit_roots_are_emitted() {
        // B never appears as a key; it is a prerequisite defined elsewhere.
        let deps = graph(&[("A", &["B"])]);
        assert_eq!(topological_sort(&deps).unwrap(), vec!["B", "A"]);
    }

    #[test]
    fn every_node_appears_after_its_prerequisites() {
        let deps = graph(&[
            ("orders", &["users", "products"]),
            ("order_items", &["orders", "products"]),
            ("users", &[]),
            ("products", &[]),
        ]);
        let sorted = topological_sort(&deps).unwrap();
        assert_eq!(sorted.len(), 4);
        let position =
            |name: &str| sorted.iter().position(|n| n == name).unwrap();
        assert!(position("users") < position("orders"));
        assert!(position("products") < position("orders"));
        assert!(position("orders") < position("order_items"));
    }

    #[test]
    fn cycle_is_detected() {
        let deps = graph(&[("A", &["B"]), ("B", &["A"])]);
        assert!(matches!(
            topological_sort(&deps),
            Err(DbError::CycleDetected)
        ));
    }

    #[test]
    fn empty_graph_sorts_to_empty() {
        let deps = IndexMap::new();
        assert!(topological_sort(&deps).unwrap().is_empty());
    }
}
