use std::collections::{BTreeMap, HashMap};

use crate::ServiceSpec;

/// Service name to the names it depends on.
///
/// Built once from the loaded services and never mutated afterwards. A
/// dependency name without an entry of its own is a leaf: it has no further
/// dependencies but still shows up in the topological order when reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_services<'a, I>(services: I) -> Self
    where
        I: IntoIterator<Item = &'a ServiceSpec>,
    {
        services
            .into_iter()
            .map(|spec| (spec.name.clone(), spec.deps.clone()))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, deps: Vec<String>) {
        self.edges.insert(name.into(), deps);
    }

    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn is_cyclic(&self) -> bool {
        self.walk().is_err()
    }

    /// Orders services so every dependency precedes its dependents.
    ///
    /// Fails with [`crate::Error::CyclicDependency`] naming the service at
    /// which a back edge was found.
    pub fn top_sort(&self) -> crate::Result<Vec<String>> {
        self.walk().map_err(crate::Error::CyclicDependency)
    }

    // Postorder DFS with an explicit stack of (node, next dependency index).
    // Reaching a node that is still being visited means a back edge.
    fn walk(&self) -> Result<Vec<String>, String> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.edges.len());
        let mut order = Vec::with_capacity(self.edges.len());
        let mark_of = |marks: &HashMap<&str, Mark>, node: &str| {
            marks.get(node).copied().unwrap_or(Mark::Unvisited)
        };

        for root in self.nodes() {
            if mark_of(&marks, root) != Mark::Unvisited {
                continue;
            }

            marks.insert(root, Mark::Visiting);
            let mut stack: Vec<(&str, usize)> = vec![(root, 0)];

            while let Some(&(node, next)) = stack.last() {
                match self.dependencies(node).get(next) {
                    Some(dep) => {
                        if let Some(top) = stack.last_mut() {
                            top.1 += 1;
                        }
                        match mark_of(&marks, dep) {
                            Mark::Visiting => return Err(dep.clone()),
                            Mark::Visited => {}
                            Mark::Unvisited => {
                                marks.insert(dep.as_str(), Mark::Visiting);
                                stack.push((dep.as_str(), 0));
                            }
                        }
                    }
                    None => {
                        marks.insert(node, Mark::Visited);
                        order.push(node.to_string());
                        stack.pop();
                    }
                }
            }
        }

        Ok(order)
    }
}

impl FromIterator<(String, Vec<String>)> for DependencyGraph {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}
