use std::collections::{BTreeSet, HashMap};

#[cfg(test)]
mod tests;

/// Index of a property within its [`ModelType`](crate::ModelType).
///
/// Ordering follows declaration order, state properties first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyId {
    State(usize),
    Computed(usize),
}

/// Bidirectional dependency index of one model instance.
///
/// For each computed property, the properties it read during its last evaluation;
/// for each property, the computed properties that read it.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    dependencies: HashMap<usize, BTreeSet<PropertyId>>,
    dependents: HashMap<PropertyId, BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `computed` read `property`.
    pub fn track(&mut self, computed: usize, property: PropertyId) {
        self.dependencies
            .entry(computed)
            .or_default()
            .insert(property);
        self.dependents.entry(property).or_default().insert(computed);
    }

    /// Removes every outgoing edge of `computed` before it is evaluated again.
    pub fn clear_dependencies(&mut self, computed: usize) {
        let Some(dependencies) = self.dependencies.remove(&computed) else {
            return;
        };
        for property in dependencies {
            if let Some(dependents) = self.dependents.get_mut(&property) {
                dependents.remove(&computed);
                if dependents.is_empty() {
                    self.dependents.remove(&property);
                }
            }
        }
    }

    /// Returns a copy of the computed properties that depend on `property`.
    ///
    /// The copy allows the graph to be rebuilt while the dependents are recomputed.
    pub fn dependents(&self, property: PropertyId) -> Vec<usize> {
        self.dependents
            .get(&property)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
    pub fn dependencies(&self, computed: usize) -> Vec<PropertyId> {
        self.dependencies
            .get(&computed)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
}
