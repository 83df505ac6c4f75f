use std::collections::HashMap;

use serde::Serialize;


/// Property changes coalesced over one synchronous segment.
///
/// For each changed property, holds the value before its first change in the batch
/// and the value after its latest change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch<V> {
    old_values: HashMap<String, V>,
    new_values: HashMap<String, V>,
    property_names: Vec<String>,
}

impl<V> ChangeBatch<V> {
    pub fn new() -> Self {
        Self {
            old_values: HashMap::new(),
            new_values: HashMap::new(),
            property_names: Vec::new(),
        }
    }

    pub fn record(&mut self, property: &str, old_value: V, new_value: V) {
        if !self.old_values.contains_key(property) {
            self.old_values.insert(property.to_owned(), old_value);
            self.property_names.push(property.to_owned());
        }
        self.new_values.insert(property.to_owned(), new_value);
    }

    /// Names of the changed properties, in order of their first change.
    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }
    pub fn contains(&self, property: &str) -> bool {
        self.old_values.contains_key(property)
    }
    pub fn old_value(&self, property: &str) -> Option<&V> {
        self.old_values.get(property)
    }
    pub fn new_value(&self, property: &str) -> Option<&V> {
        self.new_values.get(property)
    }
    pub fn old_values(&self) -> &HashMap<String, V> {
        &self.old_values
    }
    pub fn new_values(&self) -> &HashMap<String, V> {
        &self.new_values
    }
    pub fn len(&self) -> usize {
        self.property_names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.property_names.is_empty()
    }
}
impl<V> Default for ChangeBatch<V> {
    fn default() -> Self {
        Self::new()
    }
}
