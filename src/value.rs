use std::fmt::Debug;

use parse_display::Display;

/// Bound for property values stored in a [`Model`](crate::Model).
///
/// `Default` supplies the value of a slot that has never been written.
pub trait Value: Clone + PartialEq + Default + Debug + 'static {}

impl<T> Value for T where T: Clone + PartialEq + Default + Debug + 'static {}

/// Reserved markers that carry a side-channel request instead of a value.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(style = "kebab-case")]
pub enum Sentinel {
    /// Publish a change notification without changing the stored value.
    ///
    /// Assignable to state properties, and returnable from compute and transform functions.
    ForceChange,

    /// Discard the cache of a computed property and compute it again.
    ///
    /// Assignable only to computed properties.
    Recompute,
}

/// A value written to a property, or produced by a compute or transform function.
#[derive(Debug, Clone, PartialEq)]
pub enum Assign<V> {
    Value(V),
    Sentinel(Sentinel),
}

impl<V> Assign<V> {
    pub fn force_change() -> Self {
        Assign::Sentinel(Sentinel::ForceChange)
    }
    pub fn recompute() -> Self {
        Assign::Sentinel(Sentinel::Recompute)
    }
    pub fn is_force_change(&self) -> bool {
        matches!(self, Assign::Sentinel(Sentinel::ForceChange))
    }
    pub fn as_value(&self) -> Option<&V> {
        match self {
            Assign::Value(value) => Some(value),
            Assign::Sentinel(_) => None,
        }
    }
    pub fn into_value(self) -> Option<V> {
        match self {
            Assign::Value(value) => Some(value),
            Assign::Sentinel(_) => None,
        }
    }
}

impl<V> From<V> for Assign<V> {
    fn from(value: V) -> Self {
        Assign::Value(value)
    }
}
