use crate::{graph::PropertyId, Assign, Error, Result, Sentinel, Value};

use super::{EventData, Model, PropertyChange};

/// Removes a computed property from the evaluation stack when its evaluation ends, even by unwinding.
struct ComputingGuard<'a, V: Value> {
    model: &'a Model<V>,
    index: usize,
}
impl<V: Value> Drop for ComputingGuard<'_, V> {
    fn drop(&mut self) {
        if let Ok(mut d) = self.model.0.data.try_borrow_mut() {
            d.remove_computing(self.index);
        }
    }
}

impl<V: Value> Model<V> {
    /// Reads a computed property, evaluating it first if it is stale.
    ///
    /// With `track` unset the read is not recorded as a dependency of the property being evaluated.
    pub(super) fn get_computed(&self, index: usize, track: bool) -> Result<V> {
        let d = self.ty().computed(index);
        let stale = {
            let data = self.data();
            if data.computing.contains(&index) {
                let computing: Vec<String> = data
                    .computing
                    .iter()
                    .map(|&i| self.ty().computed(i).name.clone())
                    .collect();
                tracing::debug!(property = %d.name, ?computing, "circular dependency");
                return Err(Error::CircularDependency {
                    property: d.name.clone(),
                    computing,
                });
            }
            data.stale.contains(&index)
        };
        if track {
            self.track(PropertyId::Computed(index));
        }
        if stale {
            self.evaluate(index)?;
        }
        Ok(self.data().value(d.slot))
    }

    fn evaluate(&self, index: usize) -> Result<()> {
        let d = self.ty().computed(index);
        {
            let mut data = self.data_mut();
            data.computing.push(index);
            data.graph.clear_dependencies(index);
            data.evaluations += 1;
            data.evaluated_at[index] = data.evaluations;
        }
        let _guard = ComputingGuard { model: self, index };
        tracing::debug!(property = %d.name, "evaluate");
        let result = (d.compute)(self);
        let old_value = self.data().value(d.slot);
        match result {
            Err(e) => Err(Error::computation(&d.name, e)),
            Ok(Assign::Value(new_value)) => {
                if old_value == new_value {
                    let mut data = self.data_mut();
                    data.slots[d.slot] = Some(new_value);
                    data.remove_computing(index);
                    data.stale.remove(&index);
                    return Ok(());
                }
                self.publish_computed_change(index, old_value, new_value)
            }
            Ok(Assign::Sentinel(Sentinel::ForceChange)) => {
                self.publish_computed_change(index, old_value.clone(), old_value)
            }
            Ok(Assign::Sentinel(Sentinel::Recompute)) => Err(Error::invalid_mutation(
                &d.name,
                "compute function returned the recompute sentinel",
            )),
        }
    }

    fn publish_computed_change(&self, index: usize, old_value: V, new_value: V) -> Result<()> {
        let d = self.ty().computed(index);
        let change = PropertyChange {
            property: d.name.clone(),
            old_value,
            new_value,
        };
        self.0
            .events
            .publish(&d.change_event_name, EventData::Change(change))?;
        Ok(())
    }

    pub(super) fn assign_computed(&self, index: usize, value: Assign<V>) -> Result<()> {
        match value {
            Assign::Sentinel(Sentinel::Recompute) => self.recompute_property(index),
            Assign::Sentinel(Sentinel::ForceChange) => Err(Error::invalid_mutation(
                &self.ty().computed(index).name,
                "a computed property cannot be force-changed",
            )),
            Assign::Value(_) => Err(Error::invalid_mutation(
                &self.ty().computed(index).name,
                "a computed property cannot be set",
            )),
        }
    }

    /// Marks a computed property stale. An eager property is evaluated at once;
    /// a lazy one passes the staleness on to its dependents.
    pub(super) fn recompute_property(&self, index: usize) -> Result<()> {
        if !self.mark_stale(index) {
            return Ok(());
        }
        self.refresh(index)
    }

    /// Recomputes the dependents of a property whose new value is already stored.
    ///
    /// Every direct dependent is marked stale before any is evaluated, so a dependent that reads
    /// another stale dependent pulls it first. Dependents evaluated after the change skip this pass.
    pub(super) fn recompute_dependents(&self, id: PropertyId) -> Result<()> {
        let (dependents, since) = {
            let data = self.data();
            (data.graph.dependents(id), data.evaluations)
        };
        let mut marked = Vec::new();
        for index in dependents {
            let evaluated_at = self.data().evaluated_at[index];
            if evaluated_at <= since && self.mark_stale(index) {
                marked.push(index);
            }
        }
        for index in marked {
            self.refresh(index)?;
        }
        Ok(())
    }

    fn mark_stale(&self, index: usize) -> bool {
        let inserted = self.data_mut().stale.insert(index);
        if inserted {
            let d = self.ty().computed(index);
            tracing::trace!(property = %d.name, eager = d.eager, "marked stale");
        }
        inserted
    }

    fn refresh(&self, index: usize) -> Result<()> {
        if !self.ty().computed(index).eager {
            return self.recompute_dependents(PropertyId::Computed(index));
        }
        if self.data().stale.contains(&index) {
            self.get_computed(index, false)?;
        }
        Ok(())
    }

    /// Default action of a computed change event: caches the new value and propagates the change.
    pub fn complete_computed_change(&self, change: &PropertyChange<V>) -> Result<()> {
        let id = self.id(&change.property)?;
        let PropertyId::Computed(index) = id else {
            return Err(Error::invalid_mutation(
                &change.property,
                "not a computed property",
            ));
        };
        {
            let slot = self.ty().computed(index).slot;
            let mut data = self.data_mut();
            data.slots[slot] = Some(change.new_value.clone());
            data.remove_computing(index);
            data.stale.remove(&index);
        }
        tracing::trace!(
            property = %change.property,
            old = ?change.old_value,
            new = ?change.new_value,
            "computed changed"
        );
        self.register_change(id, change)
    }

    /// Runs when a computed change event is prevented. The property stays stale.
    pub fn cleanup_computed_change(&self, change: &PropertyChange<V>) {
        if let Some(PropertyId::Computed(index)) = self.ty().property_id(&change.property) {
            self.data_mut().remove_computing(index);
        }
    }
}
