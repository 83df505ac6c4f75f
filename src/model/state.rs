use crate::{
    descriptor::{ReadOnly, ReadOnlySetBehavior},
    graph::PropertyId,
    Assign, Error, Result, Sentinel, Value,
};

use super::{EventData, Model, PropertyChange, ReadOnlySet};

impl<V: Value> Model<V> {
    pub(super) fn get_state(&self, index: usize) -> V {
        self.track(PropertyId::State(index));
        let d = self.ty().state(index);
        let value = self.data().value(d.slot);
        match &d.getter {
            Some(getter) => getter(self, value),
            None => value,
        }
    }

    fn is_read_only(&self, index: usize) -> bool {
        match self.ty().state(index).read_only {
            ReadOnly::Writable => false,
            ReadOnly::ReadOnly => true,
            ReadOnly::SetOnce => self.data().sealed[index],
        }
    }

    pub(super) fn assign_state(&self, index: usize, value: Assign<V>) -> Result<()> {
        let d = self.ty().state(index);
        if self.is_read_only(index) {
            return self.reject_read_only(index, value);
        }
        let old_value = self.data().value(d.slot);
        let new_value = match value {
            Assign::Value(value) => value,
            Assign::Sentinel(Sentinel::ForceChange) => {
                return self.publish_state_change(index, old_value.clone(), old_value);
            }
            Assign::Sentinel(Sentinel::Recompute) => {
                return Err(Error::invalid_mutation(
                    &d.name,
                    "a state property cannot be recomputed",
                ));
            }
        };
        if let Some(validate) = &d.validate {
            if !validate(self, &new_value) {
                tracing::trace!(property = %d.name, value = ?new_value, "write rejected");
                return Ok(());
            }
        }
        let new_value = match &d.transform {
            None => new_value,
            Some(transform) => match transform(self, new_value) {
                Assign::Value(value) => value,
                Assign::Sentinel(Sentinel::ForceChange) => {
                    return self.publish_state_change(index, old_value.clone(), old_value);
                }
                Assign::Sentinel(Sentinel::Recompute) => {
                    return Err(Error::invalid_mutation(
                        &d.name,
                        "transform returned the recompute sentinel",
                    ));
                }
            },
        };
        if new_value == old_value {
            return Ok(());
        }
        self.publish_state_change(index, old_value, new_value)
    }

    fn publish_state_change(&self, index: usize, old_value: V, new_value: V) -> Result<()> {
        let d = self.ty().state(index);
        let change = PropertyChange {
            property: d.name.clone(),
            old_value,
            new_value,
        };
        let event = self
            .0
            .events
            .publish(&d.change_event_name, EventData::Change(change))?;
        if event.is_completed() && d.read_only == ReadOnly::SetOnce {
            self.data_mut().sealed[index] = true;
            tracing::debug!(property = %d.name, "set-once property sealed");
        }
        Ok(())
    }

    fn reject_read_only(&self, index: usize, attempted_value: Assign<V>) -> Result<()> {
        let d = self.ty().state(index);
        match d.read_only_set_behavior.unwrap_or_default() {
            ReadOnlySetBehavior::Ignore => Ok(()),
            ReadOnlySetBehavior::Throw => Err(Error::invalid_mutation(
                &d.name,
                "attempt to set a read-only property",
            )),
            ReadOnlySetBehavior::Event => {
                let Some(event) = &d.read_only_set_event_name else {
                    return Ok(());
                };
                let data = EventData::ReadOnlySet(ReadOnlySet {
                    property: d.name.clone(),
                    attempted_value,
                    old_value: self.data().value(d.slot),
                });
                self.0.events.publish(event, data)?;
                Ok(())
            }
        }
    }

    /// Default action of a state change event: stores the new value and propagates the change.
    pub fn complete_state_change(&self, change: &PropertyChange<V>) -> Result<()> {
        let id = self.id(&change.property)?;
        let PropertyId::State(index) = id else {
            return Err(Error::invalid_mutation(
                &change.property,
                "not a state property",
            ));
        };
        let d = self.ty().state(index);
        {
            let mut data = self.data_mut();
            data.slots[d.slot] = Some(change.new_value.clone());
            if d.read_only == ReadOnly::SetOnce {
                data.sealed[index] = true;
            }
        }
        tracing::trace!(
            property = %change.property,
            old = ?change.old_value,
            new = ?change.new_value,
            "state changed"
        );
        self.register_change(id, change)
    }
}
