use std::{
    collections::HashMap,
    future::Future,
    rc::{Rc, Weak},
};

use crate::{
    descriptor::{InitValue, INITIALIZE_COMPLETE_EVENT, INITIALIZE_ERROR_EVENT},
    graph::PropertyId,
    runtime::spawn_local,
    Error, Result, SharedError, Value,
};

use super::{Deferred, EventData, Model, ModelNode, Phase};

impl<V: Value> Model<V> {
    pub(super) fn initialize(&self, config_values: Vec<(String, InitValue<V>)>) -> Result<()> {
        let mut values = HashMap::with_capacity(config_values.len());
        for (name, value) in config_values {
            match self.ty().property_id(&name) {
                Some(PropertyId::State(_)) => {
                    values.insert(name, value);
                }
                _ => return Err(Error::unknown_property(&name)),
            }
        }
        let mut deferred: Deferred<V> = Vec::new();
        for (index, d) in self.ty().states().iter().enumerate() {
            let value = match values.remove(&d.name) {
                Some(value) => Some(value),
                None => d.init.as_ref().map(|init| init.resolve(self)),
            };
            match value {
                Some(InitValue::Ready(value)) => self.data_mut().slots[d.slot] = Some(value),
                Some(InitValue::Deferred(future)) => deferred.push((index, future)),
                None => {}
            }
        }
        if deferred.is_empty() {
            return self.finish_initialization();
        }
        tracing::debug!(deferred = deferred.len(), "waiting for initial values");
        spawn_local(resolve_deferred(Rc::downgrade(&self.0), deferred));
        Ok(())
    }

    /// Evaluates eager computed properties, then discards the changes made so far.
    fn finish_initialization(&self) -> Result<()> {
        for (index, d) in self.ty().computeds().iter().enumerate() {
            if d.eager {
                self.get_computed(index, false)?;
            }
        }
        {
            let mut d = self.data_mut();
            if let Some(batch) = d.batch.take() {
                tracing::trace!(changes = batch.len(), "initial batch discarded");
            }
            if d.phase == Phase::Initializing {
                d.phase = Phase::Ready;
            }
        }
        tracing::debug!("initialization complete");
        self.0.init_tx.send(Ok(()));
        let _ = self
            .0
            .events
            .publish(INITIALIZE_COMPLETE_EVENT, EventData::InitializeComplete);
        Ok(())
    }

    fn fail(&self, e: SharedError) {
        tracing::debug!(error = %e, "initialization failed");
        {
            let mut d = self.data_mut();
            d.batch = None;
            if d.phase == Phase::Initializing {
                d.phase = Phase::Failed;
            }
        }
        self.0.init_tx.send(Err(e.clone()));
        let _ = self
            .0
            .events
            .publish(INITIALIZE_ERROR_EVENT, EventData::InitializeError(e));
    }

    /// Returns whether every initial value has resolved and eager computed properties were evaluated.
    pub fn is_initialized(&self) -> bool {
        matches!(self.0.init_rx.get(), Some(Ok(())))
    }

    /// Resolves when initialization completes or fails.
    ///
    /// Deferred initial values are driven by [`Runtime::update`](crate::Runtime::update).
    pub fn initialized(&self) -> impl Future<Output = Result<(), SharedError>> + 'static {
        let rx = self.0.init_rx.clone();
        async move { rx.recv().await }
    }
}

async fn resolve_deferred<V: Value>(this: Weak<ModelNode<V>>, deferred: Deferred<V>) {
    for (index, future) in deferred {
        let result = future.await;
        let Some(node) = this.upgrade() else {
            return;
        };
        let model = Model(node);
        let d = model.ty().state(index);
        match result {
            Ok(value) => model.data_mut().slots[d.slot] = Some(value),
            Err(source) => {
                let e = Error::Initialization {
                    property: d.name.clone(),
                    source,
                };
                model.fail(Rc::new(e));
                return;
            }
        }
    }
    if let Some(node) = this.upgrade() {
        let model = Model(node);
        if let Err(e) = model.finish_initialization() {
            model.fail(Rc::new(e));
        }
    }
}
