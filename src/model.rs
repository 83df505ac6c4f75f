use std::{
    cell::{Ref, RefCell, RefMut},
    collections::BTreeSet,
    future::Future,
    rc::Rc,
};

use derive_ex::derive_ex;
use futures::future::LocalBoxFuture;
use serde::Deserialize;

use crate::{
    batch::ChangeBatch,
    descriptor::{
        InitValue, ModelType, ReadOnly, ReadOnlySetBehavior, CHANGE_EVENT,
        INITIALIZE_COMPLETE_EVENT, INITIALIZE_ERROR_EVENT,
    },
    event::{Dispatcher, Event, EventConfig, Stage},
    graph::{DependencyGraph, PropertyId},
    runtime::Task,
    utils::oneshot_broadcast::{oneshot_broadcast, Receiver, Sender},
    Assign, BoxError, Error, Result, SharedError, Subscription, Value,
};

mod computed;
mod lifecycle;
mod state;


/// Payload of every event published by a [`Model`].
#[derive(Debug, Clone)]
pub enum EventData<V> {
    /// Payload of a property change event. Subscribers may replace `new_value` before it is stored.
    Change(PropertyChange<V>),
    ReadOnlySet(ReadOnlySet<V>),
    /// Payload of the aggregate `change` event.
    Batch(ChangeBatch<V>),
    InitializeComplete,
    InitializeError(SharedError),
}

impl<V> EventData<V> {
    pub fn change(&self) -> Option<&PropertyChange<V>> {
        match self {
            EventData::Change(change) => Some(change),
            _ => None,
        }
    }
    pub fn change_mut(&mut self) -> Option<&mut PropertyChange<V>> {
        match self {
            EventData::Change(change) => Some(change),
            _ => None,
        }
    }
    pub fn read_only_set(&self) -> Option<&ReadOnlySet<V>> {
        match self {
            EventData::ReadOnlySet(set) => Some(set),
            _ => None,
        }
    }
    pub fn batch(&self) -> Option<&ChangeBatch<V>> {
        match self {
            EventData::Batch(batch) => Some(batch),
            _ => None,
        }
    }
    pub fn error(&self) -> Option<&SharedError> {
        match self {
            EventData::InitializeError(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange<V> {
    pub property: String,
    pub old_value: V,
    pub new_value: V,
}

/// A rejected write to a read-only state property.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOnlySet<V> {
    pub property: String,
    pub attempted_value: Assign<V>,
    pub old_value: V,
}

/// Per-instance options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelOptions {
    /// Open a batch on the first change of each synchronous segment
    /// and publish it as a `change` event when the segment ends.
    pub auto_batch_changes: bool,
}

/// Construction input of a [`Model`]: options and initial state values that override the declared ones.
pub struct ModelConfig<V> {
    pub options: ModelOptions,
    values: Vec<(String, InitValue<V>)>,
}

impl<V> ModelConfig<V> {
    pub fn new() -> Self {
        Self {
            options: ModelOptions::default(),
            values: Vec::new(),
        }
    }
    pub fn options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }
    pub fn auto_batch_changes(mut self, value: bool) -> Self {
        self.options.auto_batch_changes = value;
        self
    }
    pub fn value(mut self, name: impl Into<String>, value: V) -> Self {
        self.values.push((name.into(), InitValue::Ready(value)));
        self
    }
    pub fn deferred(
        mut self,
        name: impl Into<String>,
        future: impl Future<Output = Result<V, BoxError>> + 'static,
    ) -> Self {
        self.values
            .push((name.into(), InitValue::deferred(future)));
        self
    }
}
impl<V> Default for ModelConfig<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a model is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Deferred initial values are still resolving.
    Initializing,
    Ready,
    /// Initialization failed. Properties remain readable and writable.
    Failed,
    Destroyed,
}

/// An instance of a [`ModelType`].
///
/// Cloning yields another handle to the same instance.
#[derive_ex(Clone, bound())]
pub struct Model<V: Value>(Rc<ModelNode<V>>);

struct ModelNode<V: Value> {
    ty: ModelType<V>,
    data: RefCell<ModelData<V>>,
    events: Dispatcher<EventData<V>>,
    init_tx: Sender<Result<(), SharedError>>,
    init_rx: Receiver<Result<(), SharedError>>,
}

struct ModelData<V> {
    slots: Vec<Option<V>>,
    sealed: Vec<bool>,
    stale: BTreeSet<usize>,
    computing: Vec<usize>,
    evaluations: u64,
    evaluated_at: Vec<u64>,
    graph: DependencyGraph,
    batch: Option<ChangeBatch<V>>,
    auto_batch_changes: bool,
    phase: Phase,
}

impl<V: Value> ModelData<V> {
    fn new(ty: &ModelType<V>, options: ModelOptions) -> Self {
        Self {
            slots: vec![None; ty.slot_count()],
            sealed: vec![false; ty.states().len()],
            stale: (0..ty.computeds().len()).collect(),
            computing: Vec::new(),
            evaluations: 0,
            evaluated_at: vec![0; ty.computeds().len()],
            graph: DependencyGraph::new(),
            batch: Some(ChangeBatch::new()),
            auto_batch_changes: options.auto_batch_changes,
            phase: Phase::Initializing,
        }
    }
    fn value(&self, slot: usize) -> V {
        self.slots[slot].clone().unwrap_or_default()
    }
    fn remove_computing(&mut self, index: usize) {
        self.computing.retain(|&i| i != index);
    }
}

impl<V: Value> Model<V> {
    /// Creates an instance of `ty`.
    ///
    /// If any initial value is deferred, the model is returned while it is still [`Phase::Initializing`];
    /// see [`initialized`](Self::initialized).
    pub fn new(ty: &ModelType<V>, config: ModelConfig<V>) -> Result<Self> {
        let (init_tx, init_rx) = oneshot_broadcast();
        let this = Model(Rc::new(ModelNode {
            ty: ty.clone(),
            data: RefCell::new(ModelData::new(ty, config.options)),
            events: Dispatcher::new(),
            init_tx,
            init_rx,
        }));
        this.define_events();
        this.initialize(config.values)?;
        Ok(this)
    }

    pub fn ty(&self) -> &ModelType<V> {
        &self.0.ty
    }
    fn data(&self) -> Ref<ModelData<V>> {
        self.0.data.borrow()
    }
    fn data_mut(&self) -> RefMut<ModelData<V>> {
        self.0.data.borrow_mut()
    }
    fn id(&self, name: &str) -> Result<PropertyId> {
        self.ty()
            .property_id(name)
            .ok_or_else(|| Error::unknown_property(name))
    }

    /// Reads a property.
    ///
    /// A read made while a computed property is being evaluated is recorded as a dependency of it.
    pub fn get(&self, name: &str) -> Result<V> {
        match self.id(name)? {
            PropertyId::State(index) => Ok(self.get_state(index)),
            PropertyId::Computed(index) => self.get_computed(index, true),
        }
    }

    /// Writes a value to a state property.
    pub fn set(&self, name: &str, value: V) -> Result<()> {
        self.assign(name, Assign::Value(value))
    }

    /// Writes a value or a sentinel to a property.
    pub fn assign(&self, name: &str, value: Assign<V>) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        match self.id(name)? {
            PropertyId::State(index) => self.assign_state(index, value),
            PropertyId::Computed(index) => self.assign_computed(index, value),
        }
    }

    /// Publishes a change of a state property without changing its value.
    pub fn force_change(&self, name: &str) -> Result<()> {
        self.assign(name, Assign::force_change())
    }

    /// Discards the cached value of a computed property.
    pub fn recompute(&self, name: &str) -> Result<()> {
        self.assign(name, Assign::recompute())
    }

    /// Subscribes to an event before its default action runs.
    pub fn on(
        &self,
        event: &str,
        f: impl Fn(&mut Event<EventData<V>>) + 'static,
    ) -> Result<Subscription> {
        self.0.events.subscribe(event, Stage::On, f)
    }

    /// Subscribes to an event after its default action completed.
    pub fn after(
        &self,
        event: &str,
        f: impl Fn(&mut Event<EventData<V>>) + 'static,
    ) -> Result<Subscription> {
        self.0.events.subscribe(event, Stage::After, f)
    }

    /// Subscribes to the change event of a property.
    pub fn on_change(
        &self,
        name: &str,
        f: impl Fn(&mut PropertyChange<V>) + 'static,
    ) -> Result<Subscription> {
        let event = match self.id(name)? {
            PropertyId::State(index) => &self.ty().state(index).change_event_name,
            PropertyId::Computed(index) => &self.ty().computed(index).change_event_name,
        };
        self.on(event, move |e| {
            if let Some(change) = e.data.change_mut() {
                f(change)
            }
        })
    }

    /// Opens a batch if none is open. The batch is published as a `change` event
    /// when the current synchronous segment ends.
    pub fn batch_changes(&self) {
        let mut d = self.data_mut();
        if d.batch.is_none() && d.phase != Phase::Destroyed {
            self.open_batch(&mut d);
        }
    }
    pub fn auto_batch_changes(&self) -> bool {
        self.data().auto_batch_changes
    }

    pub fn phase(&self) -> Phase {
        self.data().phase
    }
    pub fn is_destroyed(&self) -> bool {
        self.phase() == Phase::Destroyed
    }

    /// Returns whether the computed property `name` will be evaluated on its next read.
    pub fn is_stale(&self, name: &str) -> Result<bool> {
        match self.id(name)? {
            PropertyId::Computed(index) => Ok(self.data().stale.contains(&index)),
            PropertyId::State(_) => Ok(false),
        }
    }

    /// Properties read by the last evaluation of the computed property `name`.
    pub fn dependencies(&self, name: &str) -> Result<Vec<String>> {
        let PropertyId::Computed(index) = self.id(name)? else {
            return Ok(Vec::new());
        };
        let ids = self.data().graph.dependencies(index);
        Ok(ids
            .into_iter()
            .map(|id| self.ty().property_name(id).to_owned())
            .collect())
    }

    /// Computed properties whose last evaluation read `name`.
    pub fn dependents(&self, name: &str) -> Result<Vec<String>> {
        let id = self.id(name)?;
        let indexes = self.data().graph.dependents(id);
        Ok(indexes
            .into_iter()
            .map(|index| self.ty().computed(index).name.clone())
            .collect())
    }

    /// Detaches every subscriber and drops any open batch. Later writes fail with [`Error::Destroyed`].
    pub fn destroy(&self) {
        {
            let mut d = self.data_mut();
            if d.phase == Phase::Destroyed {
                return;
            }
            d.phase = Phase::Destroyed;
            d.batch = None;
        }
        self.0.events.clear_subscribers();
        tracing::debug!("model destroyed");
    }

    fn track(&self, id: PropertyId) {
        let mut d = self.data_mut();
        if let Some(&computing) = d.computing.last() {
            d.graph.track(computing, id);
        }
    }

    /// Records a completed change in the open batch and recomputes the dependents of the property.
    fn register_change(&self, id: PropertyId, change: &PropertyChange<V>) -> Result<()> {
        {
            let mut d = self.data_mut();
            if d.batch.is_none() && d.auto_batch_changes && d.phase != Phase::Destroyed {
                self.open_batch(&mut d);
            }
            if let Some(batch) = &mut d.batch {
                batch.record(
                    &change.property,
                    change.old_value.clone(),
                    change.new_value.clone(),
                );
            }
        }
        self.recompute_dependents(id)
    }

    fn open_batch(&self, d: &mut ModelData<V>) {
        d.batch = Some(ChangeBatch::new());
        tracing::debug!("batch opened");
        Task::from_weak_fn(Rc::downgrade(&self.0), |node| Model(node).flush_batch()).schedule();
    }

    fn flush_batch(&self) {
        let batch = {
            let mut d = self.data_mut();
            if d.phase == Phase::Destroyed {
                return;
            }
            d.batch.take()
        };
        let Some(batch) = batch else {
            return;
        };
        if batch.is_empty() {
            return;
        }
        tracing::debug!(properties = ?batch.property_names(), "publish batch");
        let _ = self.0.events.publish(CHANGE_EVENT, EventData::Batch(batch));
    }

    fn define_events(&self) {
        let ty = self.ty();
        for d in ty.states() {
            let config = EventConfig {
                allow_public_subscription: d.allow_public_subscription,
                allow_public_unsubscription: d.allow_public_unsubscription,
                complete_once: d.read_only == ReadOnly::SetOnce,
            };
            if d.read_only != ReadOnly::ReadOnly {
                let hook = d.on_complete.clone();
                let this = Rc::downgrade(&self.0);
                self.0.events.define(
                    &d.change_event_name,
                    config,
                    Some(Rc::new(move |e: &mut Event<EventData<V>>| {
                        let (Some(node), Some(change)) = (this.upgrade(), e.data.change()) else {
                            return Ok(());
                        };
                        hook(&Model(node), change)
                    })),
                    None,
                );
            }
            if d.read_only_set_behavior == Some(ReadOnlySetBehavior::Event) {
                if let Some(name) = &d.read_only_set_event_name {
                    self.0.events.define(name, config, None, None);
                }
            }
        }
        for d in ty.computeds() {
            let config = EventConfig {
                allow_public_subscription: d.allow_public_subscription,
                allow_public_unsubscription: d.allow_public_unsubscription,
                complete_once: false,
            };
            let complete = d.on_complete.clone();
            let cleanup = d.on_cleanup.clone();
            let this0 = Rc::downgrade(&self.0);
            let this1 = this0.clone();
            self.0.events.define(
                &d.change_event_name,
                config,
                Some(Rc::new(move |e: &mut Event<EventData<V>>| {
                    let (Some(node), Some(change)) = (this0.upgrade(), e.data.change()) else {
                        return Ok(());
                    };
                    complete(&Model(node), change)
                })),
                Some(Rc::new(move |e: &Event<EventData<V>>| {
                    if let (Some(node), Some(change)) = (this1.upgrade(), e.data.change()) {
                        cleanup(&Model(node), change)
                    }
                })),
            );
        }
        for name in [CHANGE_EVENT, INITIALIZE_COMPLETE_EVENT, INITIALIZE_ERROR_EVENT] {
            self.0.events.define(name, EventConfig::new(), None, None);
        }
    }
}

impl<V: Value> std::fmt::Debug for Model<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.data();
        let states: Vec<(&str, V)> = self
            .ty()
            .states()
            .iter()
            .map(|desc| (desc.name.as_str(), d.value(desc.slot)))
            .collect();
        f.debug_struct("Model")
            .field("phase", &d.phase)
            .field("states", &states)
            .finish()
    }
}

type Deferred<V> = Vec<(usize, LocalBoxFuture<'static, Result<V, BoxError>>)>;
