use std::{collections::HashMap, future::Future, rc::Rc};

use derive_ex::derive_ex;
use futures::{future::LocalBoxFuture, FutureExt};
use parse_display::{Display, FromStr};
use serde::Deserialize;

use crate::{
    graph::PropertyId, Assign, BoxError, Error, Model, ModelConfig, PropertyChange, Result, Value,
};


/// Prefix of the default internal key of a state property.
pub const STATE_KEY_PREFIX: &str = "_state_";

/// Prefix of the default internal key of a computed property.
pub const COMPUTED_KEY_PREFIX: &str = "_computed_";

/// Name of the aggregate change event.
pub const CHANGE_EVENT: &str = "change";
pub const INITIALIZE_COMPLETE_EVENT: &str = "initializeComplete";
pub const INITIALIZE_ERROR_EVENT: &str = "initializeError";

pub type ValidateFn<V> = Rc<dyn Fn(&Model<V>, &V) -> bool>;
pub type TransformFn<V> = Rc<dyn Fn(&Model<V>, V) -> Assign<V>>;
pub type GetterFn<V> = Rc<dyn Fn(&Model<V>, V) -> V>;
pub type ComputeFn<V> = Rc<dyn Fn(&Model<V>) -> Result<Assign<V>, BoxError>>;
pub type InitFn<V> = Rc<dyn Fn(&Model<V>) -> InitValue<V>>;

/// Default action of a property change event.
pub type ChangeCompleteFn<V> = Rc<dyn Fn(&Model<V>, &PropertyChange<V>) -> Result<()>>;

/// Runs when a property change event is prevented.
pub type ChangeCleanupFn<V> = Rc<dyn Fn(&Model<V>, &PropertyChange<V>)>;

/// Write policy of a state property.
#[derive(Debug, Display, FromStr, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[display(style = "kebab-case")]
#[serde(try_from = "RawReadOnly")]
pub enum ReadOnly {
    #[default]
    Writable,
    ReadOnly,
    /// Writable until the first completed change, read-only afterwards.
    SetOnce,
}
impl ReadOnly {
    pub fn is_read_only(self) -> bool {
        self != ReadOnly::Writable
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReadOnly {
    Flag(bool),
    Mode(String),
}
impl TryFrom<RawReadOnly> for ReadOnly {
    type Error = String;
    fn try_from(value: RawReadOnly) -> Result<Self, Self::Error> {
        match value {
            RawReadOnly::Flag(true) => Ok(ReadOnly::ReadOnly),
            RawReadOnly::Flag(false) => Ok(ReadOnly::Writable),
            RawReadOnly::Mode(mode) => mode
                .parse()
                .map_err(|_| format!("unknown read-only mode `{mode}`")),
        }
    }
}

/// What happens when a read-only state property is written.
#[derive(Debug, Display, FromStr, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[display(style = "kebab-case")]
pub enum ReadOnlySetBehavior {
    /// Drop the write silently.
    #[default]
    Ignore,
    /// Publish a read-only-set event.
    Event,
    /// Fail with [`Error::InvalidMutation`].
    Throw,
}

/// Initial value of a state property.
pub enum InitValue<V> {
    Ready(V),
    /// Resolved asynchronously; construction completes once every deferred value resolves.
    Deferred(LocalBoxFuture<'static, Result<V, BoxError>>),
}
impl<V> InitValue<V> {
    pub fn deferred(future: impl Future<Output = Result<V, BoxError>> + 'static) -> Self {
        InitValue::Deferred(future.boxed_local())
    }
}
impl<V> From<V> for InitValue<V> {
    fn from(value: V) -> Self {
        InitValue::Ready(value)
    }
}
impl<V: std::fmt::Debug> std::fmt::Debug for InitValue<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitValue::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            InitValue::Deferred(_) => write!(f, "Deferred"),
        }
    }
}

/// Declared source of a state property's initial value.
#[derive_ex(Clone, bound())]
pub enum InitSource<V: Value> {
    Literal(V),
    Fn(InitFn<V>),
}
impl<V: Value> InitSource<V> {
    pub(crate) fn resolve(&self, model: &Model<V>) -> InitValue<V> {
        match self {
            InitSource::Literal(value) => InitValue::Ready(value.clone()),
            InitSource::Fn(f) => f(model),
        }
    }
}

/// Plain-data options of a state property.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct StateOptions {
    pub change_event_name: Option<String>,
    pub internal_key: Option<String>,
    pub read_only: ReadOnly,
    /// One of `"ignore"`, `"event"` or `"throw"`. Checked when the model type is built.
    pub read_only_set_behavior: Option<String>,
    pub read_only_set_event_name: Option<String>,
    pub allow_public_subscription: bool,
    pub allow_public_unsubscription: bool,
}
impl Default for StateOptions {
    fn default() -> Self {
        Self {
            change_event_name: None,
            internal_key: None,
            read_only: ReadOnly::Writable,
            read_only_set_behavior: None,
            read_only_set_event_name: None,
            allow_public_subscription: true,
            allow_public_unsubscription: true,
        }
    }
}

/// Plain-data options of a computed property.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ComputedOptions {
    pub change_event_name: Option<String>,
    pub internal_key: Option<String>,
    /// Defer recomputation to the next read instead of recomputing when a dependency changes.
    pub lazy: bool,
    pub allow_public_subscription: bool,
    pub allow_public_unsubscription: bool,
}
impl Default for ComputedOptions {
    fn default() -> Self {
        Self {
            change_event_name: None,
            internal_key: None,
            lazy: false,
            allow_public_subscription: true,
            allow_public_unsubscription: true,
        }
    }
}

/// Declaration of a state property.
#[derive_ex(Clone, bound())]
pub struct StateSpec<V: Value> {
    options: StateOptions,
    init: Option<InitSource<V>>,
    validate: Option<ValidateFn<V>>,
    transform: Option<TransformFn<V>>,
    getter: Option<GetterFn<V>>,
    on_complete: Option<ChangeCompleteFn<V>>,
}

impl<V: Value> StateSpec<V> {
    pub fn new() -> Self {
        Self::from_options(StateOptions::default())
    }
    pub fn from_options(options: StateOptions) -> Self {
        Self {
            options,
            init: None,
            validate: None,
            transform: None,
            getter: None,
            on_complete: None,
        }
    }
    pub fn options(&self) -> &StateOptions {
        &self.options
    }

    pub fn init(mut self, value: V) -> Self {
        self.init = Some(InitSource::Literal(value));
        self
    }
    pub fn init_with(mut self, f: impl Fn(&Model<V>) -> V + 'static) -> Self {
        self.init = Some(InitSource::Fn(Rc::new(move |m: &Model<V>| {
            InitValue::Ready(f(m))
        })));
        self
    }
    pub fn init_deferred_with<Fut>(mut self, f: impl Fn(&Model<V>) -> Fut + 'static) -> Self
    where
        Fut: Future<Output = Result<V, BoxError>> + 'static,
    {
        self.init = Some(InitSource::Fn(Rc::new(move |m: &Model<V>| {
            InitValue::deferred(f(m))
        })));
        self
    }

    /// Rejects writes for which `f` returns `false`. Runs before [`transform`](Self::transform).
    pub fn validate(mut self, f: impl Fn(&Model<V>, &V) -> bool + 'static) -> Self {
        self.validate = Some(Rc::new(f));
        self
    }

    /// Maps an accepted write to the value that is compared and stored.
    pub fn transform(mut self, f: impl Fn(&Model<V>, V) -> Assign<V> + 'static) -> Self {
        self.transform = Some(Rc::new(f));
        self
    }

    /// Maps the stored value on every read.
    pub fn getter(mut self, f: impl Fn(&Model<V>, V) -> V + 'static) -> Self {
        self.getter = Some(Rc::new(f));
        self
    }
    pub fn read_only(mut self, read_only: ReadOnly) -> Self {
        self.options.read_only = read_only;
        self
    }
    pub fn read_only_set_behavior(mut self, behavior: ReadOnlySetBehavior) -> Self {
        self.options.read_only_set_behavior = Some(behavior.to_string());
        self
    }
    pub fn read_only_set_event_name(mut self, name: impl Into<String>) -> Self {
        self.options.read_only_set_event_name = Some(name.into());
        self
    }
    pub fn change_event_name(mut self, name: impl Into<String>) -> Self {
        self.options.change_event_name = Some(name.into());
        self
    }
    pub fn internal_key(mut self, key: impl Into<String>) -> Self {
        self.options.internal_key = Some(key.into());
        self
    }
    pub fn allow_public_subscription(mut self, allow: bool) -> Self {
        self.options.allow_public_subscription = allow;
        self
    }
    pub fn allow_public_unsubscription(mut self, allow: bool) -> Self {
        self.options.allow_public_unsubscription = allow;
        self
    }

    /// Replaces the default action of the change event.
    ///
    /// [`Model::complete_state_change`] is the default and can be called from `f`.
    pub fn on_complete(
        mut self,
        f: impl Fn(&Model<V>, &PropertyChange<V>) -> Result<()> + 'static,
    ) -> Self {
        self.on_complete = Some(Rc::new(f));
        self
    }
}
impl<V: Value> Default for StateSpec<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Declaration of a computed property.
#[derive_ex(Clone, bound())]
pub struct ComputedSpec<V: Value> {
    options: ComputedOptions,
    compute: ComputeFn<V>,
    on_complete: Option<ChangeCompleteFn<V>>,
    on_cleanup: Option<ChangeCleanupFn<V>>,
}

impl<V: Value> ComputedSpec<V> {
    pub fn new(compute: impl Fn(&Model<V>) -> Result<Assign<V>, BoxError> + 'static) -> Self {
        Self::from_options(ComputedOptions::default(), compute)
    }
    pub fn from_options(
        options: ComputedOptions,
        compute: impl Fn(&Model<V>) -> Result<Assign<V>, BoxError> + 'static,
    ) -> Self {
        Self {
            options,
            compute: Rc::new(compute),
            on_complete: None,
            on_cleanup: None,
        }
    }
    pub fn options(&self) -> &ComputedOptions {
        &self.options
    }
    pub fn lazy(mut self) -> Self {
        self.options.lazy = true;
        self
    }
    pub fn change_event_name(mut self, name: impl Into<String>) -> Self {
        self.options.change_event_name = Some(name.into());
        self
    }
    pub fn internal_key(mut self, key: impl Into<String>) -> Self {
        self.options.internal_key = Some(key.into());
        self
    }
    pub fn allow_public_subscription(mut self, allow: bool) -> Self {
        self.options.allow_public_subscription = allow;
        self
    }
    pub fn allow_public_unsubscription(mut self, allow: bool) -> Self {
        self.options.allow_public_unsubscription = allow;
        self
    }

    /// Replaces the default action of the change event.
    ///
    /// [`Model::complete_computed_change`] is the default and can be called from `f`.
    pub fn on_complete(
        mut self,
        f: impl Fn(&Model<V>, &PropertyChange<V>) -> Result<()> + 'static,
    ) -> Self {
        self.on_complete = Some(Rc::new(f));
        self
    }

    /// Replaces the handler run when the change event is prevented.
    ///
    /// [`Model::cleanup_computed_change`] is the default and can be called from `f`.
    pub fn on_cleanup(mut self, f: impl Fn(&Model<V>, &PropertyChange<V>) + 'static) -> Self {
        self.on_cleanup = Some(Rc::new(f));
        self
    }
}

/// Property table of a model type, before normalization.
///
/// Entries keep their declaration order. Declaring a name again replaces the earlier entry in place.
#[derive_ex(Clone, bound())]
pub struct ModelSpec<V: Value> {
    states: Vec<(String, StateSpec<V>)>,
    computeds: Vec<(String, ComputedSpec<V>)>,
}

impl<V: Value> ModelSpec<V> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            computeds: Vec::new(),
        }
    }
    pub fn state(mut self, name: impl Into<String>, spec: StateSpec<V>) -> Self {
        upsert(&mut self.states, name.into(), spec);
        self
    }
    pub fn computed(mut self, name: impl Into<String>, spec: ComputedSpec<V>) -> Self {
        upsert(&mut self.computeds, name.into(), spec);
        self
    }
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|(name, _)| name.as_str())
    }
    pub fn computed_names(&self) -> impl Iterator<Item = &str> {
        self.computeds.iter().map(|(name, _)| name.as_str())
    }

    /// Normalizes the table into a [`ModelType`].
    pub fn build(self) -> Result<ModelType<V>> {
        ModelType::new(self)
    }
}
impl<V: Value> Default for ModelSpec<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert<T>(entries: &mut Vec<(String, T)>, name: String, value: T) {
    if let Some(entry) = entries.iter_mut().find(|(n, _)| *n == name) {
        entry.1 = value;
    } else {
        entries.push((name, value));
    }
}

/// Normalized state property.
#[derive_ex(Clone, bound())]
pub struct StateDescriptor<V: Value> {
    pub name: String,
    pub internal_key: String,
    pub slot: usize,
    pub change_event_name: String,
    pub read_only: ReadOnly,
    /// Set whenever `read_only` is not [`ReadOnly::Writable`].
    pub read_only_set_behavior: Option<ReadOnlySetBehavior>,
    /// Set whenever the behavior is [`ReadOnlySetBehavior::Event`].
    pub read_only_set_event_name: Option<String>,
    pub allow_public_subscription: bool,
    pub allow_public_unsubscription: bool,
    pub init: Option<InitSource<V>>,
    pub validate: Option<ValidateFn<V>>,
    pub transform: Option<TransformFn<V>>,
    pub getter: Option<GetterFn<V>>,
    pub on_complete: ChangeCompleteFn<V>,
}

/// Normalized computed property.
#[derive_ex(Clone, bound())]
pub struct ComputedDescriptor<V: Value> {
    pub name: String,
    pub internal_key: String,
    pub slot: usize,
    pub change_event_name: String,
    pub eager: bool,
    pub allow_public_subscription: bool,
    pub allow_public_unsubscription: bool,
    pub compute: ComputeFn<V>,
    pub on_complete: ChangeCompleteFn<V>,
    pub on_cleanup: ChangeCleanupFn<V>,
}

/// A normalized property table, shared by every model of the type.
#[derive_ex(Clone, bound())]
pub struct ModelType<V: Value>(Rc<ModelTypeData<V>>);

struct ModelTypeData<V: Value> {
    spec: ModelSpec<V>,
    states: Vec<StateDescriptor<V>>,
    computeds: Vec<ComputedDescriptor<V>>,
    ids: HashMap<String, PropertyId>,
}

impl<V: Value> ModelType<V> {
    pub fn new(spec: ModelSpec<V>) -> Result<Self> {
        let mut ids = HashMap::new();
        let mut keys = HashMap::new();
        let mut event_names: HashMap<String, String> = [
            CHANGE_EVENT,
            INITIALIZE_COMPLETE_EVENT,
            INITIALIZE_ERROR_EVENT,
        ]
        .into_iter()
        .map(|e| (e.to_owned(), String::new()))
        .collect();
        let mut claim_event = |property: &str, event: &str| -> Result<()> {
            if let Some(owner) = event_names.insert(event.to_owned(), property.to_owned()) {
                let message = if owner.is_empty() {
                    format!("event name `{event}` is reserved")
                } else {
                    format!("event name `{event}` is already used by `{owner}`")
                };
                return Err(Error::configuration(property, message));
            }
            Ok(())
        };

        let mut states = Vec::with_capacity(spec.states.len());
        for (index, (name, s)) in spec.states.iter().enumerate() {
            let d = normalize_state(name, s, states.len())?;
            claim_name(&mut ids, name, PropertyId::State(index))?;
            claim_key(&mut keys, &d.internal_key, name)?;
            if d.read_only != ReadOnly::ReadOnly {
                claim_event(name, &d.change_event_name)?;
            }
            if let Some(event) = &d.read_only_set_event_name {
                claim_event(name, event)?;
            }
            states.push(d);
        }
        let mut computeds = Vec::with_capacity(spec.computeds.len());
        for (index, (name, c)) in spec.computeds.iter().enumerate() {
            let d = normalize_computed(name, c, states.len() + index)?;
            claim_name(&mut ids, name, PropertyId::Computed(index))?;
            claim_key(&mut keys, &d.internal_key, name)?;
            claim_event(name, &d.change_event_name)?;
            computeds.push(d);
        }
        tracing::debug!(
            states = states.len(),
            computed = computeds.len(),
            "model type normalized"
        );
        Ok(Self(Rc::new(ModelTypeData {
            spec,
            states,
            computeds,
            ids,
        })))
    }

    /// Returns a table seeded with this type's declarations, for defining a derived type.
    pub fn extend(&self) -> ModelSpec<V> {
        self.0.spec.clone()
    }

    /// Creates a model of this type.
    pub fn create(&self, config: ModelConfig<V>) -> Result<Model<V>> {
        Model::new(self, config)
    }

    pub fn states(&self) -> &[StateDescriptor<V>] {
        &self.0.states
    }
    pub fn computeds(&self) -> &[ComputedDescriptor<V>] {
        &self.0.computeds
    }
    pub fn state(&self, index: usize) -> &StateDescriptor<V> {
        &self.0.states[index]
    }
    pub fn computed(&self, index: usize) -> &ComputedDescriptor<V> {
        &self.0.computeds[index]
    }
    pub fn property_id(&self, name: &str) -> Option<PropertyId> {
        self.0.ids.get(name).copied()
    }
    pub fn property_name(&self, id: PropertyId) -> &str {
        match id {
            PropertyId::State(index) => &self.0.states[index].name,
            PropertyId::Computed(index) => &self.0.computeds[index].name,
        }
    }
    pub fn slot_count(&self) -> usize {
        self.0.states.len() + self.0.computeds.len()
    }
}
impl<V: Value> std::fmt::Debug for ModelType<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelType")
            .field("states", &self.0.spec.state_names().collect::<Vec<_>>())
            .field("computed", &self.0.spec.computed_names().collect::<Vec<_>>())
            .finish()
    }
}

fn claim_name(ids: &mut HashMap<String, PropertyId>, name: &str, id: PropertyId) -> Result<()> {
    if name.is_empty() {
        return Err(Error::configuration(name, "property name is empty"));
    }
    if ids.insert(name.to_owned(), id).is_some() {
        return Err(Error::configuration(
            name,
            "declared as both a state and a computed property",
        ));
    }
    Ok(())
}

fn claim_key(keys: &mut HashMap<String, String>, key: &str, name: &str) -> Result<()> {
    if let Some(owner) = keys.insert(key.to_owned(), name.to_owned()) {
        return Err(Error::configuration(
            name,
            format!("internal key `{key}` is already used by `{owner}`"),
        ));
    }
    Ok(())
}

fn normalize_state<V: Value>(
    name: &str,
    spec: &StateSpec<V>,
    slot: usize,
) -> Result<StateDescriptor<V>> {
    let o = &spec.options;
    let behavior = match &o.read_only_set_behavior {
        Some(s) => Some(s.parse::<ReadOnlySetBehavior>().map_err(|_| {
            Error::configuration(name, format!("invalid read-only set behavior `{s}`"))
        })?),
        None => None,
    };
    let behavior = if o.read_only.is_read_only() {
        Some(behavior.unwrap_or_default())
    } else {
        behavior
    };
    let read_only_set_event_name = if behavior == Some(ReadOnlySetBehavior::Event) {
        Some(
            o.read_only_set_event_name
                .clone()
                .unwrap_or_else(|| format!("{name}ReadOnlySet")),
        )
    } else {
        None
    };
    Ok(StateDescriptor {
        name: name.to_owned(),
        internal_key: o
            .internal_key
            .clone()
            .unwrap_or_else(|| format!("{STATE_KEY_PREFIX}{name}")),
        slot,
        change_event_name: o
            .change_event_name
            .clone()
            .unwrap_or_else(|| format!("{name}Change")),
        read_only: o.read_only,
        read_only_set_behavior: behavior,
        read_only_set_event_name,
        allow_public_subscription: o.allow_public_subscription,
        allow_public_unsubscription: o.allow_public_unsubscription,
        init: spec.init.clone(),
        validate: spec.validate.clone(),
        transform: spec.transform.clone(),
        getter: spec.getter.clone(),
        on_complete: spec
            .on_complete
            .clone()
            .unwrap_or_else(|| {
                Rc::new(|m: &Model<V>, c: &PropertyChange<V>| m.complete_state_change(c))
            }),
    })
}

fn normalize_computed<V: Value>(
    name: &str,
    spec: &ComputedSpec<V>,
    slot: usize,
) -> Result<ComputedDescriptor<V>> {
    let o = &spec.options;
    Ok(ComputedDescriptor {
        name: name.to_owned(),
        internal_key: o
            .internal_key
            .clone()
            .unwrap_or_else(|| format!("{COMPUTED_KEY_PREFIX}{name}")),
        slot,
        change_event_name: o
            .change_event_name
            .clone()
            .unwrap_or_else(|| format!("{name}Change")),
        eager: !o.lazy,
        allow_public_subscription: o.allow_public_subscription,
        allow_public_unsubscription: o.allow_public_unsubscription,
        compute: spec.compute.clone(),
        on_complete: spec
            .on_complete
            .clone()
            .unwrap_or_else(|| {
                Rc::new(|m: &Model<V>, c: &PropertyChange<V>| m.complete_computed_change(c))
            }),
        on_cleanup: spec
            .on_cleanup
            .clone()
            .unwrap_or_else(|| {
                Rc::new(|m: &Model<V>, c: &PropertyChange<V>| m.cleanup_computed_change(c))
            }),
    })
}
