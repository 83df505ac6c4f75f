use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use derive_ex::derive_ex;
use serde::Deserialize;
use slabmap::SlabMap;

use crate::{Error, Result, Subscription};


/// Default action of an event, run unless a subscriber prevents or stops it.
pub type CompleteFn<D> = Rc<dyn Fn(&mut Event<D>) -> Result<()>>;

/// Runs instead of the default action when an event does not complete.
pub type CleanupFn<D> = Rc<dyn Fn(&Event<D>)>;

type SubscriberFn<D> = Rc<dyn Fn(&mut Event<D>)>;

/// Per-event dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventConfig {
    pub allow_public_subscription: bool,
    pub allow_public_unsubscription: bool,
    /// Run the default action for the first publication that is not prevented, even if that action fails.
    pub complete_once: bool,
}
impl EventConfig {
    pub const fn new() -> Self {
        Self {
            allow_public_subscription: true,
            allow_public_unsubscription: true,
            complete_once: false,
        }
    }
}
impl Default for EventConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// When a subscriber is called relative to the default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before the default action. The subscriber may alter the payload or cancel the action.
    On,
    /// After the default action completed.
    After,
}

/// A published event as seen by subscribers and handlers.
pub struct Event<D> {
    name: Rc<str>,
    pub data: D,
    prevented: bool,
    stopped: bool,
    completed: bool,
}

impl<D> Event<D> {
    fn new(name: Rc<str>, data: D) -> Self {
        Self {
            name,
            data,
            prevented: false,
            stopped: false,
            completed: false,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the default action. Remaining subscribers are still called.
    pub fn prevent(&mut self) {
        self.prevented = true;
    }

    /// Cancels the default action and skips the remaining subscribers.
    pub fn stop(&mut self) {
        self.prevented = true;
        self.stopped = true;
    }
    pub fn is_prevented(&self) -> bool {
        self.prevented
    }
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}
impl<D: std::fmt::Debug> std::fmt::Debug for Event<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("prevented", &self.prevented)
            .field("completed", &self.completed)
            .finish()
    }
}

/// Named-event publisher with synchronous, registration-order delivery.
#[derive_ex(Clone, bound())]
pub struct Dispatcher<D: 'static>(Rc<DispatcherNode<D>>);

impl<D: 'static> Dispatcher<D> {
    pub fn new() -> Self {
        Self(Rc::new(DispatcherNode {
            events: RefCell::new(HashMap::new()),
            next_seq: Cell::new(0),
        }))
    }

    /// Configures an event and its default action.
    ///
    /// Redefining an event keeps its subscribers.
    pub fn define(
        &self,
        name: &str,
        config: EventConfig,
        complete: Option<CompleteFn<D>>,
        cleanup: Option<CleanupFn<D>>,
    ) {
        let mut events = self.0.events.borrow_mut();
        let entry = events
            .entry(name.to_owned())
            .or_insert_with(|| EventEntry::new(name));
        entry.config = config;
        entry.complete = complete;
        entry.cleanup = cleanup;
        entry.completed = false;
    }

    /// Registers a subscriber, honoring the event's public subscription policy.
    pub fn subscribe(
        &self,
        name: &str,
        stage: Stage,
        f: impl Fn(&mut Event<D>) + 'static,
    ) -> Result<Subscription> {
        let config = self.config(name);
        if !config.allow_public_subscription {
            return Err(Error::SubscriptionDenied {
                event: name.to_owned(),
            });
        }
        let key = self.insert(name, stage, Rc::new(f));
        if !config.allow_public_unsubscription {
            return Ok(Subscription::empty());
        }
        let name = name.to_owned();
        Ok(Subscription::from_weak_fn(
            Rc::downgrade(&self.0),
            move |node: Rc<DispatcherNode<D>>| node.remove(&name, key),
        ))
    }

    pub fn config(&self, name: &str) -> EventConfig {
        self.0
            .events
            .borrow()
            .get(name)
            .map(|e| e.config)
            .unwrap_or_default()
    }
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.0
            .events
            .borrow()
            .get(name)
            .map_or(0, |e| e.subscribers.len())
    }

    /// Removes every subscriber of every event.
    pub fn clear_subscribers(&self) {
        for entry in self.0.events.borrow_mut().values_mut() {
            entry.subscribers.clear();
        }
    }

    /// Delivers `data` to the subscribers of `name` and runs the default action.
    ///
    /// No borrow of the dispatcher is held while subscribers or handlers run,
    /// so they may publish or subscribe recursively.
    /// Errors returned by the default action are returned from here; panics raised by subscribers unwind through.
    pub fn publish(&self, name: &str, data: D) -> Result<Event<D>> {
        let snapshot = self.snapshot(name);
        tracing::trace!(
            event = name,
            subscribers = snapshot.on.len() + snapshot.after.len(),
            "dispatch"
        );
        let mut event = Event::new(snapshot.name, data);
        for f in &snapshot.on {
            if event.stopped {
                break;
            }
            f(&mut event);
        }
        if event.prevented || snapshot.complete_blocked {
            if let Some(cleanup) = &snapshot.cleanup {
                cleanup(&event);
            }
            return Ok(event);
        }
        if let Some(entry) = self.0.events.borrow_mut().get_mut(name) {
            entry.completed = true;
        }
        if let Some(complete) = &snapshot.complete {
            complete(&mut event)?;
        }
        event.completed = true;
        for f in &snapshot.after {
            f(&mut event);
        }
        Ok(event)
    }

    fn insert(&self, name: &str, stage: Stage, f: SubscriberFn<D>) -> usize {
        let seq = self.0.next_seq.get();
        self.0.next_seq.set(seq + 1);
        self.0
            .events
            .borrow_mut()
            .entry(name.to_owned())
            .or_insert_with(|| EventEntry::new(name))
            .subscribers
            .insert(Subscriber { seq, stage, f })
    }
    fn snapshot(&self, name: &str) -> Snapshot<D> {
        let events = self.0.events.borrow();
        let Some(entry) = events.get(name) else {
            return Snapshot {
                name: name.into(),
                on: Vec::new(),
                after: Vec::new(),
                complete: None,
                cleanup: None,
                complete_blocked: false,
            };
        };
        let mut subscribers: Vec<&Subscriber<D>> = entry.subscribers.values().collect();
        subscribers.sort_by_key(|s| s.seq);
        let select = |stage: Stage| -> Vec<SubscriberFn<D>> {
            subscribers
                .iter()
                .filter(|s| s.stage == stage)
                .map(|s| s.f.clone())
                .collect()
        };
        Snapshot {
            name: entry.name.clone(),
            on: select(Stage::On),
            after: select(Stage::After),
            complete: entry.complete.clone(),
            cleanup: entry.cleanup.clone(),
            complete_blocked: entry.config.complete_once && entry.completed,
        }
    }
}
impl<D: 'static> Default for Dispatcher<D> {
    fn default() -> Self {
        Self::new()
    }
}
impl<D: 'static> std::fmt::Debug for Dispatcher<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events = self.0.events.borrow();
        let mut names: Vec<&str> = events.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("Dispatcher").field("events", &names).finish()
    }
}

struct DispatcherNode<D: 'static> {
    events: RefCell<HashMap<String, EventEntry<D>>>,
    next_seq: Cell<u64>,
}
impl<D: 'static> DispatcherNode<D> {
    fn remove(&self, name: &str, key: usize) {
        if let Some(entry) = self.events.borrow_mut().get_mut(name) {
            entry.subscribers.remove(key);
        }
    }
}

struct EventEntry<D: 'static> {
    name: Rc<str>,
    config: EventConfig,
    complete: Option<CompleteFn<D>>,
    cleanup: Option<CleanupFn<D>>,
    completed: bool,
    subscribers: SlabMap<Subscriber<D>>,
}
impl<D: 'static> EventEntry<D> {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            config: EventConfig::new(),
            complete: None,
            cleanup: None,
            completed: false,
            subscribers: SlabMap::new(),
        }
    }
}

struct Subscriber<D: 'static> {
    seq: u64,
    stage: Stage,
    f: SubscriberFn<D>,
}

struct Snapshot<D: 'static> {
    name: Rc<str>,
    on: Vec<SubscriberFn<D>>,
    after: Vec<SubscriberFn<D>>,
    complete: Option<CompleteFn<D>>,
    cleanup: Option<CleanupFn<D>>,
    complete_blocked: bool,
}
