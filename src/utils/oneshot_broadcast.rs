use std::{
    cell::RefCell,
    future::poll_fn,
    mem::take,
    rc::Rc,
    task::{Poll, Waker},
};

use derive_ex::derive_ex;
use slabmap::SlabMap;


struct Slot<T> {
    value: Option<T>,
    wakers: SlabMap<Waker>,
}

/// Single-value channel whose value is observed by every receiver.
pub fn oneshot_broadcast<T>() -> (Sender<T>, Receiver<T>) {
    let slot = Rc::new(RefCell::new(Slot {
        value: None,
        wakers: SlabMap::new(),
    }));
    (Sender(slot.clone()), Receiver(slot))
}

pub struct Sender<T>(Rc<RefCell<Slot<T>>>);

impl<T> Sender<T> {
    /// Stores the value and wakes every pending receiver. Later sends are ignored.
    pub fn send(&self, value: T) {
        let wakers = {
            let mut slot = self.0.borrow_mut();
            if slot.value.is_some() {
                return;
            }
            slot.value = Some(value);
            take(&mut slot.wakers)
        };
        for (_, waker) in wakers {
            waker.wake();
        }
    }
}

#[derive_ex(Clone, bound())]
pub struct Receiver<T>(Rc<RefCell<Slot<T>>>);

impl<T: Clone> Receiver<T> {
    pub fn get(&self) -> Option<T> {
        self.0.borrow().value.clone()
    }
    pub async fn recv(&self) -> T {
        let mut key = WakerKeyGuard::new(self);
        poll_fn(|cx| {
            let mut slot = self.0.borrow_mut();
            if let Some(value) = &slot.value {
                Poll::Ready(value.clone())
            } else {
                if let Some(key) = key.key {
                    slot.wakers[key].clone_from(cx.waker());
                } else {
                    key.key = Some(slot.wakers.insert(cx.waker().clone()));
                }
                Poll::Pending
            }
        })
        .await
    }
}

struct WakerKeyGuard<'a, T> {
    receiver: &'a Receiver<T>,
    key: Option<usize>,
}
impl<'a, T> WakerKeyGuard<'a, T> {
    fn new(receiver: &'a Receiver<T>) -> Self {
        Self {
            receiver,
            key: None,
        }
    }
}
impl<T> Drop for WakerKeyGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            if let Ok(mut slot) = self.receiver.0.try_borrow_mut() {
                slot.wakers.remove(key);
            }
        }
    }
}
