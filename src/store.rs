//! Observable value container.
//!
//! A [`Store`] holds a current value and an ordered registry of subscribers.
//! Every mutation notifies all subscribers in subscription order, and a late
//! subscriber immediately receives the current value. This is the reactive
//! primitive the event-stream stores are built on.

use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct StoreState<T> {
    value: T,
    subscribers: Vec<(u64, Callback<T>)>,
    next_id: u64,
}

/// Shared observable value.
///
/// Cloning a `Store` yields another handle to the same value and subscriber
/// registry. Subscriber callbacks run while the store lock is held, which is
/// what makes notification order deterministic; callbacks must not call back
/// into the same store.
pub struct Store<T> {
    state: Arc<Mutex<StoreState<T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> Store<T> {
    /// Creates a store holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                value: initial,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replaces the current value and notifies subscribers in order.
    pub fn set(&self, value: T) {
        let mut state = self.lock();
        state.value = value;
        notify_all(&state);
    }

    /// Mutates the current value in place and notifies subscribers in order.
    pub fn update(&self, mutate: impl FnOnce(&mut T)) {
        self.update_if(|value| {
            mutate(value);
            true
        });
    }

    /// Mutates the current value, notifying subscribers only when `mutate`
    /// reports that it changed something.
    ///
    /// Used by event listeners that drop irrelevant payloads (for example a
    /// search reply with a stale ticket): a dropped payload is not an update
    /// and must not wake subscribers.
    pub fn update_if(&self, mutate: impl FnOnce(&mut T) -> bool) {
        let mut state = self.lock();
        if mutate(&mut state.value) {
            notify_all(&state);
        }
    }

    /// Registers a subscriber and immediately invokes it with the current
    /// value.
    ///
    /// The returned [`Subscription`] detaches the callback when cancelled or
    /// dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription
    where
        T: Send + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push((id, Arc::clone(&callback)));
            callback(&state.value);
            id
        };

        let state = Arc::downgrade(&self.state);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(state) = Weak::upgrade(&state) {
                    let mut state = match state.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    state.subscribers.retain(|(sub_id, _)| *sub_id != id);
                }
            })),
        }
    }

    /// Returns the number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState<T>> {
        // Subscriber callbacks are not allowed to panic into the store, and
        // a poisoned registry would only ever drop notifications silently.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn notify_all<T>(state: &StoreState<T>) {
    for (_, callback) in &state.subscribers {
        callback(&state.value);
    }
}

/// Disposer handle for a store subscription.
///
/// Cancelling is idempotent; dropping the handle also detaches the callback.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Detaches the subscriber. Safe to call on an already-detached handle.
    pub fn cancel(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::Store;

    fn recorder() -> (Arc<Mutex<Vec<i32>>>, impl Fn(&i32) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |value: &i32| sink.lock().unwrap().push(*value))
    }

    #[test]
    fn late_subscriber_receives_current_value() {
        let store = Store::new(7);
        let (seen, callback) = recorder();
        let _sub = store.subscribe(callback);
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn subscribers_observe_updates_in_applied_order() {
        let store = Store::new(0);
        let (seen, callback) = recorder();
        let _sub = store.subscribe(callback);

        store.set(1);
        store.update(|v| *v += 10);
        store.set(3);

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 11, 3]);
        assert_eq!(store.get(), 3);
    }

    #[test]
    fn notification_order_follows_subscription_order() {
        let store = Store::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        let _a = store.subscribe(move |_| first.lock().unwrap().push("a"));
        let second = Arc::clone(&order);
        let _b = store.subscribe(move |_| second.lock().unwrap().push("b"));

        order.lock().unwrap().clear();
        store.set(1);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn cancelled_subscription_stops_receiving() {
        let store = Store::new(0);
        let (seen, callback) = recorder();
        let mut sub = store.subscribe(callback);

        store.set(1);
        sub.cancel();
        sub.cancel(); // idempotent
        store.set(2);

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn dropping_subscription_detaches() {
        let store = Store::new(0);
        let (seen, callback) = recorder();
        {
            let _sub = store.subscribe(callback);
            store.set(1);
        }
        store.set(2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
