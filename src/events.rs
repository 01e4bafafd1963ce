/*!

Neutral lifecycle signals emitted by a [`Connector`].

Each connector owns its own [`EventBus`] and republishes the backend's native
notifications on it, so consumers never have to know the backend's event
names, and two clients in the same page cannot observe each other's
connectors.

[`Connector`]: crate::Connector

*/

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

/// Account-level payload carried by [`ConnectorEvent::Connected`] and
/// [`ConnectorEvent::Changed`].
///
/// Deserializes from the `detail` object the wallet extensions attach to
/// their events (`{ activeKey, isConnected }`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountChange {
    pub active_key: String,
    pub is_connected: bool,
}

/// A lifecycle signal republished by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectorEvent {
    /// The backend accepted a connection.
    Connected(AccountChange),
    /// The active account changed.
    Changed(AccountChange),
    /// The backend ended the session.
    Disconnected,
}

struct Listener {
    id: u64,
    callback: Box<dyn Fn(&ConnectorEvent)>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<Rc<Listener>>,
}

/// A single-threaded publish/subscribe channel for [`ConnectorEvent`]s.
///
/// Cloning the bus yields another handle onto the same channel. Listeners
/// are invoked synchronously, in subscription order, against a snapshot
/// taken when [`EventBus::emit`] is called: a listener may subscribe or
/// unsubscribe without corrupting an in-flight emit.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event emitted on this bus.
    ///
    /// The listener stays registered for as long as the returned
    /// [`EventSubscription`] is alive; dropping the subscription releases it.
    pub fn subscribe(&self, listener: impl Fn(&ConnectorEvent) + 'static) -> EventSubscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(Rc::new(Listener {
            id,
            callback: Box::new(listener),
        }));

        EventSubscription {
            bus: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver an event to every registered listener.
    pub fn emit(&self, event: &ConnectorEvent) {
        // snapshot first: a listener is allowed to touch the bus
        let listeners = self.inner.borrow().listeners.clone();
        for listener in listeners {
            (listener.callback)(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scoped ownership of a listener registered with [`EventBus::subscribe`].
///
/// Dropping the subscription removes the listener from the bus.
#[must_use = "dropping the subscription releases the listener"]
pub struct EventSubscription {
    bus: Weak<RefCell<BusInner>>,
    id: u64,
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.borrow_mut().listeners.retain(|l| l.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn change(active_key: &str) -> ConnectorEvent {
        ConnectorEvent::Changed(AccountChange {
            active_key: active_key.to_owned(),
            is_connected: true,
        })
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let seen = Rc::clone(&seen);
            bus.subscribe(move |_| seen.borrow_mut().push("first"))
        };
        let second = {
            let seen = Rc::clone(&seen);
            bus.subscribe(move |_| seen.borrow_mut().push("second"))
        };

        bus.emit(&ConnectorEvent::Disconnected);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);

        drop(first);
        drop(second);
    }

    #[test]
    fn dropping_the_subscription_releases_the_listener() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(0));

        let subscription = {
            let seen = Rc::clone(&seen);
            bus.subscribe(move |_| *seen.borrow_mut() += 1)
        };
        assert_eq!(bus.len(), 1);

        bus.emit(&change("0111"));
        drop(subscription);
        assert!(bus.is_empty());

        bus.emit(&change("0122"));
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn listener_may_unsubscribe_during_emit() {
        let bus = EventBus::new();
        let slot: Rc<RefCell<Option<EventSubscription>>> = Rc::new(RefCell::new(None));

        let subscription = {
            let slot = Rc::clone(&slot);
            bus.subscribe(move |_| {
                // releasing our own registration mid-delivery must not panic
                slot.borrow_mut().take();
            })
        };
        *slot.borrow_mut() = Some(subscription);

        bus.emit(&ConnectorEvent::Disconnected);
        assert!(bus.is_empty());
    }

    #[test]
    fn account_change_decodes_from_camel_case_detail() {
        let detail: AccountChange = serde_json::from_value(serde_json::json!({
            "activeKey": "0199..ab",
            "isConnected": true,
        }))
        .unwrap();

        assert_eq!(detail.active_key, "0199..ab");
        assert!(detail.is_connected);
    }
}
