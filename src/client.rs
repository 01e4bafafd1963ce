/*!

The connection state machine.

A [`Client`] owns the registered connector list, the currently active
connector, the connection status and the session data. It probes the
registered connectors at startup ([`Client::auto_connect`]), funnels the
active connector's lifecycle events back into its own state, and republishes
every state change to its subscribers.

All of it is single-threaded: a `Client` is a cheap handle (cloning it yields
another handle onto the same state) and every mutation is serialized through
[`Client::set_state`].

*/

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    connector::{Connector, ConnectorData},
    error::{ClientNotFoundError, ConnectorError},
    events::{ConnectorEvent, EventSubscription},
};

/// Connection status of a [`Client`]. Exactly one value is active at a
/// time; only the client mutates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    /// Resuming a session whose account key is already known. Purely
    /// informational for UIs; the transition logic is the same as
    /// [`ConnectionStatus::Connecting`].
    Reconnecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// Aggregate state owned by a [`Client`].
///
/// Created once at construction, mutated exclusively through
/// [`Client::set_state`], alive for as long as the client is.
#[derive(Clone)]
pub struct ClientState {
    /// Registered connectors, in registration order. Fixed at
    /// construction: publishes cannot replace this list.
    pub connectors: Vec<Rc<dyn Connector>>,
    /// The adopted connector, while a session is active.
    pub connector: Option<Rc<dyn Connector>>,
    /// Session payload, while a session is active.
    pub data: Option<ConnectorData>,
    pub status: ConnectionStatus,
    /// Whether a probe was requested at construction.
    pub auto_connect: bool,
}

impl ClientState {
    /// The active account key, when the session holds one.
    pub fn active_key(&self) -> Option<&str> {
        self.data.as_ref()?.active_key.as_deref()
    }
}

impl fmt::Debug for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connectors: Vec<&str> = self.connectors.iter().map(|c| c.id()).collect();

        f.debug_struct("ClientState")
            .field("connectors", &connectors)
            .field("connector", &self.connector.as_ref().map(|c| c.id()))
            .field("data", &self.data)
            .field("status", &self.status)
            .field("auto_connect", &self.auto_connect)
            .finish()
    }
}

/// Construction parameters for [`Client::new`].
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Connectors the client may adopt, in probing order.
    pub connectors: Vec<Rc<dyn Connector>>,
    /// Schedule a silent [`Client::auto_connect`] probe right after
    /// construction.
    pub auto_connect: bool,
}

struct StateListener {
    id: u64,
    notify: Box<dyn Fn(&ClientState, &ClientState)>,
}

struct Store {
    state: RefCell<ClientState>,
    listeners: RefCell<Vec<Rc<StateListener>>>,
    next_id: Cell<u64>,
}

impl Store {
    fn new(initial: ClientState) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(initial),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    fn snapshot(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Apply `updater` to the current state and notify every listener,
    /// synchronously, with the new and previous snapshots.
    fn publish(&self, updater: impl FnOnce(&ClientState) -> ClientState) {
        let old = self.snapshot();
        let mut new = updater(&old);

        // the registered list is fixed at construction
        new.connectors = old.connectors.clone();
        // no session at all: connector and data drop together, never
        // independently
        if new.status == ConnectionStatus::Disconnected {
            new.connector = None;
            new.data = None;
        }

        *self.state.borrow_mut() = new;
        let new = self.snapshot();

        // snapshot the listeners too: one of them may (un)subscribe or
        // publish again while we iterate
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            (listener.notify)(&new, &old);
        }
    }

    fn register(
        self: &Rc<Self>,
        notify: impl Fn(&ClientState, &ClientState) + 'static,
    ) -> StateSubscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push(Rc::new(StateListener {
            id,
            notify: Box::new(notify),
        }));

        StateSubscription {
            store: Rc::downgrade(self),
            id,
        }
    }

    /// Listener over a projection of the state: fires only when the
    /// selected value changes.
    fn register_selector<T, S, F>(self: &Rc<Self>, selector: S, listener: F) -> StateSubscription
    where
        T: Clone + PartialEq + 'static,
        S: Fn(&ClientState) -> T + 'static,
        F: FnMut(&T, &T) + 'static,
    {
        let previous = RefCell::new(selector(&self.state.borrow()));
        let listener = RefCell::new(listener);

        self.register(move |new_state, _old_state| {
            let selected = selector(new_state);
            let previous_value = {
                let mut previous = previous.borrow_mut();
                if *previous == selected {
                    return;
                }
                std::mem::replace(&mut *previous, selected.clone())
            };

            // a listener publishing again would re-enter itself through the
            // nested notification; skip the nested call
            if let Ok(mut listener) = listener.try_borrow_mut() {
                (listener)(&selected, &previous_value);
            }
        })
    }
}

/// Scoped ownership of a listener registered with [`Client::subscribe`] or
/// [`Client::subscribe_with`]. Dropping it releases the listener.
#[must_use = "dropping the subscription releases the listener"]
pub struct StateSubscription {
    store: Weak<Store>,
    id: u64,
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.listeners.borrow_mut().retain(|l| l.id != self.id);
        }
    }
}

/// Selector over the active connector. Two states select equal when they
/// hold the very same connector instance.
#[derive(Clone)]
struct ActiveConnector(Option<Rc<dyn Connector>>);

impl PartialEq for ActiveConnector {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// The single state owner coordinating connector selection, connection
/// status and session data.
///
/// ```no_run
/// use std::rc::Rc;
///
/// use casper_connector::{CasperSignerConnector, Client, ClientConfig, Connector};
///
/// let client = Client::new(ClientConfig {
///     connectors: vec![Rc::new(CasperSignerConnector::new()) as Rc<dyn Connector>],
///     auto_connect: true,
/// });
///
/// let _watch = client.subscribe_with(
///     |state| state.status,
///     |status, _previous| println!("status: {status}"),
/// );
/// ```
#[derive(Clone)]
pub struct Client {
    store: Rc<Store>,
    is_auto_connecting: Rc<Cell<bool>>,
    active_events: Rc<RefCell<Option<EventSubscription>>>,
    /// Keeps the active-connector watch registered for the lifetime of the
    /// client (all handles share it).
    _wiring: Rc<StateSubscription>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .finish()
    }
}

impl Client {
    /// Build a client over the given connectors.
    ///
    /// Never blocks and always returns with status
    /// [`ConnectionStatus::Disconnected`]: when `auto_connect` is set, the
    /// probe is deferred to run after construction completes (browser
    /// targets only; elsewhere call [`Client::auto_connect`] yourself).
    pub fn new(config: ClientConfig) -> Self {
        let ClientConfig {
            connectors,
            auto_connect,
        } = config;

        let store = Store::new(ClientState {
            connectors,
            connector: None,
            data: None,
            status: ConnectionStatus::Disconnected,
            auto_connect,
        });
        let active_events = Rc::new(RefCell::new(None));
        let wiring = watch_active_connector(&store, &active_events);

        let client = Self {
            store,
            is_auto_connecting: Rc::new(Cell::new(false)),
            active_events,
            _wiring: Rc::new(wiring),
        };

        #[cfg(target_arch = "wasm32")]
        if auto_connect {
            let probe = client.clone();
            wasm_bindgen_futures::spawn_local(async move {
                probe.auto_connect().await;
            });
        }

        client
    }

    /// Snapshot of the full state.
    pub fn state(&self) -> ClientState {
        self.store.snapshot()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.store.state.borrow().status
    }

    pub fn data(&self) -> Option<ConnectorData> {
        self.store.state.borrow().data.clone()
    }

    /// The adopted connector, while a session is active.
    pub fn connector(&self) -> Option<Rc<dyn Connector>> {
        self.store.state.borrow().connector.clone()
    }

    /// The registered connectors, in registration order.
    pub fn connectors(&self) -> Vec<Rc<dyn Connector>> {
        self.store.state.borrow().connectors.clone()
    }

    /// Observe every state change. The listener receives the new and the
    /// previous snapshot, synchronously, after the full update is applied.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ClientState, &ClientState) + 'static,
    ) -> StateSubscription {
        self.store.register(listener)
    }

    /// Observe a projection of the state: the listener only fires when the
    /// selected value changes, with the new and previous selection.
    pub fn subscribe_with<T, S, F>(&self, selector: S, listener: F) -> StateSubscription
    where
        T: Clone + PartialEq + 'static,
        S: Fn(&ClientState) -> T + 'static,
        F: FnMut(&T, &T) + 'static,
    {
        self.store.register_selector(selector, listener)
    }

    /// Apply an update computed from the prior state.
    ///
    /// Every mutation funnels through here, so every transition is
    /// observable uniformly. Publishing
    /// [`ConnectionStatus::Disconnected`] drops the connector and the data
    /// together.
    pub fn set_state(&self, updater: impl FnOnce(&ClientState) -> ClientState) {
        self.store.publish(updater);
    }

    /// Reset `connector` and `data` to absent. `status` and `connectors`
    /// are left untouched.
    pub fn clear_state(&self) {
        self.set_state(|state| ClientState {
            connector: None,
            data: None,
            ..state.clone()
        });
    }

    /// Silently probe the registered connectors, in registration order, for
    /// an existing session and adopt the first live one.
    ///
    /// No-op while a probe is already in flight or the client is already
    /// connected. A candidate that reports a live session but then fails to
    /// connect (or to report its key) is skipped: one bad backend never
    /// blocks discovery of a working one. When no candidate is adopted the
    /// status resolves to [`ConnectionStatus::Disconnected`].
    ///
    /// Returns the session data, when a session is active.
    pub async fn auto_connect(&self) -> Option<ConnectorData> {
        if self.is_auto_connecting.get() || self.status() == ConnectionStatus::Connected {
            return self.data();
        }
        self.is_auto_connecting.set(true);

        self.set_state(|state| ClientState {
            status: resuming_status(state),
            ..state.clone()
        });

        let mut adopted = false;
        for connector in self.connectors() {
            if !connector.is_connected().await {
                continue;
            }

            if let Err(error) = connector.connect().await {
                log::warn!("skipping connector `{}': {error}", connector.id());
                continue;
            }
            let active_key = match connector.get_active_public_key().await {
                Ok(active_key) => active_key,
                Err(error) => {
                    log::warn!("skipping connector `{}': {error}", connector.id());
                    continue;
                }
            };

            log::debug!("adopting connector `{}'", connector.id());
            self.adopt(&connector, active_key);
            adopted = true;
            break;
        }

        if !adopted {
            self.set_state(|state| ClientState {
                status: ConnectionStatus::Disconnected,
                ..state.clone()
            });
        }

        self.is_auto_connecting.set(false);

        self.data()
    }

    /// Explicitly connect through the given connector.
    ///
    /// On failure the pre-call status is restored and the rejection is left
    /// for the caller to report.
    pub async fn connect(
        &self,
        connector: Rc<dyn Connector>,
    ) -> Result<ConnectorData, ConnectorError> {
        let entry_status = self.status();

        self.set_state(|state| ClientState {
            status: resuming_status(state),
            ..state.clone()
        });

        let connected = async {
            connector.connect().await?;
            connector.get_active_public_key().await
        }
        .await;

        match connected {
            Ok(active_key) => {
                self.adopt(&connector, active_key);
                Ok(self.data().unwrap_or_default())
            }
            Err(error) => {
                self.set_state(|state| ClientState {
                    status: entry_status,
                    ..state.clone()
                });
                Err(error)
            }
        }
    }

    /// End the active session: ask the adopted connector to disconnect and
    /// resolve the status to [`ConnectionStatus::Disconnected`].
    ///
    /// A no-op without an active connector. The local session ends even
    /// when the backend refuses to.
    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        let Some(connector) = self.connector() else {
            return Ok(());
        };

        let disconnected = connector.disconnect().await;

        self.set_state(|state| ClientState {
            status: ConnectionStatus::Disconnected,
            ..state.clone()
        });

        disconnected
    }

    /// Single atomic publish adopting `connector` with its account key.
    fn adopt(&self, connector: &Rc<dyn Connector>, active_key: String) {
        self.set_state(|state| {
            let mut data = state.data.clone().unwrap_or_default();
            data.active_key = Some(active_key);

            ClientState {
                status: ConnectionStatus::Connected,
                connector: Some(Rc::clone(connector)),
                data: Some(data),
                ..state.clone()
            }
        });
    }
}

/// [`ConnectionStatus::Reconnecting`] when the prior session data already
/// holds an account key, [`ConnectionStatus::Connecting`] otherwise.
fn resuming_status(state: &ClientState) -> ConnectionStatus {
    if state.active_key().is_some() {
        ConnectionStatus::Reconnecting
    } else {
        ConnectionStatus::Connecting
    }
}

/// Watch the active connector and keep exactly one subscription onto its
/// event bus: the previous subscription is released before the next one is
/// acquired, so handlers never accumulate across connector swaps.
fn watch_active_connector(
    store: &Rc<Store>,
    active_events: &Rc<RefCell<Option<EventSubscription>>>,
) -> StateSubscription {
    let weak_store = Rc::downgrade(store);
    let active_events = Rc::clone(active_events);

    store.register_selector(
        |state| ActiveConnector(state.connector.clone()),
        move |active: &ActiveConnector, _previous: &ActiveConnector| {
            active_events.borrow_mut().take();

            let Some(connector) = &active.0 else {
                return;
            };

            let store = weak_store.clone();
            let subscription = connector.events().subscribe(move |event| {
                let Some(store) = store.upgrade() else {
                    return;
                };

                match event {
                    ConnectorEvent::Changed(change) => {
                        let incoming = ConnectorData::from(change.clone());
                        store.publish(|state| {
                            let mut data = state.data.clone().unwrap_or_default();
                            data.merge(incoming);

                            ClientState {
                                data: Some(data),
                                ..state.clone()
                            }
                        });
                    }
                    ConnectorEvent::Connected(change) => {
                        let incoming = ConnectorData::from(change.clone());
                        store.publish(|state| {
                            let mut data = state.data.clone().unwrap_or_default();
                            data.merge(incoming);

                            ClientState {
                                status: ConnectionStatus::Connected,
                                data: Some(data),
                                ..state.clone()
                            }
                        });
                    }
                    ConnectorEvent::Disconnected => {
                        // clear-state semantics: the status is only changed
                        // by explicit transitions
                        store.publish(|state| ClientState {
                            connector: None,
                            data: None,
                            ..state.clone()
                        });
                    }
                }
            });

            *active_events.borrow_mut() = Some(subscription);
        },
    )
}

/// Explicitly constructed slot a [`Client`] is installed into and observed
/// through.
///
/// Replaces a hidden process-wide singleton: the slot is created by the
/// application, passed to whoever needs the client, and observing it before
/// a client was installed fails with [`ClientNotFoundError`].
#[derive(Clone, Default)]
pub struct ClientSlot {
    inner: Rc<RefCell<Option<Client>>>,
}

impl ClientSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `client` the one observable through this slot.
    pub fn install(&self, client: Client) {
        *self.inner.borrow_mut() = Some(client);
    }

    /// A handle onto the installed client.
    pub fn get(&self) -> Result<Client, ClientNotFoundError> {
        self.inner.borrow().clone().ok_or(ClientNotFoundError)
    }

    /// Tear the installed client down. [`ClientSlot::get`] fails again
    /// until a new client is installed.
    pub fn take(&self) -> Option<Client> {
        self.inner.borrow_mut().take()
    }
}
