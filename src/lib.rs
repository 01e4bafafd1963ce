/*!

# Casper Connector

This library is meant to be used for web applications that need to interact
with Casper wallets. It manages the connection to one of several wallet
backends (the Casper Signer browser extension being the reference one),
tracking the connection status, the active account key and the
autoconnect-on-load behaviour.

## Features

- Uniform [`Connector`] contract over concrete wallet backends
- A [`Client`] state machine probing the registered connectors at startup
  and adopting the first live session
- Typed lifecycle events ([`ConnectorEvent`]) republished on a per-connector
  [`EventBus`], no process-wide cross-talk
- Selector-based state subscriptions with scoped release

## Usage

Build a client over the connectors your application supports:

```no_run
use std::rc::Rc;

use casper_connector::{CasperSignerConnector, Client, ClientConfig, Connector};

let client = Client::new(ClientConfig {
    connectors: vec![Rc::new(CasperSignerConnector::new()) as Rc<dyn Connector>],
    auto_connect: true,
});
```

With `auto_connect` set, the client silently probes each registered connector
for an existing session right after construction and adopts the first live
one. Observe the outcome (and every later transition) through a
subscription:

```no_run
# use casper_connector::{Client, ClientConfig};
# let client = Client::new(ClientConfig::default());
let watch = client.subscribe_with(
    |state| state.status,
    |status, _previous| println!("status: {status}"),
);
# drop(watch);
```

Dropping the returned handle releases the subscription.

Applications that want a single client reachable from everywhere install it
into an explicitly passed [`ClientSlot`]; observing the slot before a client
was installed fails with [`ClientNotFoundError`].

```no_run
use casper_connector::{Client, ClientConfig, ClientSlot};

# fn main() -> anyhow::Result<()> {
let slot = ClientSlot::new();
slot.install(Client::new(ClientConfig::default()));

let client = slot.get()?;
# Ok(()) }
```

*/

mod client;
mod connector;
pub mod error;
pub mod events;
pub mod ffi;

pub use self::{
    client::{Client, ClientConfig, ClientSlot, ClientState, ConnectionStatus, StateSubscription},
    connector::{
        CasperSignerConnector, Connector, ConnectorData, Deploy, is_valid_public_key_hex,
    },
    error::{ClientNotFoundError, ConnectorError, ConnectorNotFoundError, ProviderError},
    events::{AccountChange, ConnectorEvent, EventBus, EventSubscription},
};
