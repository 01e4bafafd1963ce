/*!

The capability contract every wallet backend adapter fulfills.

A [`Connector`] is a long-lived handle over one concrete wallet backend (a
browser-extension signer, a hardware-ledger bridge, ...). Disconnecting does
not destroy it, it only unbinds the active session; the same connector can be
connected again later.

*/

mod signer;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{
    error::ConnectorError,
    events::{AccountChange, EventBus},
};

pub use self::signer::CasperSignerConnector;

/// A deploy travelling to or from a wallet backend for signature.
///
/// Casper deploys are exchanged as JSON; the payload semantics are
/// provider-specific and opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Deploy {
    pub deploy: serde_json::Value,
}

/// Session payload published by connectors and held by the client.
///
/// At minimum the active account key; providers may merge additional fields
/// in through [`ConnectorData::merge`] without erasing existing ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorData {
    pub active_key: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ConnectorData {
    pub fn with_active_key(active_key: impl Into<String>) -> Self {
        Self {
            active_key: Some(active_key.into()),
            ..Self::default()
        }
    }

    /// Shallow union: every field present on `incoming` overwrites ours,
    /// absent fields leave ours untouched.
    pub fn merge(&mut self, incoming: ConnectorData) {
        if incoming.active_key.is_some() {
            self.active_key = incoming.active_key;
        }
        self.extra.extend(incoming.extra);
    }
}

impl From<AccountChange> for ConnectorData {
    /// The whole event payload merges into the session data, exactly as
    /// the extensions deliver it: the account key plus an `isConnected`
    /// field.
    fn from(change: AccountChange) -> Self {
        Self {
            active_key: Some(change.active_key),
            extra: BTreeMap::from([(
                "isConnected".to_owned(),
                serde_json::Value::Bool(change.is_connected),
            )]),
        }
    }
}

/// Uniform capability surface over a concrete wallet backend.
///
/// Implementations adapt one external provider each and are used as
/// `Rc<dyn Connector>` by the [`Client`]. All operations may suspend while
/// awaiting the backend; none of them require `Send` (single-threaded
/// browser model).
///
/// [`Client`]: crate::Client
#[async_trait(?Send)]
pub trait Connector {
    /// Stable identity of this connector, e.g. `"casperSigner"`.
    fn id(&self) -> &str;

    /// The bus this connector republishes backend lifecycle notifications
    /// on, translated to neutral [`ConnectorEvent`]s.
    ///
    /// [`ConnectorEvent`]: crate::events::ConnectorEvent
    fn events(&self) -> EventBus;

    /// Probe whether the backend already holds an authorized session.
    ///
    /// Never fails: every underlying failure degrades to `false`, so the
    /// probe stays non-intrusive.
    async fn is_connected(&self) -> bool;

    /// Request a connection/authorization from the backend and bind its
    /// lifecycle events.
    ///
    /// A user rejection surfaces as [`ProviderError`], an unreachable
    /// backend as [`ConnectorNotFoundError`].
    ///
    /// [`ProviderError`]: crate::error::ProviderError
    /// [`ConnectorNotFoundError`]: crate::error::ConnectorNotFoundError
    async fn connect(&self) -> Result<(), ConnectorError>;

    /// Unbind lifecycle events and ask the backend to end the session.
    ///
    /// Idempotent: disconnecting while nothing is bound is not an error.
    async fn disconnect(&self) -> Result<(), ConnectorError>;

    /// The currently active account key.
    ///
    /// The result is unspecified while the backend is not connected;
    /// callers check the connection status first.
    async fn get_active_public_key(&self) -> Result<String, ConnectorError>;

    /// Ask the backend to sign an arbitrary message with the given key.
    async fn sign_message(
        &self,
        message: &str,
        signing_public_key_hex: &str,
    ) -> Result<String, ConnectorError>;

    /// Ask the backend to sign a deploy.
    async fn sign(
        &self,
        deploy: Deploy,
        signing_public_key_hex: &str,
        target_public_key_hex: &str,
    ) -> Result<Deploy, ConnectorError>;
}

/// Check that `key` is a well-formed hex-encoded Casper public key: a one
/// byte algorithm tag (`01` ed25519, `02` secp256k1) followed by the key
/// bytes (32 and 33 bytes respectively).
pub fn is_valid_public_key_hex(key: &str) -> bool {
    let Ok(bytes) = hex::decode(key) else {
        return false;
    };

    match bytes.split_first() {
        Some((0x01, rest)) => rest.len() == 32,
        Some((0x02, rest)) => rest.len() == 33,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ED25519_KEY: &str = "01a35887f3962a6a232e8e11fa7d4567b6866d68850974aad7289ef287676825f6";

    #[test]
    fn merge_is_a_shallow_union() {
        let mut data = ConnectorData::with_active_key("0111");
        data.extra.insert("network".to_owned(), json!("casper-test"));

        data.merge(ConnectorData {
            active_key: Some("0122".to_owned()),
            extra: BTreeMap::from([("balance".to_owned(), json!("12000"))]),
        });

        assert_eq!(data.active_key.as_deref(), Some("0122"));
        assert_eq!(data.extra["network"], json!("casper-test"));
        assert_eq!(data.extra["balance"], json!("12000"));
    }

    #[test]
    fn merge_keeps_present_fields_when_incoming_is_absent() {
        let mut data = ConnectorData::with_active_key("0111");
        data.merge(ConnectorData::default());

        assert_eq!(data.active_key.as_deref(), Some("0111"));
    }

    #[test]
    fn merge_last_write_wins_per_key() {
        let mut data = ConnectorData::default();
        data.extra.insert("network".to_owned(), json!("casper"));

        data.merge(ConnectorData {
            active_key: None,
            extra: BTreeMap::from([("network".to_owned(), json!("casper-test"))]),
        });

        assert_eq!(data.extra["network"], json!("casper-test"));
    }

    #[test]
    fn public_key_hex_validation() {
        assert!(is_valid_public_key_hex(ED25519_KEY));
        // secp256k1: tag 02 followed by 33 bytes
        assert!(is_valid_public_key_hex(&format!("02{}", "ab".repeat(33))));

        // wrong length for the tag
        assert!(!is_valid_public_key_hex(&format!("01{}", "ab".repeat(33))));
        assert!(!is_valid_public_key_hex(&format!("02{}", "ab".repeat(32))));
        // unknown tag, not hex at all, empty
        assert!(!is_valid_public_key_hex(&format!("03{}", "ab".repeat(32))));
        assert!(!is_valid_public_key_hex("not-hex"));
        assert!(!is_valid_public_key_hex(""));
    }

    #[test]
    fn connector_data_json_shape() {
        let data = ConnectorData::with_active_key(ED25519_KEY);
        let value = serde_json::to_value(&data).unwrap();

        assert_eq!(value, json!({ "activeKey": ED25519_KEY }));
    }
}
