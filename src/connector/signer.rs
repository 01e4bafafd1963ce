use std::cell::RefCell;

use async_trait::async_trait;
use wasm_bindgen::{JsCast, JsValue, closure::Closure};

use crate::{
    connector::{Connector, Deploy, is_valid_public_key_hex},
    error::{ConnectorError, ConnectorNotFoundError, ProviderError},
    events::{ConnectorEvent, EventBus},
    ffi::{
        self,
        signer::{ACTIVE_KEY_CHANGED, CONNECTED, DISCONNECTED},
    },
};

type EventClosure = Closure<dyn FnMut(JsValue)>;

/// [`Connector`] over the legacy Casper Signer browser extension
/// (`window.casperlabsHelper`).
///
/// The provider handle is resolved lazily and re-resolved on every use: the
/// extension may inject its helper after the page loaded, and a helper that
/// was missing once may well be there on the next call.
pub struct CasperSignerConnector {
    events: EventBus,
    bound: RefCell<Vec<(&'static str, EventClosure)>>,
}

impl Default for CasperSignerConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl CasperSignerConnector {
    pub const ID: &str = "casperSigner";

    pub fn new() -> Self {
        Self {
            events: EventBus::new(),
            bound: RefCell::new(Vec::new()),
        }
    }

    /// Resolve the injected helper.
    pub async fn provider(&self) -> Result<ffi::SignerProvider, ConnectorError> {
        match ffi::signer::resolve() {
            Some(provider) => Ok(provider),
            None => Err(ConnectorNotFoundError.into()),
        }
    }

    /// Translate the extension's window events into [`ConnectorEvent`]s on
    /// our own bus.
    ///
    /// Any previously bound listeners are released first, so repeated
    /// connects never stack handlers.
    fn bind_events(&self) -> Result<(), ConnectorError> {
        self.unbind_events();

        let target = ffi::event_provider().ok_or(ConnectorNotFoundError)?;

        let on_key_changed: EventClosure = {
            let events = self.events.clone();
            Closure::new(move |event: JsValue| {
                if let Some(change) = ffi::signer::decode_detail(&event) {
                    events.emit(&ConnectorEvent::Changed(change));
                } else {
                    log::debug!("dropping {ACTIVE_KEY_CHANGED} event with undecodable detail");
                }
            })
        };
        let on_disconnected: EventClosure = {
            let events = self.events.clone();
            Closure::new(move |_event: JsValue| {
                events.emit(&ConnectorEvent::Disconnected);
            })
        };
        let on_connected: EventClosure = {
            let events = self.events.clone();
            Closure::new(move |event: JsValue| {
                if let Some(change) = ffi::signer::decode_detail(&event) {
                    events.emit(&ConnectorEvent::Connected(change));
                } else {
                    log::debug!("dropping {CONNECTED} event with undecodable detail");
                }
            })
        };

        target.add_event_listener(ACTIVE_KEY_CHANGED, on_key_changed.as_ref().unchecked_ref());
        target.add_event_listener(DISCONNECTED, on_disconnected.as_ref().unchecked_ref());
        target.add_event_listener(CONNECTED, on_connected.as_ref().unchecked_ref());

        *self.bound.borrow_mut() = vec![
            (ACTIVE_KEY_CHANGED, on_key_changed),
            (DISCONNECTED, on_disconnected),
            (CONNECTED, on_connected),
        ];

        Ok(())
    }

    /// Release every listener bound by [`Self::bind_events`]. A no-op when
    /// nothing is bound.
    fn unbind_events(&self) {
        let bound = std::mem::take(&mut *self.bound.borrow_mut());
        if bound.is_empty() {
            return;
        }

        let Some(target) = ffi::event_provider() else {
            return;
        };

        for (kind, closure) in &bound {
            target.remove_event_listener(kind, closure.as_ref().unchecked_ref());
        }
    }
}

#[async_trait(?Send)]
impl Connector for CasperSignerConnector {
    fn id(&self) -> &str {
        Self::ID
    }

    fn events(&self) -> EventBus {
        self.events.clone()
    }

    async fn is_connected(&self) -> bool {
        let Ok(provider) = self.provider().await else {
            return false;
        };

        match provider.is_connected().await {
            Ok(connected) => connected.as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        let provider = self.provider().await?;

        self.bind_events()?;

        provider
            .request_connection()
            .await
            .map_err(provider_error)?;

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.unbind_events();

        let provider = self.provider().await?;

        provider
            .disconnect_from_site()
            .await
            .map_err(provider_error)?;

        Ok(())
    }

    async fn get_active_public_key(&self) -> Result<String, ConnectorError> {
        let provider = self.provider().await?;

        let key = String::from(
            provider
                .get_active_public_key()
                .await
                .map_err(provider_error)?,
        );

        if !is_valid_public_key_hex(&key) {
            return Err(ProviderError {
                info: format!("Malformed active public key `{key}'"),
            }
            .into());
        }

        Ok(key)
    }

    async fn sign_message(
        &self,
        message: &str,
        signing_public_key_hex: &str,
    ) -> Result<String, ConnectorError> {
        let provider = self.provider().await?;

        let signature = provider
            .sign_message(message, signing_public_key_hex)
            .await
            .map_err(provider_error)?;

        Ok(String::from(signature))
    }

    async fn sign(
        &self,
        deploy: Deploy,
        signing_public_key_hex: &str,
        target_public_key_hex: &str,
    ) -> Result<Deploy, ConnectorError> {
        let provider = self.provider().await?;

        let deploy = serde_wasm_bindgen::to_value(&deploy).map_err(|encode_error| ProviderError {
            info: format!("Couldn't encode the deploy: {encode_error}"),
        })?;

        let signed = provider
            .sign(deploy, signing_public_key_hex, target_public_key_hex)
            .await
            .map_err(provider_error)?;

        serde_wasm_bindgen::from_value(signed).map_err(|decode_error| {
            ProviderError {
                info: format!("Couldn't decode the signed deploy: {decode_error}"),
            }
            .into()
        })
    }
}

impl Drop for CasperSignerConnector {
    fn drop(&mut self) {
        self.unbind_events();
    }
}

/// Map a rejection coming out of the extension onto [`ProviderError`],
/// keeping whatever message the extension attached.
fn provider_error(error: JsValue) -> ConnectorError {
    let info = error
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(&error, &JsValue::from_str("message"))
                .ok()
                .and_then(|message| message.as_string())
        })
        .unwrap_or_else(|| format!("{error:?}"));

    ProviderError { info }.into()
}
