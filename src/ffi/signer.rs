use wasm_bindgen::prelude::*;

use crate::events::AccountChange;

/// Extension event dispatched when the active account changed.
pub const ACTIVE_KEY_CHANGED: &str = "signer:activeKeyChanged";
/// Extension event dispatched when the site got disconnected.
pub const DISCONNECTED: &str = "signer:disconnected";
/// Extension event dispatched when the site got connected.
pub const CONNECTED: &str = "signer:connected";

#[wasm_bindgen]
extern "C" {
    /// `window.casperlabsHelper`, injected by the Casper Signer extension.
    #[wasm_bindgen(thread_local_v2, js_namespace = ["window"], js_name = "casperlabsHelper")]
    pub static CASPER_SIGNER: Option<SignerProvider>;
}

#[wasm_bindgen]
extern "C" {
    #[derive(Clone, PartialEq)]
    pub type SignerProvider;

    /// Whether the site is already authorized with the extension. Resolves
    /// without prompting the user.
    #[wasm_bindgen(method, catch, js_name = "isConnected")]
    pub async fn is_connected(this: &SignerProvider) -> Result<JsValue, JsValue>;

    /// Prompt the user to authorize the site. Resolves once the user
    /// accepted, rejects when they dismiss the prompt.
    #[wasm_bindgen(method, catch, js_name = "requestConnection")]
    pub async fn request_connection(this: &SignerProvider) -> Result<JsValue, JsValue>;

    /// Revoke the site's authorization with the extension.
    #[wasm_bindgen(method, catch, js_name = "disconnectFromSite")]
    pub async fn disconnect_from_site(this: &SignerProvider) -> Result<JsValue, JsValue>;

    /// The hex-encoded public key of the account currently selected in the
    /// extension. Rejects while not connected.
    #[wasm_bindgen(method, catch, js_name = "getActivePublicKey")]
    pub async fn get_active_public_key(this: &SignerProvider) -> Result<js_sys::JsString, JsValue>;

    /// Ask the extension to sign an arbitrary message with the given key.
    /// Resolves to the hex-encoded signature.
    #[wasm_bindgen(method, catch, js_name = "signMessage")]
    pub async fn sign_message(
        this: &SignerProvider,
        message: &str,
        signing_public_key_hex: &str,
    ) -> Result<js_sys::JsString, JsValue>;

    /// Ask the extension to sign a deploy (passed and returned as its JSON
    /// representation).
    #[wasm_bindgen(method, catch, js_name = "sign")]
    pub async fn sign(
        this: &SignerProvider,
        deploy: JsValue,
        signing_public_key_hex: &str,
        target_public_key_hex: &str,
    ) -> Result<JsValue, JsValue>;
}

/// Resolve the injected helper.
///
/// The extension may inject `casperlabsHelper` after our first lookup, so a
/// fresh read from the window is preferred over the cached static.
pub fn resolve() -> Option<SignerProvider> {
    let fresh = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("window"))
        .ok()
        .and_then(|window| {
            js_sys::Reflect::get(&window, &JsValue::from_str("casperlabsHelper")).ok()
        })
        .filter(|value| value.is_object());

    match fresh {
        Some(value) => Some(SignerProvider::from(value)),
        None => CASPER_SIGNER.with(|helper| helper.clone()),
    }
}

/// Decode the `detail` payload the extension attaches to its events.
///
/// Undecodable details yield `None`; the extension occasionally dispatches
/// events with no payload at all.
pub fn decode_detail(event: &JsValue) -> Option<AccountChange> {
    let detail = js_sys::Reflect::get(event, &JsValue::from_str("detail")).ok()?;

    serde_wasm_bindgen::from_value(detail).ok()
}
