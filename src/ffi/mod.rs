pub mod signer;

pub use self::signer::SignerProvider;

use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// An object events can be bound to. In practice this is the page's
    /// `window`: the wallet extensions dispatch their notifications there.
    #[derive(Clone, PartialEq)]
    pub type EventProvider;

    #[wasm_bindgen(method, js_name = "addEventListener")]
    pub fn add_event_listener(this: &EventProvider, kind: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = "removeEventListener")]
    pub fn remove_event_listener(this: &EventProvider, kind: &str, listener: &js_sys::Function);
}

/// The `window` as an event target, or `None` outside of a browser.
pub fn event_provider() -> Option<EventProvider> {
    let window = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("window")).ok()?;

    if window.is_undefined() || window.is_null() {
        return None;
    }

    Some(EventProvider::from(window))
}
