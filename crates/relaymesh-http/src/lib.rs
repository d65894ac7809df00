//! HTTP listener for relaymesh (§4.6, §6.2): method/URL/query/header/
//! cookie/body parsing, multipart and form-urlencoded decoding, TLS
//! (cert+key or PKCS12), streaming responses, and the WebSocket upgrade
//! endpoint (delegates into `relaymesh-ws`).

pub mod cms_builder;
mod error;
mod listener;
mod tls;
mod upgrade;

pub use error::{HttpError, HttpResult};
pub use listener::{serve, HttpListenerConfig, ListenerState};
pub use tls::{TlsAcceptor, TlsSource};
