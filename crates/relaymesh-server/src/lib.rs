//! The routing dispatcher, host orchestration, and configuration layer
//! for relaymesh (§4.4, §2 component H, §6.6).
//!
//! Wires the transport crates (`relaymesh-http`, `relaymesh-tcp`,
//! `relaymesh-amqp`, `relaymesh-ws`) to a [`relaymesh_di::Container`]
//! through a [`dispatcher::Dispatcher`], and exposes [`host::Host`] as
//! the single entry point that binds every configured listener and
//! drives graceful shutdown.

pub mod config;
pub mod connections;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod logging;
pub mod registration;
pub mod router;

pub use config::HostOptions;
pub use connections::ConnectionStrings;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{HostError, HostResult};
pub use host::{Host, HostBuilder};
pub use registration::{handler_blocking, handler_fn, FnHandler, Handler, HandlerFuture, HandlerOutput};
pub use router::{ContextDetector, GlobPattern, RouterConfig};
