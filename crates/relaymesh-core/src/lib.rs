//! Transport-agnostic types shared by every relaymesh crate: the error
//! taxonomy, the cms-object, the Message envelope, the per-request
//! Context, and the Predicate trait with its built-in predicates.
//!
//! Nothing in this crate knows about HTTP, WebSocket, TCP, or AMQP
//! specifically; transport crates depend on it, not the other way
//! around.

pub mod cms;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod predicate;

pub use cms::{CmsObject, CmsTimestamps, RequestInfo};
pub use context::{Context, ContextKind, StreamState};
pub use dispatch::Dispatch;
pub use error::{DispatchError, DispatchResult};
pub use message::{response_channel, Message, ResponsePayload, ResponseReceiver, ResponseSink, WsFrameKind};
pub use predicate::{
    callback_sync, delete, equal, get, head, in_list, options, patch, post, put, url, CallbackPredicate,
    EqualPredicate, InListPredicate, Predicate, PredicateChain, UrlPredicate,
};
