//! WebSocket session and session-registry runtime for relaymesh (§3.5,
//! §3.6, §4.5).
//!
//! A [`Session`] is created exclusively by a [`SessionRegistry`] on
//! upgrade and owned by it (weakly — the strong owner is the session's
//! own lifecycle task) until it closes. The registry additionally tracks
//! group membership for fan-out sends.

mod error;
mod lifecycle;
mod registry;
mod session;

pub use error::{WsError, WsResult};
pub use registry::SessionRegistry;
pub use session::{Fanout, PeerMeta, Session};
