//! TCP listener and binary framing codec for relaymesh (§4.6, §6.1).
//!
//! One message = `[1-byte type][4-byte session-id length][session-id
//! bytes][4-byte payload length][payload bytes]`, the payload section
//! present only for `AdHoc`/`Message`/`Connect` frames. A connection is
//! closed after one exchange unless the frame type permits continuation.

mod error;
mod frame;
mod listener;

pub use error::{TcpError, TcpResult};
pub use frame::{Frame, FrameType, DEFAULT_MAX_FRAME_LEN};
pub use listener::{serve, TcpListenerConfig};
