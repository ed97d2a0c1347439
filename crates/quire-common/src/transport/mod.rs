//! Room transport plumbing shared by transport implementations.
//!
//! - `CollabMessage`: wire protocol for content, cursor and presence broadcasts
//! - `PresenceTracker`: the remote cursor map a transport owns per room

mod messages;
mod presence;

pub use messages::{CollabMessage, ReceivedMessage, WireError};
pub use presence::{PresenceTracker, RemoteCursor};
