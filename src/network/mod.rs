//! Everything between this node and the outside world
//!
//! The HTTP API clients and peers call, the transport this node uses to
//! call its peers, chain synchronization and the event feed behind `/stream`.

pub mod events;
pub mod messages;
pub mod peers;
pub mod server;
pub mod sync;
pub mod transport;

pub use events::{EventBroadcaster, NodeEvent, DEFAULT_EVENT_BUFFER};
pub use peers::{normalize_peer_url, PeerRegistry};
pub use server::{router, serve, serve_listener, ApiError};
pub use sync::{PeerSyncCoordinator, PeerSyncResult, SyncOutcome};
pub use transport::{HttpTransport, PeerTransport};
