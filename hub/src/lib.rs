//! The event distribution layer between the upstream message bus and the
//! subscription engine.
//!
//! [`ingest`] consumes the upstream topics and publishes decoded events
//! into an [`EventHub`] per topic, which replays a bounded window to every
//! newly attached subscription and fans live events out into bounded
//! per-subscription [`Inbox`]es. [`cache`] keeps the latest event per
//! business key for point snapshots, and [`query_client`] pages filtered
//! historical snapshots out of the external query API.

pub mod cache;
pub mod hub;
pub mod inbox;
pub mod ingest;
pub mod query_client;
pub mod wire;

pub use cache::BlotterCache;
pub use hub::EventHub;
pub use inbox::{inbox, Inbox, InboxSender};
pub use ingest::{IngestState, IngestorConfig, IngestorHandle};
pub use query_client::{QueryClient, QueryConfig, SnapshotError};
