//! WebSocket client for the Eulerscan streaming service.
//!
//! Connect, issue a filtered subscription, await its first result patch,
//! unsubscribe and shut down. Incremental patch application is not supported:
//! every subscription resolves once.

mod client;
mod error;
mod protocol;

pub use client::{EscanClient, EscanClientBuilder, Patch, Subscription};
pub use error::{ClientError, RemoteError};
pub use protocol::{SubscriptionId, SubscriptionQuery};
