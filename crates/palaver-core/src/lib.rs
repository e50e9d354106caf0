//! # palaver-core
//!
//! Real-time coordination core for the Palaver chat backend.
//!
//! The building blocks, leaf to root:
//!
//! - **ConnectionRegistry** - user id to live transport handle
//! - **BroadcastRelay** - best-effort fan-out to a room's reachable members
//! - **Authenticator** - credential to user identity
//! - **RoomCoordinator** - join/leave transitions and member queries
//! - **MessagePipeline** - validate, persist, then republish
//! - **Session** - per-connection state machine driving all of the above
//!
//! ## Architecture
//!
//! ```text
//! transport frames
//!        │
//!        ▼
//! ┌─────────────┐    ┌──────────────────┐    ┌───────────────┐
//! │   Session   │───▶│ RoomCoordinator / │───▶│ BroadcastRelay│
//! └─────────────┘    │  MessagePipeline  │    └───────┬───────┘
//!        │           └────────┬─────────┘            │
//!        │                    ▼                      ▼
//!        │           ┌─────────────┐        ┌────────────────────┐
//!        └──────────▶│  ChatStore  │        │ ConnectionRegistry │
//!                    └─────────────┘        └────────────────────┘
//! ```

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod session;
pub mod views;

use palaver_store::ChatStore;
use std::sync::Arc;

pub use auth::{AuthError, Authenticator, CredentialVerifier};
pub use coordinator::{RoomCoordinator, RoomSnapshot, DEFAULT_HISTORY_LIMIT};
pub use error::ChatError;
pub use pipeline::MessagePipeline;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use relay::BroadcastRelay;
pub use session::Session;

/// The assembled realtime core, shared by all sessions.
///
/// Construction wires the components together around one store and one
/// registry; there is no ambient global state.
pub struct ChatCore {
    store: Arc<dyn ChatStore>,
    /// Live-connection map, the only state shared across session tasks.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out engine.
    pub relay: Arc<BroadcastRelay>,
    /// Credential resolution.
    pub authenticator: Authenticator,
    /// Membership transitions.
    pub coordinator: RoomCoordinator,
    /// Chat message persistence and republish.
    pub pipeline: MessagePipeline,
}

impl ChatCore {
    /// Assemble the core with the default snapshot history depth.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self::with_history_limit(store, verifier, DEFAULT_HISTORY_LIMIT)
    }

    /// Assemble the core with a custom snapshot history depth.
    #[must_use]
    pub fn with_history_limit(
        store: Arc<dyn ChatStore>,
        verifier: Arc<dyn CredentialVerifier>,
        history_limit: usize,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(BroadcastRelay::new(store.clone(), registry.clone()));
        Self {
            authenticator: Authenticator::new(verifier, store.clone()),
            coordinator: RoomCoordinator::with_history_limit(
                store.clone(),
                relay.clone(),
                history_limit,
            ),
            pipeline: MessagePipeline::new(store.clone(), relay.clone()),
            registry,
            relay,
            store,
        }
    }

    /// The durable store the core was assembled around.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }
}
