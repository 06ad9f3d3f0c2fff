//! Actor-based feed
//!
//! Each component runs as an independent async task communicating via Tokio
//! channels. The store is the only owner of dashboard state; everything else
//! talks to it through a [`store::StoreHandle`].
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌──────────────────┐            ┌──────────────────┐
//!   │ TransportActor   │            │ PollerActor      │
//!   │ (stream socket)  │            │ (HTTP inventory) │
//!   └────────┬─────────┘            └────────┬─────────┘
//!            │ StreamEvent (mpsc)            │
//!   ┌────────▼─────────┐                     │
//!   │ EventRouter      │                     │
//!   └────────┬─────────┘                     │
//!            │ StoreCommand                  │ StoreCommand
//!            └───────────────┬───────────────┘
//!                   ┌────────▼─────────┐
//!                   │ StoreActor       │──▶ revision (watch)
//!                   └──────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Signals**: Connection state, poll status and store revision are `watch` channels
//! 3. **Request/Response**: oneshot channels for reads

pub mod messages;
pub mod poller;
pub mod router;
pub mod store;
pub mod transport;
