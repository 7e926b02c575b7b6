//! Transport boundary for papo.
//!
//! The wire-level messaging protocol (encryption, multi-device sync, QR
//! pairing) is owned by an external bridge process. This crate defines the
//! frames exchanged with it, the outbound session traits the rest of papo
//! sends through, durable credential storage, and the connection supervisor
//! that keeps the session alive across transient and terminal failures.

pub mod bridge;
pub mod credentials;
pub mod error;
pub mod session;
pub mod supervisor;
pub mod types;

pub use {
    bridge::BridgeTransport,
    credentials::CredentialStore,
    error::{Error, Result},
    session::{InboundHandler, Transport, TransportEvent, TransportSession},
    supervisor::{ConnectionSupervisor, SharedConnectionState, SupervisorConfig},
    types::{
        BatchType, ChatDocument, ConnectionPhase, ConnectionState, ConnectionUpdate,
        ContactDocument, DisconnectReason, HistorySync, MessageBatch, MessageRef, PresenceState,
        RawMessage,
    },
};
