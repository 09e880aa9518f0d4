//! Transport layer for the fleetsync reconciler.
//!
//! Two independent sources feed the fleet model:
//!
//! - **[`channel`]**: the persistent command channel. Carries outbound
//!   commands and inbound confirmations, owns the
//!   `Disconnected → Connecting → Connected` state machine and the fixed-delay
//!   reconnect loop. The transport underneath is pluggable via [`Transport`];
//!   [`WebSocketTransport`] is the production implementation.
//!
//! - **[`listener`]**: the push-based document store. A [`PushListener`]
//!   delivers the full current set of documents in a collection every time
//!   it changes. [`HttpCollectionListener`] polls a REST endpoint and emits
//!   only when the collection content differs.
//!
//! Wire shapes for both live in [`wire`].

pub mod channel;
pub mod error;
pub mod listener;
pub mod websocket;
pub mod wire;

pub use channel::{
    ADMIN_RECONNECT_DELAY, ChannelEvent, ChannelState, CommandChannel, CommandSink, Connection,
    ConnectionRemote, Frame, PRIMARY_RECONNECT_DELAY, ReconnectConfig, Transport,
};
pub use error::Error;
pub use listener::{Document, HttpCollectionListener, PushListener, Subscription};
pub use websocket::WebSocketTransport;
pub use wire::{
    CommandPayload, InboundMessage, ModuleDocument, RentalDocument, SlotDocument, SlotRef,
    StationDocument,
};
