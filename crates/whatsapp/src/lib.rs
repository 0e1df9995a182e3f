//! WhatsApp Cloud API integration for the bulk-order flow:
//! - **Events** (`events`) - inbound webhook payload parsing
//! - **Messages** (`messages`) - Cloud API payload builders
//! - **Sender** (`sender`) - authenticated message delivery
//! - **Runner** (`runner`) - per-user dispatch into the state machine
//!
//! The runner is the only piece that touches the engine; everything else is
//! translation between Cloud API JSON and the transport-agnostic core types.

pub mod events;
pub mod messages;
pub mod runner;
pub mod sender;

pub use events::{parse_webhook, InboundEvent};
pub use runner::FlowRunner;
pub use sender::{CloudApiSender, MessageSender, RecordingSender, SendError};
