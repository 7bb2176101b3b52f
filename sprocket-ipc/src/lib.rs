//! Inter-process communication for Sprocket
//!
//! Two protocols live here: the one-shot handoff of a job to a freshly
//! spawned child over its stdin, and the request/response command channel
//! spoken with a running task's local control endpoint.

pub mod channel;
pub mod error;
pub mod handoff;
pub mod protocol;

pub use channel::{handle_request, CommandClient, CommandHandler};
pub use error::IpcError;
pub use handoff::{decode_handoff, encode_handoff, read_handoff};
pub use protocol::{
    next_unique, CmdData, HandoffFrame, MessageEnvelope, StatusReport, IPC_PROTOCOL_VERSION,
};
