//! State adapters for a presentation layer.
//!
//! - [`OperationState`] / [`Operation`]: idle → in-flight → settled, observable
//! - [`StreamSite`]: one cancellable stream per UI surface
//! - [`ChatSession`]: ordered transcript fed by streamed replies
//! - [`format_bytes`]: model size display

pub mod chat;
pub mod format;
pub mod operation;

pub use chat::{ChatSession, ChatTurn};
pub use format::format_bytes;
pub use operation::{Operation, OperationState, StreamSite, StreamTicket};
