//! # causerie-shared
//!
//! Types shared by every Causerie crate: descriptor identifiers, the
//! descriptor model delivered by the messaging backend, source-side events,
//! tuning constants and error types.

pub mod constants;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod types;

pub use descriptor::{
    is_valid_timestamp, Content, ContentKind, DeleteState, Deletion, Descriptor, TypingAction,
};
pub use error::{CauserieError, Result, SourceError};
pub use events::{ChangeKind, SourceEvent};
pub use types::{ConversationId, DescriptorId, TwincodeId};
