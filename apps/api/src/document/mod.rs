pub mod blocks;
pub mod builder;
pub mod reference;

pub use blocks::{ContentBlock, Document, DocumentError, DocumentKind, Page};
pub use builder::DocumentDraft;
pub use reference::ReferenceId;
