pub mod audit;
pub mod context;
pub mod user;

pub use audit::AuditEvent;
pub use context::{ConversationContext, NewContext};
pub use user::User;
