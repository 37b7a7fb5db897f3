//! Best-effort follow-up sheets sent after the main response.

use crate::collaborators::{AgentResult, Interpretation};
use crate::document::builder::{help_draft, welcome_draft, DocumentDraft};
use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    /// First fax from this number.
    Welcome,
    /// Sender asked for help but the agent answered something else.
    Help,
}

impl PostAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostAction::Welcome => "welcome",
            PostAction::Help => "help",
        }
    }

    pub fn draft(&self, user: &User) -> DocumentDraft {
        match self {
            PostAction::Welcome => welcome_draft(user.display_name.as_deref()),
            PostAction::Help => help_draft(),
        }
    }
}

pub fn plan(is_new_user: bool, interpretation: &Interpretation, result: &AgentResult) -> Vec<PostAction> {
    let mut actions = Vec::new();
    if is_new_user {
        actions.push(PostAction::Welcome);
    }
    if interpretation.intent.eq_ignore_ascii_case("help")
        && !result.response_type.eq_ignore_ascii_case("help")
    {
        actions.push(PostAction::Help);
    }
    actions
}
