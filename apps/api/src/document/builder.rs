//! Turns collaborator output into validated, unpaginated block sequences.
//!
//! Everything that reaches the renderer passes through `validate_blocks`, so a bad
//! block from the agent is a `DocumentError` here rather than a broken page later.

use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::warn;

use crate::collaborators::{AgentResult, ContextCandidate, Interpretation};
use crate::document::blocks::{
    BlankSpace, ChoiceMode, ContentBlock, DocumentError, DocumentKind, OptionItem, OptionList,
    TextBlock,
};

/// Height of the handwriting area under a question.
const REPLY_AREA_HEIGHT: f32 = 480.0;

/// One option per letter A-Z.
pub const MAX_CLARIFICATION_CHOICES: usize = 26;

/// A document before a reference code and page breaks are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDraft {
    pub kind: DocumentKind,
    pub blocks: Vec<ContentBlock>,
    pub context_data: Value,
}

pub fn response_draft(
    result: &AgentResult,
    interpretation: &Interpretation,
) -> Result<DocumentDraft, DocumentError> {
    if interpretation.requires_clarification {
        return clarification_draft(interpretation);
    }

    let spec = &result.document_spec;
    let title = spec
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| title_for(&result.response_type, result.success));

    let mut blocks = vec![ContentBlock::Header(TextBlock::new(title).margins(0.0, 24.0))];
    if !result.user_message.trim().is_empty() {
        blocks.push(ContentBlock::Text(
            TextBlock::new(result.user_message.trim()).margins(0.0, 24.0),
        ));
    }
    // The paginator owns footers.
    blocks.extend(spec.blocks.iter().filter(|b| !b.is_footer()).cloned());
    if blocks.len() == 1 {
        blocks.push(ContentBlock::text(if result.success {
            "Your request has been completed."
        } else {
            "We could not complete your request. Please try again or contact support."
        }));
    }
    validate_blocks(&blocks)?;

    let mut context_data = match &spec.context_data {
        Value::Object(map) => Value::Object(map.clone()),
        Value::Null => json!({}),
        other => json!({ "data": other }),
    };
    if let Value::Object(map) = &mut context_data {
        map.entry("responseType")
            .or_insert_with(|| json!(result.response_type));
        map.entry("intent")
            .or_insert_with(|| json!(interpretation.intent));
        let labels = option_labels(&blocks);
        if !labels.is_empty() {
            map.entry("options").or_insert_with(|| json!(labels));
        }
    }

    Ok(DocumentDraft {
        kind: DocumentKind::Response,
        blocks,
        context_data,
    })
}

/// Asks the sender which earlier conversation the page belongs to.
pub fn clarification_draft(interpretation: &Interpretation) -> Result<DocumentDraft, DocumentError> {
    let question = interpretation
        .clarification_question
        .clone()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| {
            "We are not sure which of your recent requests this page answers.".to_string()
        });

    let mut blocks = vec![
        ContentBlock::Header(TextBlock::new("We need a quick clarification").margins(0.0, 24.0)),
        ContentBlock::Text(TextBlock::new(question).margins(0.0, 16.0)),
    ];

    let all = &interpretation.ambiguous_contexts;
    let candidates = &all[..all.len().min(MAX_CLARIFICATION_CHOICES)];
    if candidates.is_empty() {
        blocks.push(ContentBlock::text(
            "Please write your request again below, including the reference code from the page you are answering.",
        ));
    } else {
        blocks.push(ContentBlock::text(
            "Circle the request you meant and fax this page back:",
        ));
        let mut list = OptionList::new(ChoiceMode::Circle, candidate_options(candidates));
        list.margin_top = 12.0;
        list.margin_bottom = 24.0;
        blocks.push(ContentBlock::OptionList(list));
        if all.len() > candidates.len() {
            warn!(
                candidates = all.len(),
                dropped = all.len() - candidates.len(),
                "Too many open requests to list, keeping the newest"
            );
            blocks.push(ContentBlock::text(
                "Older requests are not listed. If yours is missing, write its reference code below.",
            ));
        }
    }
    blocks.push(ContentBlock::BlankSpace(BlankSpace {
        height: REPLY_AREA_HEIGHT,
    }));
    validate_blocks(&blocks)?;

    Ok(DocumentDraft {
        kind: DocumentKind::Clarification,
        blocks,
        context_data: json!({
            "clarification": true,
            "intent": interpretation.intent,
            "candidates": candidates
                .iter()
                .map(|c| json!({ "contextId": c.context_id, "referenceId": c.reference_id }))
                .collect::<Vec<_>>(),
        }),
    })
}

pub fn welcome_draft(user_name: Option<&str>) -> DocumentDraft {
    let greeting = match user_name.filter(|n| !n.trim().is_empty()) {
        Some(name) => format!("Welcome, {}!", name.trim()),
        None => "Welcome!".to_string(),
    };
    DocumentDraft {
        kind: DocumentKind::Welcome,
        blocks: vec![
            ContentBlock::Header(TextBlock::new(greeting).margins(0.0, 24.0)),
            ContentBlock::text(
                "You can ask for almost anything by writing it on a sheet of paper and faxing it to this number.",
            ),
            ContentBlock::Header(TextBlock::new("How it works").size(52.0).margins(32.0, 12.0)),
            ContentBlock::OptionList(OptionList::new(
                ChoiceMode::Checkbox,
                vec![
                    OptionItem::new("1", "Write your request clearly in dark ink."),
                    OptionItem::new("2", "Fax it to us. We reply by fax, usually within minutes."),
                    OptionItem::new(
                        "3",
                        "When we send choices, mark one and fax the page back with its reference code visible.",
                    ),
                ],
            )),
            ContentBlock::Text(
                TextBlock::new("Write HELP on a page at any time for instructions.").margins(32.0, 0.0),
            ),
        ],
        context_data: json!({ "welcome": true }),
    }
}

pub fn help_draft() -> DocumentDraft {
    DocumentDraft {
        kind: DocumentKind::Help,
        blocks: vec![
            ContentBlock::Header(TextBlock::new("Using fax replies").margins(0.0, 24.0)),
            ContentBlock::text("Things you can ask for:"),
            ContentBlock::OptionList(OptionList::new(
                ChoiceMode::Checkbox,
                vec![
                    OptionItem::new("A", "Shopping: name the item and how many you want."),
                    OptionItem::new("B", "Email: who it is for and what it should say."),
                    OptionItem::new("C", "Questions: anything you would ask a helpful person."),
                ],
            )),
            ContentBlock::Text(
                TextBlock::new(
                    "When answering one of our pages, keep the reference code at the bottom visible so we know what you are replying to.",
                )
                .margins(24.0, 0.0),
            ),
        ],
        context_data: json!({ "help": true }),
    }
}

fn title_for(response_type: &str, success: bool) -> String {
    if !success {
        return "We hit a problem".to_string();
    }
    match response_type {
        "" => "Your reply".to_string(),
        other => {
            let words = other.replace(['_', '-'], " ");
            let mut chars = words.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => "Your reply".to_string(),
            }
        }
    }
}

fn candidate_options(candidates: &[ContextCandidate]) -> Vec<OptionItem> {
    candidates
        .iter()
        .zip(('A'..='Z').map(String::from))
        .map(|(c, label)| {
            let mut description = format!(
                "{} sent {}",
                c.reference_id,
                c.created_at.format("%b %-d at %H:%M")
            );
            if let Some(summary) = c.summary.as_deref().filter(|s| !s.trim().is_empty()) {
                description.push_str(": ");
                description.push_str(summary.trim());
            }
            OptionItem::new(label, description)
        })
        .collect()
}

fn option_labels(blocks: &[ContentBlock]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::OptionList(list) => Some(list.options.iter().map(|o| o.label.clone())),
            _ => None,
        })
        .flatten()
        .collect()
}

fn invalid(block: &ContentBlock, reason: impl Into<String>) -> DocumentError {
    DocumentError::InvalidBlock {
        block: block.kind_str(),
        reason: reason.into(),
    }
}

fn check_dimension(block: &ContentBlock, name: &str, value: f32, allow_zero: bool) -> Result<(), DocumentError> {
    let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if !ok {
        return Err(invalid(block, format!("{name} must be a positive number, got {value}")));
    }
    Ok(())
}

fn check_margins(block: &ContentBlock, top: f32, bottom: f32) -> Result<(), DocumentError> {
    check_dimension(block, "marginTop", top, true)?;
    check_dimension(block, "marginBottom", bottom, true)
}

/// Rejects blocks the layout engine cannot place deterministically.
pub fn validate_blocks(blocks: &[ContentBlock]) -> Result<(), DocumentError> {
    for block in blocks {
        match block {
            ContentBlock::Text(t) | ContentBlock::Header(t) | ContentBlock::Footer(t) => {
                if t.text.trim().is_empty() {
                    return Err(invalid(block, "text is empty"));
                }
                if let Some(size) = t.font_size {
                    check_dimension(block, "fontSize", size, false)?;
                }
                check_margins(block, t.margin_top, t.margin_bottom)?;
            }
            ContentBlock::OptionList(list) => {
                if list.options.is_empty() {
                    return Err(invalid(block, "no options"));
                }
                let mut seen = HashSet::new();
                for option in &list.options {
                    let label = option.label.trim();
                    if label.is_empty() {
                        return Err(invalid(block, "option without a label"));
                    }
                    if !seen.insert(label.to_ascii_uppercase()) {
                        return Err(invalid(block, format!("duplicate label {label}")));
                    }
                    if option.price.is_some_and(|p| !p.is_finite() || p < 0.0) {
                        return Err(invalid(block, format!("option {label} has an invalid price")));
                    }
                }
                if let Some(size) = list.font_size {
                    check_dimension(block, "fontSize", size, false)?;
                }
                check_margins(block, list.margin_top, list.margin_bottom)?;
            }
            ContentBlock::Barcode(b) => {
                if b.payload.is_empty() {
                    return Err(invalid(block, "empty payload"));
                }
                check_dimension(block, "size", b.size, false)?;
                check_margins(block, b.margin_top, b.margin_bottom)?;
            }
            ContentBlock::Image(img) => {
                check_dimension(block, "width", img.width, false)?;
                check_dimension(block, "height", img.height, false)?;
                check_margins(block, img.margin_top, img.margin_bottom)?;
            }
            ContentBlock::BlankSpace(s) => check_dimension(block, "height", s.height, true)?,
        }
    }
    Ok(())
}
