//! Message templates with `{placeholder}` variables.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::dataset::RawDataset;
use crate::error::TemplateError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Built-in templates, in display order.
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "greeting",
        "Hello {name}! Hope you are having a wonderful day. This is an automated message from {sender}.",
    ),
    (
        "business_update",
        "Hi {name}, We have an exciting update about {topic}. {details} Thank you for your continued support!",
    ),
    (
        "reminder",
        "Hello {name}, This is a friendly reminder about {event} scheduled for {date}. Looking forward to seeing you there!",
    ),
    (
        "promotional",
        "Hi {name}! Special offer just for you: {offer}. Valid until {expiry}. Don't miss out!",
    ),
    (
        "follow_up",
        "Hi {name}, Following up on our previous conversation about {topic}. Please let me know if you have any questions.",
    ),
    (
        "thank_you",
        "Dear {name}, Thank you so much for {reason}. Your support means a lot to us! Best regards, {sender}",
    ),
    (
        "invitation",
        "Hello {name}! You're invited to {event} on {date} at {location}. Hope to see you there! RSVP: {contact}",
    ),
];

/// Look up a built-in template body by name.
pub fn builtin(name: &str) -> Result<&'static str, TemplateError> {
    BUILTIN_TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, body)| *body)
        .ok_or_else(|| TemplateError::UnknownTemplate {
            name: name.to_string(),
        })
}

/// Placeholder names used by `template`, first occurrence order, no repeats.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Fill every `{placeholder}` from `vars`.
pub fn personalize(template: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !vars.contains_key(name))
    {
        return Err(TemplateError::MissingVariable { name: missing });
    }
    let filled = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        vars.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(filled.into_owned())
}

/// Compose `message_column` of every row from `template`.
///
/// Each row's own columns are the variables, falling back to `defaults` for
/// names the file doesn't carry. The column is appended when absent.
pub fn apply_template(
    raw: &RawDataset,
    template: &str,
    message_column: &str,
    defaults: &HashMap<String, String>,
) -> Result<RawDataset, TemplateError> {
    let mut out = raw.clone();
    let target = match out.column_index(message_column) {
        Some(idx) => idx,
        None => {
            out.columns.push(message_column.to_string());
            out.columns.len() - 1
        }
    };

    for (row_idx, row) in out.rows.iter_mut().enumerate() {
        let mut vars = defaults.clone();
        for (col_idx, column) in raw.columns.iter().enumerate() {
            vars.insert(column.clone(), raw.cell(row_idx, col_idx).trim().to_string());
        }
        let body = personalize(template, &vars)?;
        if row.len() <= target {
            row.resize(target + 1, String::new());
        }
        row[target] = body;
    }
    Ok(out)
}
