use crate::redaction::is_sensitive_element;
use crate::types::ElementSnapshot;

pub const MAX_TITLE_CHARS: usize = 80;
const TRUNCATED_TITLE_CHARS: usize = 77;
const CLICK_LABEL_CHARS: usize = 40;
const TYPED_VALUE_CHARS: usize = 60;
const FIELD_NAME_CHARS: usize = 40;

pub const SENSITIVE_CLICK_TITLE: &str = "Clicked on a **Sensitive Data Field**";
pub const SENSITIVE_TYPED_TITLE: &str = "Typed into **Sensitive Field** (Value Obscured)";
const GENERIC_FIELD_NAME: &str = "a text field";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Click,
    ValueChange,
}

pub fn title_for(kind: InteractionKind, target: &ElementSnapshot) -> String {
    let raw = match kind {
        InteractionKind::Click => click_title(target),
        InteractionKind::ValueChange => value_change_title(target),
    };
    clamp_title(raw)
}

fn click_title(target: &ElementSnapshot) -> String {
    if is_sensitive_element(target) {
        return SENSITIVE_CLICK_TITLE.to_string();
    }

    if let Some(text) = non_empty(&target.inner_text) {
        return format!("Clicked on \"{}\"", take_chars(text, CLICK_LABEL_CHARS));
    }
    if let Some(value) = non_empty(&target.value) {
        return format!("Clicked on \"{}\"", take_chars(value, CLICK_LABEL_CHARS));
    }
    if target.is_tag("INPUT") {
        if let Some(placeholder) = non_empty(&target.placeholder) {
            return format!(
                "Clicked in \"{}\" field",
                take_chars(placeholder, CLICK_LABEL_CHARS)
            );
        }
    }

    format!("Clicked on a {}", target.tag_name.to_lowercase())
}

fn value_change_title(target: &ElementSnapshot) -> String {
    if is_sensitive_element(target) {
        return SENSITIVE_TYPED_TITLE.to_string();
    }

    let value = take_chars(
        target.value.as_deref().unwrap_or_default(),
        TYPED_VALUE_CHARS,
    );
    let field_name = non_empty(&target.placeholder)
        .or_else(|| non_empty(&target.name))
        .unwrap_or(GENERIC_FIELD_NAME);
    format!(
        "Typed \"{value}\" into \"{}\"",
        take_chars(field_name, FIELD_NAME_CHARS)
    )
}

/// Keep titles within `MAX_TITLE_CHARS`, marking the cut with `...`.
pub fn clamp_title(title: String) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title;
    }
    format!("{}...", take_chars(&title, TRUNCATED_TITLE_CHARS))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.is_empty())
}

fn take_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((byte_idx, _)) => &value[..byte_idx],
        None => value,
    }
}
