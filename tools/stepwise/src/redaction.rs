use crate::types::ElementSnapshot;

/// Substrings of a field's `name`/`id` that mark it as sensitive.
pub const SENSITIVE_MARKERS: [&str; 4] = ["card", "cvv", "security", "ssn"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldDescriptor<'a> {
    pub field_type: &'a str,
    pub name: &'a str,
    pub id: &'a str,
}

impl<'a> FieldDescriptor<'a> {
    pub fn of(element: &'a ElementSnapshot) -> Self {
        Self {
            field_type: element.input_type.as_deref().unwrap_or_default(),
            name: element.name.as_deref().unwrap_or_default(),
            id: element.id.as_deref().unwrap_or_default(),
        }
    }
}

pub fn is_sensitive(field: &FieldDescriptor<'_>) -> bool {
    if field.field_type.eq_ignore_ascii_case("password") {
        return true;
    }
    contains_marker(field.name) || contains_marker(field.id)
}

pub fn is_sensitive_element(element: &ElementSnapshot) -> bool {
    is_sensitive(&FieldDescriptor::of(element))
}

fn contains_marker(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let lowered = value.to_lowercase();
    SENSITIVE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::{is_sensitive, is_sensitive_element, FieldDescriptor};
    use crate::types::ElementSnapshot;

    fn field<'a>(field_type: &'a str, name: &'a str, id: &'a str) -> FieldDescriptor<'a> {
        FieldDescriptor {
            field_type,
            name,
            id,
        }
    }

    #[test]
    fn password_type_is_sensitive_in_any_case() {
        assert!(is_sensitive(&field("password", "", "")));
        assert!(is_sensitive(&field("PassWord", "login", "user")));
        assert!(!is_sensitive(&field("passwords", "", "")));
    }

    #[test]
    fn reserved_substrings_in_name_or_id_are_sensitive() {
        for marker in ["card", "cvv", "security", "ssn"] {
            assert!(is_sensitive(&field("text", &format!("billing_{marker}"), "")));
            assert!(is_sensitive(&field("text", "", &format!("{marker}-input"))));
        }
        assert!(is_sensitive(&field("text", "CreditCardNumber", "")));
        assert!(is_sensitive(&field("text", "", "SSN")));
    }

    #[test]
    fn ordinary_fields_are_not_sensitive() {
        assert!(!is_sensitive(&field("", "", "")));
        assert!(!is_sensitive(&field("email", "email", "login-email")));
        assert!(!is_sensitive(&field("search", "q", "search")));
    }

    #[test]
    fn sensitivity_never_depends_on_value() {
        let mut element = ElementSnapshot::new("INPUT");
        element.name = Some("nickname".to_string());
        for value in ["", "4111 1111 1111 1111", "password", "cvv 123"] {
            element.value = Some(value.to_string());
            assert!(!is_sensitive_element(&element));
        }

        element.id = Some("card-number".to_string());
        for value in ["", "hello"] {
            element.value = Some(value.to_string());
            assert!(is_sensitive_element(&element));
        }
    }

    #[test]
    fn missing_attributes_are_treated_as_empty() {
        let element = ElementSnapshot::new("DIV");
        assert!(!is_sensitive_element(&element));
    }
}
