//! Condition evaluation over aggregates and quantified inputs

use es_rules::{Quantifier, UnknownHandling};

/// Match of a quantified condition and the entity it is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantifiedMatch {
    pub matched: bool,
    pub entity_id: Option<String>,
}

/// Apply `any`/`all` over valid inputs
///
/// `any` is attributed to the first matching input, `all` to the first valid
/// input whether or not the rule matched.
pub fn quantify<T>(
    quantifier: Quantifier,
    values: &[(String, T)],
    predicate: impl Fn(&T) -> bool,
) -> QuantifiedMatch {
    match quantifier {
        Quantifier::Any => {
            let first = values.iter().find(|(_, value)| predicate(value));
            QuantifiedMatch {
                matched: first.is_some(),
                entity_id: first.map(|(entity_id, _)| entity_id.clone()),
            }
        }
        Quantifier::All => QuantifiedMatch {
            matched: !values.is_empty() && values.iter().all(|(_, value)| predicate(value)),
            entity_id: values.first().map(|(entity_id, _)| entity_id.clone()),
        },
    }
}

/// Match forced by the unknown-handling policy when no input is readable
///
/// `None` means the rule contributes nothing this tick.
pub fn unknown_match(handling: UnknownHandling) -> Option<bool> {
    match handling {
        UnknownHandling::Ignore => None,
        UnknownHandling::TreatOk => Some(false),
        UnknownHandling::TreatViolation => Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doors(states: &[(&str, bool)]) -> Vec<(String, bool)> {
        states.iter().map(|(e, on)| (e.to_string(), *on)).collect()
    }

    #[test]
    fn test_any_attributes_first_match() {
        let values = doors(&[("door.a", false), ("door.b", true), ("door.c", true)]);
        let result = quantify(Quantifier::Any, &values, |on| *on);
        assert!(result.matched);
        assert_eq!(result.entity_id.as_deref(), Some("door.b"));

        let result = quantify(Quantifier::Any, &values[..1], |on| *on);
        assert!(!result.matched);
        assert_eq!(result.entity_id, None);
    }

    #[test]
    fn test_all_attributes_first_valid_input() {
        let values = doors(&[("door.a", true), ("door.b", true)]);
        let result = quantify(Quantifier::All, &values, |on| *on);
        assert!(result.matched);
        assert_eq!(result.entity_id.as_deref(), Some("door.a"));

        let values = doors(&[("door.a", false), ("door.b", true)]);
        let result = quantify(Quantifier::All, &values, |on| *on);
        assert!(!result.matched);
        assert_eq!(result.entity_id.as_deref(), Some("door.a"));
    }

    #[test]
    fn test_unknown_policy() {
        assert_eq!(unknown_match(UnknownHandling::Ignore), None);
        assert_eq!(unknown_match(UnknownHandling::TreatOk), Some(false));
        assert_eq!(unknown_match(UnknownHandling::TreatViolation), Some(true));
    }
}
