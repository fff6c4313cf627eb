//! Query template shared by every domain.

use crate::registry::DomainDescriptor;

/// Wrapper for every domain query. The first `{}` takes the domain name, the
/// second the domain's grounding text.
pub const QUERY_TEMPLATE: &str = "Can you give me a BioCompute Object {} domain for the provided paper. \
The return response must be valid JSON and must validate against the JSON schema I am providing you. {}";

/// Fill [`QUERY_TEMPLATE`] for `domain`.
pub fn compose_query(domain: &DomainDescriptor) -> String {
    let mut parts = QUERY_TEMPLATE.splitn(3, "{}");
    let head = parts.next().unwrap_or_default();
    let middle = parts.next().unwrap_or_default();
    let tail = parts.next().unwrap_or_default();
    format!(
        "{head}{}{middle}{}{tail}",
        domain.name, domain.grounding_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_name_and_grounding_text() {
        let domain = DomainDescriptor {
            name: "usability".into(),
            grounding_text: "The usability domain is a plain-text list.".into(),
            user_label: "Usability".into(),
            selection_code: "u".into(),
        };

        let query = compose_query(&domain);
        assert_eq!(
            query,
            "Can you give me a BioCompute Object usability domain for the provided paper. \
             The return response must be valid JSON and must validate against the JSON schema \
             I am providing you. The usability domain is a plain-text list."
        );
    }

    #[test]
    fn grounding_text_with_braces_is_inserted_verbatim() {
        let domain = DomainDescriptor {
            name: "io".into(),
            grounding_text: "{\"type\": \"object\", \"x\": \"{}\"}".into(),
            user_label: "IO".into(),
            selection_code: "i".into(),
        };
        assert!(compose_query(&domain).ends_with("{\"type\": \"object\", \"x\": \"{}\"}"));
    }
}
