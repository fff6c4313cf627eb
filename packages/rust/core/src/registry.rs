//! Domain registry: the closed set of BioCompute Object domains a session
//! can query, resolved once at startup.

use std::collections::HashSet;
use std::path::Path;

use bcorag_shared::{BcoRagError, Result};
use serde::{Deserialize, Serialize};

/// Token that ends the session at any prompt. Reserved: no domain may use it.
pub const EXIT_TOKEN: &str = "exit";

/// One queryable domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDescriptor {
    /// Domain name, e.g. `usability`. Used in prompts and artifact names.
    pub name: String,
    /// Schema or prose sent to the model alongside the domain name.
    pub grounding_text: String,
    /// Short label shown in selection menus.
    pub user_label: String,
    /// Short code accepted at the selection prompt.
    pub selection_code: String,
}

/// On-disk shape of a domains file: a `[[domains]]` array.
#[derive(Debug, Deserialize)]
struct DomainsFile {
    domains: Vec<DomainDescriptor>,
}

/// Immutable name/code → descriptor lookup, in registration order.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    domains: Vec<DomainDescriptor>,
}

impl DomainRegistry {
    /// Build a registry. Empty sets, blank fields, and duplicate names or
    /// codes are configuration errors.
    ///
    /// Names become artifact file names, so they are limited to ASCII
    /// letters, digits, `_` and `-`. Neither a name nor a code may be the
    /// exit token, and a code may not select a different domain's name.
    pub fn new(domains: Vec<DomainDescriptor>) -> Result<Self> {
        if domains.is_empty() {
            return Err(BcoRagError::config("no domains registered"));
        }

        let mut names = HashSet::new();
        let mut codes = HashSet::new();
        for d in &domains {
            if d.name.trim().is_empty() || d.selection_code.trim().is_empty() {
                return Err(BcoRagError::config(
                    "domain name and selection code must not be empty",
                ));
            }
            if !is_valid_name(&d.name) {
                return Err(BcoRagError::config(format!(
                    "domain name '{}' may only contain ASCII letters, digits, '_' and '-'",
                    d.name
                )));
            }
            for token in [&d.name, &d.selection_code] {
                if token.trim().eq_ignore_ascii_case(EXIT_TOKEN) {
                    return Err(BcoRagError::config(format!(
                        "'{token}' is reserved for ending the session"
                    )));
                }
            }
            if !names.insert(d.name.to_lowercase()) {
                return Err(BcoRagError::config(format!("duplicate domain name '{}'", d.name)));
            }
            if !codes.insert(d.selection_code.trim().to_lowercase()) {
                return Err(BcoRagError::config(format!(
                    "duplicate selection code '{}'",
                    d.selection_code
                )));
            }
        }

        for d in &domains {
            let code = d.selection_code.trim();
            if let Some(other) = domains
                .iter()
                .find(|o| o.name != d.name && o.name.eq_ignore_ascii_case(code))
            {
                return Err(BcoRagError::config(format!(
                    "selection code '{}' of domain '{}' collides with domain name '{}'",
                    d.selection_code, d.name, other.name
                )));
            }
        }

        Ok(Self { domains })
    }

    /// Parse a `[[domains]]` TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: DomainsFile = toml::from_str(content)
            .map_err(|e| BcoRagError::config(format!("invalid domains file: {e}")))?;
        Self::new(file.domains)
    }

    /// Load a `[[domains]]` TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BcoRagError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Exact lookup by domain name.
    pub fn lookup(&self, name: &str) -> Option<&DomainDescriptor> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Exact lookup by selection code.
    pub fn lookup_by_code(&self, code: &str) -> Option<&DomainDescriptor> {
        self.domains.iter().find(|d| d.selection_code == code)
    }

    /// All descriptors, in registration order.
    pub fn all(&self) -> &[DomainDescriptor] {
        &self.domains
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, code: &str) -> DomainDescriptor {
        DomainDescriptor {
            name: name.into(),
            grounding_text: format!("schema for {name}"),
            user_label: format!("{name} domain"),
            selection_code: code.into(),
        }
    }

    fn registry() -> DomainRegistry {
        DomainRegistry::new(vec![
            descriptor("usability", "u"),
            descriptor("io", "i"),
            descriptor("error", "err"),
        ])
        .unwrap()
    }

    #[test]
    fn lookup_by_name_and_code_round_trip() {
        let registry = registry();
        for d in registry.all() {
            assert_eq!(registry.lookup(&d.name), Some(d));
            assert_eq!(registry.lookup_by_code(&d.selection_code), Some(d));
        }
    }

    #[test]
    fn unknown_lookups_are_none() {
        let registry = registry();
        assert!(registry.lookup("provenance").is_none());
        assert!(registry.lookup_by_code("x").is_none());
    }

    #[test]
    fn all_preserves_registration_order() {
        let names: Vec<_> = registry().all().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["usability", "io", "error"]);
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        assert!(DomainRegistry::new(vec![]).is_err());
        assert!(DomainRegistry::new(vec![descriptor("io", "i"), descriptor("io", "o")]).is_err());
        assert!(DomainRegistry::new(vec![descriptor("io", "i"), descriptor("usability", "i")]).is_err());
        assert!(DomainRegistry::new(vec![descriptor("bad name", "b")]).is_err());
        assert!(DomainRegistry::new(vec![descriptor("io", " ")]).is_err());
    }

    #[test]
    fn rejects_names_that_leave_the_session_dir() {
        for name in ["../escaped", "a/b", "a\\b", "..", "io.json"] {
            let err = DomainRegistry::new(vec![descriptor(name, "x")]).unwrap_err();
            assert!(matches!(err, BcoRagError::Config { .. }), "accepted {name:?}");
        }
        assert!(DomainRegistry::new(vec![descriptor("custom-domain_2", "c")]).is_ok());
    }

    #[test]
    fn rejects_exit_token_as_name_or_code() {
        assert!(DomainRegistry::new(vec![descriptor("execution", "exit")]).is_err());
        assert!(DomainRegistry::new(vec![descriptor("execution", " EXIT ")]).is_err());
        assert!(DomainRegistry::new(vec![descriptor("Exit", "x")]).is_err());
    }

    #[test]
    fn rejects_code_shadowing_another_name() {
        let err = DomainRegistry::new(vec![descriptor("io", "i"), descriptor("error", "IO")])
            .unwrap_err();
        assert!(err.to_string().contains("collides"));
        assert!(DomainRegistry::new(vec![descriptor("io", "io")]).is_ok());
    }

    #[test]
    fn parses_domains_toml() {
        let registry = DomainRegistry::from_toml_str(
            r#"
[[domains]]
name = "usability"
grounding_text = "A plain-text list of uses."
user_label = "Usability"
selection_code = "u"

[[domains]]
name = "io"
grounding_text = "Input and output files."
user_label = "IO"
selection_code = "i"
"#,
        )
        .unwrap();

        assert_eq!(registry.all().len(), 2);
        assert_eq!(
            registry.lookup_by_code("i").map(|d| d.grounding_text.as_str()),
            Some("Input and output files.")
        );
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = DomainRegistry::from_toml_str("[[domains]]\nname = 3").unwrap_err();
        assert!(matches!(err, BcoRagError::Config { .. }));
    }
}
