//! Form parameter reading and phenotype metadata

use std::collections::HashMap;

use scraper::{Html, Node};
use validator::Validate;

use crate::domain::workflow::WORKFLOW_NAME_PATTERN;
use crate::domain::DomainError;

/// Reads request form fields, collecting every problem before failing
///
/// Lookups never short-circuit so that one validation error can list all
/// missing and malformed fields together.
pub struct FormReader<'a> {
    fields: &'a HashMap<String, String>,
    missing: Vec<&'static str>,
    invalid: Vec<String>,
}

impl<'a> FormReader<'a> {
    pub fn new(fields: &'a HashMap<String, String>) -> Self {
        Self {
            fields,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// A field that must be present and non-blank
    pub fn required(&mut self, key: &'static str) -> Option<&'a str> {
        match self.fields.get(key).map(|v| v.trim()) {
            Some(value) if !value.is_empty() => Some(value),
            _ => {
                self.missing.push(key);
                None
            }
        }
    }

    /// A required field run through `parse`; a parse failure is recorded against `key`
    pub fn parsed<T>(
        &mut self,
        key: &'static str,
        parse: impl FnOnce(&str) -> Result<T, String>,
    ) -> Option<T> {
        let raw = self.required(key)?;

        match parse(raw) {
            Ok(value) => Some(value),
            Err(reason) => {
                self.invalid.push(format!("{} {}", key, reason));
                None
            }
        }
    }

    /// Fail with a single validation error describing everything that was wrong
    pub fn finish(self) -> Result<(), DomainError> {
        let mut problems = Vec::new();

        if !self.missing.is_empty() {
            problems.push(format!("Missing parameters: {}", self.missing.join(", ")));
        }
        problems.extend(self.invalid);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(problems.join("; ")))
        }
    }
}

/// `true`/`false` in any letter case
pub fn parse_replace(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err("must be 'true' or 'false'".to_string()),
    }
}

/// Elements whose text is code, not content
const DISCARDED_ELEMENTS: [&str; 2] = ["script", "style"];

/// Reduce user-supplied markup to its text content
pub fn sanitize_html(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let text: String = fragment
        .root_element()
        .descendants()
        .filter(|node| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| DISCARDED_ELEMENTS.contains(&e.name()))
            })
        })
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(&**text),
            _ => None,
        })
        .collect();
    text.trim().to_string()
}

/// Identity and ownership fields shared by every technique
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct PhenotypeMetadata {
    #[validate(
        length(min = 1, max = 255, message = "name must be 1 to 255 characters"),
        regex(
            path = *WORKFLOW_NAME_PATTERN,
            message = "name may only contain letters, digits, '_', '-' and '.'"
        )
    )]
    pub name: String,

    #[validate(length(min = 1, message = "about cannot be empty"))]
    pub about: String,

    #[validate(length(min = 1, max = 255, message = "userName must be 1 to 255 characters of text"))]
    pub user_name: String,

    pub replace: bool,
}

impl PhenotypeMetadata {
    /// Read `name`, `about`, `userName` and `replace`, recording problems on `reader`
    pub fn read(reader: &mut FormReader<'_>) -> Option<Self> {
        let name = reader.required("name");
        let about = reader.required("about");
        let user_name = reader.required("userName");
        let replace = reader.parsed("replace", parse_replace);

        Some(Self {
            name: name?.to_string(),
            about: about?.to_string(),
            user_name: sanitize_html(user_name?),
            replace: replace?,
        })
    }

    /// Field-level checks that need the whole struct
    pub fn check(&self) -> Result<(), DomainError> {
        self.validate().map_err(|errors| {
            let mut messages: Vec<String> = errors
                .field_errors()
                .into_iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{} is invalid", field))
                    })
                })
                .collect();
            messages.sort();

            DomainError::validation(messages.join("; "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_replace_case_insensitive() {
        assert_eq!(parse_replace("TRUE"), Ok(true));
        assert_eq!(parse_replace("False"), Ok(false));
        assert!(parse_replace("yes").is_err());
    }

    #[test]
    fn test_sanitize_html_strips_markup() {
        assert_eq!(sanitize_html("alice"), "alice");
        assert_eq!(sanitize_html("<b>alice</b>"), "alice");
        assert_eq!(sanitize_html("  <p>bob</p> "), "bob");
        assert_eq!(sanitize_html("<img src=x onerror=alert(1)>"), "");
    }

    #[test]
    fn test_sanitize_html_drops_script_and_style_bodies() {
        assert_eq!(sanitize_html("<script>x</script>bob"), "bob");
        assert_eq!(sanitize_html("<style>p { color: red }</style><p>alice</p>"), "alice");
        assert_eq!(sanitize_html("<div><script>alert(1)</script>carol</div>"), "carol");
    }

    #[test]
    fn test_reader_reports_all_missing_fields() {
        let form = fields(&[("name", "dtc001"), ("about", "   ")]);
        let mut reader = FormReader::new(&form);

        assert!(PhenotypeMetadata::read(&mut reader).is_none());

        let err = reader.finish().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Missing parameters: about, userName, replace"
        );
    }

    #[test]
    fn test_reader_reports_invalid_values() {
        let form = fields(&[
            ("name", "dtc001"),
            ("about", "desc"),
            ("userName", "alice"),
            ("replace", "maybe"),
        ]);
        let mut reader = FormReader::new(&form);

        assert!(PhenotypeMetadata::read(&mut reader).is_none());
        let message = reader.finish().unwrap_err().to_string();
        assert!(message.contains("replace must be 'true' or 'false'"));
    }

    #[test]
    fn test_metadata_read_and_check() {
        let form = fields(&[
            ("name", "dtc001"),
            ("about", "A decision tree"),
            ("userName", "<i>alice</i>"),
            ("replace", "false"),
        ]);
        let mut reader = FormReader::new(&form);

        let metadata = PhenotypeMetadata::read(&mut reader).unwrap();
        reader.finish().unwrap();

        assert_eq!(metadata.user_name, "alice");
        assert!(!metadata.replace);
        assert!(metadata.check().is_ok());
    }

    #[test]
    fn test_metadata_check_rejects_path_like_name() {
        let metadata = PhenotypeMetadata {
            name: "../escape".to_string(),
            about: "x".to_string(),
            user_name: "alice".to_string(),
            replace: false,
        };

        let err = metadata.check().unwrap_err();
        assert!(err.to_string().contains("name may only contain"));
    }

    #[test]
    fn test_metadata_check_rejects_markup_only_user() {
        let metadata = PhenotypeMetadata {
            name: "ok".to_string(),
            about: "x".to_string(),
            user_name: sanitize_html("<br>"),
            replace: false,
        };

        assert!(metadata.check().is_err());
    }
}
