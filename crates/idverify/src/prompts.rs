//! Prompt templates for extraction and field comparison.
//!
//! Placeholders are written `{name}` and filled by [`render`]. Any template
//! can be replaced by dropping a file of the same name into the configured
//! prompt directory.

use crate::error::{Result, VerifyError};
use std::path::Path;
use tracing::debug;

pub const EXTRACTION_FILE: &str = "id_document_extraction.txt";
pub const NAME_COMPARISON_FILE: &str = "name_comparison_prompt.txt";
pub const ADDRESS_COMPARISON_FILE: &str = "address_comparison_prompt.txt";
pub const FIELD_COMPARISON_FILE: &str = "field_comparison_prompt.txt";

const EXTRACTION_PROMPT: &str = r#"You are an expert in reading identity documents: passports, driver's licenses, national ID cards and Social Security cards.

Extract every field of the identity document shown in the attached image(s) into the requested JSON schema.

RULES:
1. Copy values exactly as printed. Do not translate, reformat or correct them, except dates of birth, which must be written DD.MM.YYYY.
2. If a field does not appear on the document, return null for it. Use an empty string only when the field label is printed but its value is blank.
3. "photo" and "signature" are "True" when the document carries the holder's photo or signature and "False" otherwise.
4. Put anything printed on the document that no other field covers into "additional_attributes".
5. "document_type" must be one of: Passport, Driver's License, National ID, Social Security Card.

Document:
{document}

Previously extracted information:
{extracted}

Return ONLY the JSON object."#;

const NAME_COMPARISON_PROMPT: &str = r#"Decide whether the two full names below refer to the same person.

Treat as the same: nicknames and short forms (Jon / John, Bill / William), transliteration variants, a missing middle name on one side, and different ordering of the same name parts.
Treat as different: clearly different first or last names.
If you cannot decide with confidence, answer ToBeChecked.

Name 1: {name1}
Name 2: {name2}

Answer with a JSON object {"name1": ..., "name2": ..., "result": "Same" | "Different" | "ToBeChecked"}."#;

const ADDRESS_COMPARISON_PROMPT: &str = r#"Decide whether the two addresses below refer to the same place.

Treat as the same: abbreviations (St / Street, Ave / Avenue, Apt / #), different capitalization or punctuation, and missing country or postal code when everything else agrees.
Treat as different: different house numbers, streets, or cities.
If you cannot decide with confidence, answer ToBeChecked.

Address 1: {address1}
Address 2: {address2}

Answer with a JSON object {"address1": ..., "address2": ..., "result": "Same" | "Different" | "ToBeChecked"}."#;

const FIELD_COMPARISON_PROMPT: &str = r#"Decide whether two values of the identity-document field "{field_name}" are equivalent.

Treat as the same: formatting differences only (date separators or order when unambiguous, letter case, spacing, leading zeros, country name versus country code).
Treat as different: any difference in the underlying value.
If you cannot decide with confidence, answer ToBeChecked.

Value 1: {field1}
Value 2: {field2}

Answer with a JSON object {"field1": ..., "field2": ..., "result": "Same" | "Different" | "ToBeChecked"}."#;

/// The four prompt templates the pipeline uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub extraction: String,
    pub name_comparison: String,
    pub address_comparison: String,
    pub field_comparison: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            extraction: EXTRACTION_PROMPT.to_string(),
            name_comparison: NAME_COMPARISON_PROMPT.to_string(),
            address_comparison: ADDRESS_COMPARISON_PROMPT.to_string(),
            field_comparison: FIELD_COMPARISON_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Built-in templates, overridden by any matching file in `dir`
    ///
    /// # Errors
    /// Returns an error if an override file exists but cannot be read.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::default();
        let Some(dir) = dir else {
            return Ok(templates);
        };

        for (file, slot) in [
            (EXTRACTION_FILE, &mut templates.extraction),
            (NAME_COMPARISON_FILE, &mut templates.name_comparison),
            (ADDRESS_COMPARISON_FILE, &mut templates.address_comparison),
            (FIELD_COMPARISON_FILE, &mut templates.field_comparison),
        ] {
            let path = dir.join(file);
            if path.is_file() {
                *slot = std::fs::read_to_string(&path).map_err(|e| {
                    VerifyError::Config(format!("failed to read prompt {}: {e}", path.display()))
                })?;
                debug!("Loaded prompt override {}", path.display());
            }
        }
        Ok(templates)
    }
}

/// Fill `{key}` placeholders; unknown placeholders are left as written
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close + 1))
        });
        match value {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholders() {
        let out = render(
            "{field_name}: {field1} vs {field2}",
            &[("field_name", "gender"), ("field1", "M"), ("field2", "Male")],
        );
        assert_eq!(out, "gender: M vs Male");
    }

    #[test]
    fn test_render_does_not_expand_placeholders_inside_values() {
        let out = render(
            "Name 1: {name1}\nName 2: {name2}",
            &[("name1", "Jon {name2} Doe"), ("name2", "John Doe")],
        );
        assert_eq!(out, "Name 1: Jon {name2} Doe\nName 2: John Doe");

        let out = render("{a}{b} {missing} {", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b}x {missing} {");
    }

    #[test]
    fn test_render_keeps_json_braces() {
        let out = render(NAME_COMPARISON_PROMPT, &[("name1", "Jon Doe"), ("name2", "John Doe")]);
        assert!(out.contains("Name 1: Jon Doe"));
        assert!(out.contains(r#"{"name1": ..., "name2": ..."#));
    }

    #[test]
    fn test_overrides_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ADDRESS_COMPARISON_FILE), "custom {address1}").unwrap();

        let templates = PromptTemplates::load(Some(dir.path())).unwrap();
        assert_eq!(templates.address_comparison, "custom {address1}");
        assert_eq!(templates.extraction, EXTRACTION_PROMPT);
    }
}
