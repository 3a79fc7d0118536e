//! Per-field comparison results.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::StructuredOutput;

/// Verdict of comparing one field of the extracted document with the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonVerdict {
    /// Values refer to the same thing
    Same,
    /// Values disagree
    Different,
    /// Needs a human decision
    ToBeChecked,
}

impl ComparisonVerdict {
    const NAMES: [&'static str; 3] = ["Same", "Different", "ToBeChecked"];

    #[must_use]
    pub const fn is_same(self) -> bool {
        matches!(self, Self::Same)
    }
}

impl std::fmt::Display for ComparisonVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Same => write!(f, "Same"),
            Self::Different => write!(f, "Different"),
            Self::ToBeChecked => write!(f, "ToBeChecked"),
        }
    }
}

fn pair_schema(first: &str, second: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            first: {"type": "string"},
            second: {"type": "string"},
            "result": {"type": "string", "enum": ComparisonVerdict::NAMES},
        },
        "required": [first, second, "result"],
        "additionalProperties": false,
    })
}

/// Comparison of a single scalar field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldComparisonResult {
    pub field1: String,
    pub field2: String,
    pub result: ComparisonVerdict,
}

impl StructuredOutput for FieldComparisonResult {
    fn schema_name() -> &'static str {
        "FieldComparisonResult"
    }

    fn json_schema() -> Value {
        pair_schema("field1", "field2")
    }
}

/// Comparison of two full names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameComparisonResult {
    pub name1: String,
    pub name2: String,
    pub result: ComparisonVerdict,
}

impl StructuredOutput for NameComparisonResult {
    fn schema_name() -> &'static str {
        "NameComparisonResult"
    }

    fn json_schema() -> Value {
        pair_schema("name1", "name2")
    }
}

/// Comparison of two free-text addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComparisonResult {
    pub address1: String,
    pub address2: String,
    pub result: ComparisonVerdict,
}

impl StructuredOutput for AddressComparisonResult {
    fn schema_name() -> &'static str {
        "AddressComparisonResult"
    }

    fn json_schema() -> Value {
        pair_schema("address1", "address2")
    }
}

/// Outcome of checking one field, whichever strategy produced it.
///
/// Untagged on the wire: the key names (`field1`, `name1`, `address1`)
/// identify the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldCheck {
    Field(FieldComparisonResult),
    Name(NameComparisonResult),
    Address(AddressComparisonResult),
}

impl FieldCheck {
    #[must_use]
    pub const fn verdict(&self) -> ComparisonVerdict {
        match self {
            Self::Field(r) => r.result,
            Self::Name(r) => r.result,
            Self::Address(r) => r.result,
        }
    }

    /// Field check with a fixed verdict and no oracle involvement
    pub fn field(
        field1: impl Into<String>,
        field2: impl Into<String>,
        result: ComparisonVerdict,
    ) -> Self {
        Self::Field(FieldComparisonResult {
            field1: field1.into(),
            field2: field2.into(),
            result,
        })
    }
}

impl From<FieldComparisonResult> for FieldCheck {
    fn from(r: FieldComparisonResult) -> Self {
        Self::Field(r)
    }
}

impl From<NameComparisonResult> for FieldCheck {
    fn from(r: NameComparisonResult) -> Self {
        Self::Name(r)
    }
}

impl From<AddressComparisonResult> for FieldCheck {
    fn from(r: AddressComparisonResult) -> Self {
        Self::Address(r)
    }
}

/// Field checks in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChecks {
    entries: Vec<(String, FieldCheck)>,
}

impl FieldChecks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, check: FieldCheck) {
        self.entries.push((field.into(), check));
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldCheck> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, check)| check)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldCheck)> {
        self.entries.iter().map(|(name, check)| (name.as_str(), check))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every check came back `Same` (vacuously true when empty)
    #[must_use]
    pub fn all_same(&self) -> bool {
        self.entries.iter().all(|(_, c)| c.verdict().is_same())
    }
}

impl<'a> IntoIterator for &'a FieldChecks {
    type Item = &'a (String, FieldCheck);
    type IntoIter = std::slice::Iter<'a, (String, FieldCheck)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
