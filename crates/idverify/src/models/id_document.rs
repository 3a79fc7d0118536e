//! The structured ID document returned by the extraction oracle.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::llm::StructuredOutput;

/// Kind of identity document.
///
/// Serialized with the display names the extraction prompt asks for; the
/// Rust-style spellings are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "Passport")]
    Passport,
    #[serde(
        rename = "Driver's License",
        alias = "DriverLicense",
        alias = "Driver License",
        alias = "Drivers License"
    )]
    DriverLicense,
    #[serde(rename = "National ID", alias = "NationalID", alias = "NationalId")]
    NationalId,
    #[serde(rename = "Social Security Card", alias = "SocialSecurityCard")]
    SocialSecurityCard,
}

impl DocumentType {
    /// All document types, in schema order
    pub const ALL: [Self; 4] = [
        Self::Passport,
        Self::DriverLicense,
        Self::NationalId,
        Self::SocialSecurityCard,
    ];

    /// Display name used on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Passport => "Passport",
            Self::DriverLicense => "Driver's License",
            Self::NationalId => "National ID",
            Self::SocialSecurityCard => "Social Security Card",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema fields with the descriptions given to the language model, in
/// declaration order.
const SCHEMA_FIELDS: [(&str, &str); 27] = [
    ("document_type", "Type of the document (e.g., Passport, Driver's License, National ID, Social Security Card)"),
    ("photo", "Confirmation that the ID document does include the individual's photo (\"True\" or \"False\")"),
    ("signature", "Confirmation that the ID document does include the individual's signature (\"True\" or \"False\")"),
    ("first_name", "Name of the individual (First Name)"),
    ("middle_name", "Middle name of the individual (Middle)"),
    ("last_name", "Surname (family name) of the individual (Last)"),
    ("date_of_birth", "Date of birth in DD.MM.YYYY format"),
    ("nationality", "Nationality of the individual"),
    ("gender", "Gender of the individual"),
    ("address", "Home address of the individual (if applicable)"),
    ("passport_number", "Passport number"),
    ("place_of_birth", "Place of birth for passport holders"),
    ("passport_issue_date", "Date when the passport was issued"),
    ("passport_expiry_date", "Passport expiry date"),
    ("passport_place_of_issue", "Place where the passport was issued"),
    ("passport_mrz_code", "Machine Readable Zone (MRZ) code for passports"),
    ("license_number", "Driver's license number"),
    ("vehicle_class", "Vehicle class or endorsement on the license"),
    ("license_issue_date", "Driver's license issue date"),
    ("license_expiry_date", "Driver's license expiry date"),
    ("national_id_number", "National ID card number"),
    ("id_card_issue_date", "National ID card issue date"),
    ("id_card_expiry_date", "National ID card expiry date"),
    ("social_security_number", "Social Security number"),
    ("ssn_issue_date", "Date when the Social Security card was issued (if available)"),
    ("file_url", "URL to the file containing the ID document"),
    ("additional_attributes", "Any additional information not covered by other fields"),
];

/// A structured identity document.
///
/// Absent fields are `None`; an empty string means the field was present on
/// the document but blank. `photo` and `signature` carry `"True"`/`"False"`
/// as returned by the extraction oracle, until `photo` is back-filled with a
/// reference to the cropped face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdDocument {
    pub document_type: DocumentType,

    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,

    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub passport_number: Option<String>,
    #[serde(default)]
    pub place_of_birth: Option<String>,
    #[serde(default)]
    pub passport_issue_date: Option<String>,
    #[serde(default)]
    pub passport_expiry_date: Option<String>,
    #[serde(default)]
    pub passport_place_of_issue: Option<String>,
    #[serde(default)]
    pub passport_mrz_code: Option<String>,

    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub vehicle_class: Option<String>,
    #[serde(default)]
    pub license_issue_date: Option<String>,
    #[serde(default)]
    pub license_expiry_date: Option<String>,

    #[serde(default)]
    pub national_id_number: Option<String>,
    #[serde(default)]
    pub id_card_issue_date: Option<String>,
    #[serde(default)]
    pub id_card_expiry_date: Option<String>,

    #[serde(default)]
    pub social_security_number: Option<String>,
    #[serde(default)]
    pub ssn_issue_date: Option<String>,

    #[serde(default)]
    pub file_url: Option<String>,

    #[serde(default)]
    pub additional_attributes: Option<BTreeMap<String, String>>,
}

impl IdDocument {
    /// Every field declared in the schema, in declaration order
    pub const FIELD_NAMES: [&'static str; SCHEMA_FIELDS.len()] = {
        let mut names = [""; SCHEMA_FIELDS.len()];
        let mut i = 0;
        while i < SCHEMA_FIELDS.len() {
            names[i] = SCHEMA_FIELDS[i].0;
            i += 1;
        }
        names
    };

    /// An otherwise empty document of the given type
    #[must_use]
    pub fn new(document_type: DocumentType) -> Self {
        Self {
            document_type,
            photo: None,
            signature: None,
            first_name: None,
            middle_name: None,
            last_name: None,
            date_of_birth: None,
            nationality: None,
            gender: None,
            address: None,
            passport_number: None,
            place_of_birth: None,
            passport_issue_date: None,
            passport_expiry_date: None,
            passport_place_of_issue: None,
            passport_mrz_code: None,
            license_number: None,
            vehicle_class: None,
            license_issue_date: None,
            license_expiry_date: None,
            national_id_number: None,
            id_card_issue_date: None,
            id_card_expiry_date: None,
            social_security_number: None,
            ssn_issue_date: None,
            file_url: None,
            additional_attributes: None,
        }
    }

    /// Ordered JSON object of all fields, absent ones as `null`
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct with only string/map fields always serializes to an object.
            _ => Map::new(),
        }
    }

    /// Whether the extraction oracle reported a photo on the document
    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.photo
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case("true"))
    }
}

impl StructuredOutput for IdDocument {
    fn schema_name() -> &'static str {
        "IDDocument"
    }

    fn json_schema() -> Value {
        let mut properties = Map::new();
        for (name, description) in SCHEMA_FIELDS {
            let property = match name {
                "document_type" => json!({
                    "type": "string",
                    "enum": DocumentType::ALL.iter().map(DocumentType::as_str).collect::<Vec<_>>(),
                    "description": description,
                }),
                "additional_attributes" => json!({
                    "type": ["object", "null"],
                    "additionalProperties": {"type": "string"},
                    "description": description,
                }),
                _ => json!({
                    "type": ["string", "null"],
                    "description": description,
                }),
            };
            properties.insert(name.to_string(), property);
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": ["document_type"],
        })
    }
}
