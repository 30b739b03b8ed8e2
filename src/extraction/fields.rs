//! Normalized identity document fields
//!
//! The key set is closed: every key is always present, absent data is an
//! explicit `null`, and anything the model adds beyond these keys is dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Every key of [`DocumentFields`], in output order
pub const FIELD_NAMES: [&str; 14] = [
    "document_type",
    "name",
    "father_name",
    "dob",
    "gender",
    "aadhar_number",
    "pan_number",
    "dl_number",
    "address",
    "blood_group",
    "issue_date",
    "validity",
    "pin_code",
    "state",
];

/// Kind of identity document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Aadhar,
    Pan,
    DrivingLicense,
    VoterId,
    Unknown,
}

impl DocumentType {
    /// Interpret a model label; unrecognized labels become `Unknown`
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "aadhar" | "aadhaar" | "aadhar_card" | "aadhaar_card" => Self::Aadhar,
            "pan" | "pan_card" => Self::Pan,
            "driving_license" | "driving_licence" => Self::DrivingLicense,
            "voter_id" | "voter_id_card" | "epic" => Self::VoterId,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aadhar => "aadhar",
            Self::Pan => "pan",
            Self::DrivingLicense => "driving_license",
            Self::VoterId => "voter_id",
            Self::Unknown => "unknown",
        }
    }
}

/// Fields read from one identity document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields {
    pub document_type: Option<DocumentType>,
    pub name: Option<String>,
    pub father_name: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub aadhar_number: Option<String>,
    pub pan_number: Option<String>,
    pub dl_number: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub issue_date: Option<String>,
    pub validity: Option<String>,
    pub pin_code: Option<String>,
    pub state: Option<String>,
}

impl DocumentFields {
    /// Project a model JSON object onto the closed key set
    pub fn from_model_output(output: &Map<String, Value>) -> Self {
        for key in output.keys().filter(|k| !FIELD_NAMES.contains(&k.as_str())) {
            debug!("Dropping unrecognized field {:?} from model output", key);
        }
        let text = |key: &str| output.get(key).and_then(coerce_text);

        Self {
            document_type: text("document_type").map(|label| DocumentType::from_label(&label)),
            name: text("name"),
            father_name: text("father_name"),
            dob: text("dob"),
            gender: text("gender"),
            aadhar_number: text("aadhar_number"),
            pan_number: text("pan_number"),
            dl_number: text("dl_number"),
            address: text("address"),
            blood_group: text("blood_group"),
            issue_date: text("issue_date"),
            // Some documents label this "expiry"
            validity: text("validity").or_else(|| text("expiry_date")),
            pin_code: text("pin_code"),
            state: text("state"),
        }
    }

    /// Number of keys carrying a value
    pub fn populated(&self) -> usize {
        let strings = [
            &self.name,
            &self.father_name,
            &self.dob,
            &self.gender,
            &self.aadhar_number,
            &self.pan_number,
            &self.dl_number,
            &self.address,
            &self.blood_group,
            &self.issue_date,
            &self.validity,
            &self.pin_code,
            &self.state,
        ];
        strings.iter().filter(|v| v.is_some()).count() + usize::from(self.document_type.is_some())
    }
}

/// Strings are trimmed, numbers are stringified, everything else is absent
fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
