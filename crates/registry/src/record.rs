//! Parsed trademark record attributes.

use chrono::NaiveDate;

/// Attribute bag for one registry record. Everything is optional -- the
/// registry omits most fields for dead or very old filings.
#[derive(Debug, Clone, Default)]
pub struct TrademarkRecord {
    pub serial_number: String,
    pub owner_name: Option<String>,
    pub mark_text: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub registration_number: Option<String>,
    pub mark_status: Option<String>,
    pub attorney_name: Option<String>,
    /// The owner is represented by a third party (attorney of record).
    /// Whether that excludes the record from final results is decided by
    /// the configured filter policy, not here.
    pub is_represented: bool,
}

impl TrademarkRecord {
    /// Parse a record from the registry's status-document JSON.
    ///
    /// Tolerant by design: missing or mistyped fields become `None`
    /// rather than an error, because partial records are common.
    pub fn from_json(serial_number: &str, body: &serde_json::Value) -> Self {
        let trademark = &body["trademark"];

        let attorney_name = string_field(trademark, "attorneyName");
        let is_represented = attorney_name.is_some()
            || trademark["representedByThirdParty"].as_bool() == Some(true);

        Self {
            serial_number: serial_number.to_string(),
            owner_name: string_field(trademark, "ownerName"),
            mark_text: string_field(trademark, "markText"),
            filing_date: string_field(trademark, "filingDate")
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            registration_number: string_field(trademark, "registrationNumber"),
            mark_status: string_field(trademark, "status"),
            attorney_name,
            is_represented,
        }
    }
}

/// Non-empty string field, or `None`.
fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
