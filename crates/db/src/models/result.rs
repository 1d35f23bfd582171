//! Per-serial lookup result models.

use chrono::NaiveDate;
use markbatch_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `lookup_results` table.
///
/// `position` is the processing-order index within the job; the final
/// result list is ordered by it. Attribute columns are nullable -- the
/// registry omits most of them for dead or very old filings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LookupResult {
    pub id: DbId,
    pub job_id: DbId,
    pub position: i32,
    pub serial_number: String,
    pub status_id: StatusId,
    pub owner_name: Option<String>,
    pub mark_text: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub registration_number: Option<String>,
    pub mark_status: Option<String>,
    pub attorney_name: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
}

/// Insert payload for one lookup result.
#[derive(Debug, Clone)]
pub struct NewLookupResult {
    pub position: i32,
    pub serial_number: String,
    pub status_id: StatusId,
    pub owner_name: Option<String>,
    pub mark_text: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub registration_number: Option<String>,
    pub mark_status: Option<String>,
    pub attorney_name: Option<String>,
    pub error_message: Option<String>,
}
