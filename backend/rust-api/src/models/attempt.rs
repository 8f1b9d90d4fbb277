use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::utils::time::{parse_iso_millis, to_iso_millis};

/// NREMT EMT exam content areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamCategory {
    Airway,
    Cardiology,
    Trauma,
    Medical,
    Operations,
}

/// One recorded response to a quiz question. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Canonical ISO-8601 timestamp, unique per user; doubles as sort key.
    pub attempt_id: String,
    pub user_id: String,
    pub question_id: String,
    pub category: ExamCategory,
    pub timestamp_started: DateTime<Utc>,
    pub timestamp_submitted: DateTime<Utc>,
    pub response_time_ms: u64,
    pub selected_choice_index: u32,
    pub is_correct: bool,
    pub attempt_number_for_question: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_explanation_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_hours: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_timestamps"))]
pub struct CreateAttemptRequest {
    /// Defaults to `timestamp_submitted` in canonical form.
    #[validate(custom(function = "validate_attempt_id"))]
    pub attempt_id: Option<String>,
    #[validate(length(min = 1, max = 128, message = "question_id must be 1-128 characters"))]
    pub question_id: String,
    pub category: ExamCategory,
    pub timestamp_started: DateTime<Utc>,
    pub timestamp_submitted: DateTime<Utc>,
    /// Defaults to `timestamp_submitted - timestamp_started`.
    pub response_time_ms: Option<u64>,
    pub selected_choice_index: u32,
    pub is_correct: bool,
    #[validate(range(min = 1, message = "attempt_number_for_question starts at 1"))]
    pub attempt_number_for_question: u32,
    pub reviewed_explanation_ms: Option<u64>,
    #[validate(range(min = 0.0, message = "retry_interval_hours cannot be negative"))]
    pub retry_interval_hours: Option<f64>,
}

impl CreateAttemptRequest {
    pub fn into_attempt(self, user_id: &str) -> Attempt {
        let response_time_ms = self.response_time_ms.unwrap_or_else(|| {
            (self.timestamp_submitted - self.timestamp_started)
                .num_milliseconds()
                .max(0) as u64
        });

        Attempt {
            attempt_id: self
                .attempt_id
                .unwrap_or_else(|| to_iso_millis(self.timestamp_submitted)),
            user_id: user_id.to_string(),
            question_id: self.question_id,
            category: self.category,
            timestamp_started: self.timestamp_started,
            timestamp_submitted: self.timestamp_submitted,
            response_time_ms,
            selected_choice_index: self.selected_choice_index,
            is_correct: self.is_correct,
            attempt_number_for_question: self.attempt_number_for_question,
            reviewed_explanation_ms: self.reviewed_explanation_ms,
            retry_interval_hours: self.retry_interval_hours,
        }
    }
}

fn validate_attempt_id(attempt_id: &str) -> Result<(), ValidationError> {
    if parse_iso_millis(attempt_id).is_none() {
        let mut err = ValidationError::new("attempt_id");
        err.message = Some("attempt_id must look like 2026-01-31T08:15:00.000Z".into());
        return Err(err);
    }
    Ok(())
}

fn validate_timestamps(req: &CreateAttemptRequest) -> Result<(), ValidationError> {
    if req.timestamp_submitted < req.timestamp_started {
        let mut err = ValidationError::new("timestamps");
        err.message = Some("timestamp_submitted is before timestamp_started".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListAttemptsQuery {
    pub lookback_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AttemptListResponse {
    pub user_id: String,
    pub count: usize,
    pub attempts: Vec<Attempt>,
}

impl AttemptListResponse {
    pub fn new(user_id: String, attempts: Vec<Attempt>) -> Self {
        Self {
            user_id,
            count: attempts.len(),
            attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteQuestionAttemptsResponse {
    pub question_id: String,
    pub deleted: usize,
}
