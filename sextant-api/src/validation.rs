//! Request validation
//!
//! Route bodies and query strings are deserialized loosely and checked
//! here, so every problem is reported as a `VALIDATION_ERROR` with one
//! entry per failing field.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use sextant_prom::RangeQuery;

use crate::error::{ApiError, ApiResult, FieldError};
use crate::pipeline::TranslationRequest;

pub const MIN_QUERY_CHARS: usize = 3;
pub const MAX_QUERY_CHARS: usize = 500;
/// One week.
pub const MAX_LOOKBACK_MINUTES: i64 = 10_080;

static STEP_FORMAT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d+[smhd]$").ok());

/// Body of `POST /api/nl2promql`.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslateBody {
    pub query: Option<String>,
    pub lookback_minutes: Option<i64>,
}

/// Query string of `GET /api/prometheus/query_range`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRangeParams {
    pub query: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub step: Option<String>,
}

/// Query string of `GET /api/prometheus/query`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstantQueryParams {
    pub query: Option<String>,
}

impl TranslateBody {
    pub fn validate(self) -> ApiResult<TranslationRequest> {
        let mut fields = Vec::new();

        let text = self.query.as_deref().map(str::trim).unwrap_or_default();
        let length = text.chars().count();
        if self.query.is_none() {
            fields.push(FieldError::new("query", "Query is required"));
        } else if length < MIN_QUERY_CHARS {
            fields.push(FieldError::new("query", "Query must be at least 3 characters"));
        } else if length > MAX_QUERY_CHARS {
            fields.push(FieldError::new("query", "Query must not exceed 500 characters"));
        }

        let lookback_minutes = match self.lookback_minutes {
            None => None,
            Some(minutes) if (1..=MAX_LOOKBACK_MINUTES).contains(&minutes) => {
                u32::try_from(minutes).ok()
            }
            Some(_) => {
                fields.push(FieldError::new(
                    "lookback_minutes",
                    "Lookback must be between 1 and 10080 minutes",
                ));
                None
            }
        };

        if !fields.is_empty() {
            return Err(ApiError::validation("Validation failed", fields));
        }

        Ok(TranslationRequest {
            text: text.to_string(),
            lookback_minutes,
        })
    }
}

impl QueryRangeParams {
    pub fn validate(self) -> ApiResult<RangeQuery> {
        let mut fields = Vec::new();

        let query = self
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        if query.is_none() {
            fields.push(FieldError::new("query", "PromQL query is required"));
        }

        let start = parse_timestamp(self.start.as_deref());
        if start.is_none() {
            fields.push(FieldError::new("start", "Start must be a valid timestamp"));
        }
        let end = parse_timestamp(self.end.as_deref());
        if end.is_none() {
            fields.push(FieldError::new("end", "End must be a valid timestamp"));
        }

        let step = self.step.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if let Some(step) = step {
            if !is_valid_step(step) {
                fields.push(FieldError::new(
                    "step",
                    "Step must be in format: 15s, 1m, 1h, etc.",
                ));
            }
        }

        match (query, start, end) {
            (Some(query), Some(start), Some(end)) if fields.is_empty() => {
                let range = RangeQuery::new(query, start, end);
                Ok(match step {
                    Some(step) => range.with_step(step),
                    None => range,
                })
            }
            _ => Err(ApiError::validation("Invalid query parameters", fields)),
        }
    }
}

impl InstantQueryParams {
    pub fn validate(self) -> ApiResult<String> {
        self.query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                ApiError::new(
                    crate::error::ErrorCode::ValidationError,
                    "Query parameter is required",
                )
            })
    }
}

/// Unix seconds, integer or fractional.
fn parse_timestamp(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub fn is_valid_step(step: &str) -> bool {
    STEP_FORMAT.as_ref().is_some_and(|re| re.is_match(step))
}
