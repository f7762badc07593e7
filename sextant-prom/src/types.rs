//! Prometheus HTTP API response types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common `{status, data, errorType, error}` wrapper.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status: String,
    pub data: Option<T>,
    pub error_type: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Loose error body for non-2xx replies that may not carry `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: Option<String>,
    pub error_type: Option<String>,
}

/// One `[unix_seconds, "value"]` sample. Prometheus encodes values as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePair(pub f64, pub String);

impl SamplePair {
    pub fn timestamp(&self) -> f64 {
        self.0
    }

    /// Numeric value; `NaN`, `+Inf` and `-Inf` parse as their float forms.
    pub fn value(&self) -> Option<f64> {
        self.1.parse().ok()
    }
}

/// One labelled series of a range query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

/// `data` of `/api/v1/query_range`. The result type is always `matrix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeData {
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<RangeSeries>,
}

/// One labelled sample of an instant vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantSample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub value: SamplePair,
}

/// Instant query result: a vector, or a single scalar/string sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstantResult {
    Vector(Vec<InstantSample>),
    Scalar(SamplePair),
}

/// `data` of `/api/v1/query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantData {
    pub result_type: String,
    pub result: InstantResult,
}

/// Parameters of a range query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub query: String,
    /// Unix seconds
    pub start: f64,
    /// Unix seconds
    pub end: f64,
    /// Resolution such as `15s` or `1m`
    pub step: String,
}

impl RangeQuery {
    pub const DEFAULT_STEP: &'static str = "15s";

    pub fn new(query: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            query: query.into(),
            start,
            end,
            step: Self::DEFAULT_STEP.to_string(),
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_response_parses() {
        let json = r#"{
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {"metric": {"__name__": "up", "job": "node"}, "values": [[1700000000, "1"], [1700000015.5, "0"]]}
                ]
            }
        }"#;
        let resp: ApiResponse<RangeData> = serde_json::from_str(json).expect("parse");
        assert!(resp.is_success());
        let data = resp.data.expect("data");
        assert_eq!(data.result_type, "matrix");
        let series = &data.result[0];
        assert_eq!(series.metric.get("job").map(String::as_str), Some("node"));
        assert_eq!(series.values[1].timestamp(), 1700000015.5);
        assert_eq!(series.values[0].value(), Some(1.0));
    }

    #[test]
    fn test_instant_vector_and_scalar() {
        let vector = r#"{"resultType":"vector","result":[{"metric":{"instance":"a"},"value":[1700000000,"42"]}]}"#;
        let data: InstantData = serde_json::from_str(vector).expect("parse");
        assert!(matches!(data.result, InstantResult::Vector(ref v) if v.len() == 1));

        let scalar = r#"{"resultType":"scalar","result":[1700000000,"3.5"]}"#;
        let data: InstantData = serde_json::from_str(scalar).expect("parse");
        match data.result {
            InstantResult::Scalar(sample) => assert_eq!(sample.value(), Some(3.5)),
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    #[test]
    fn test_error_response_parses() {
        let json = r#"{"status":"error","errorType":"bad_data","error":"1:6: parse error: unexpected"}"#;
        let resp: ApiResponse<RangeData> = serde_json::from_str(json).expect("parse");
        assert!(!resp.is_success());
        assert_eq!(resp.error_type.as_deref(), Some("bad_data"));
    }

    #[test]
    fn test_special_float_values() {
        let sample = SamplePair(0.0, "NaN".to_string());
        assert!(sample.value().map(f64::is_nan).unwrap_or(false));
        assert_eq!(SamplePair(0.0, "+Inf".to_string()).value(), Some(f64::INFINITY));
    }

    #[test]
    fn test_range_query_default_step() {
        let q = RangeQuery::new("up", 1.0, 2.0);
        assert_eq!(q.step, "15s");
        assert_eq!(q.with_step("1m").step, "1m");
    }
}
