use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response captured from a completed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl StoredResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IdempotencyRecord {
    /// A caller has claimed the key and is running the operation.
    InFlight { claimed_at: DateTime<Utc> },

    Completed {
        response: StoredResponse,
        completed_at: DateTime<Utc>,
    },
}

impl IdempotencyRecord {
    pub fn in_flight() -> Self {
        IdempotencyRecord::InFlight {
            claimed_at: Utc::now(),
        }
    }

    pub fn completed(response: StoredResponse) -> Self {
        IdempotencyRecord::Completed {
            response,
            completed_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, IdempotencyRecord::Completed { .. })
    }

    pub fn into_response(self) -> Option<StoredResponse> {
        match self {
            IdempotencyRecord::Completed { response, .. } => Some(response),
            IdempotencyRecord::InFlight { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_state_tag() {
        let record = IdempotencyRecord::completed(StoredResponse::new(
            201,
            serde_json::json!({"status": "SUCCESS"}),
        ));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["state"], "completed");
        assert_eq!(json["response"]["status"], 201);

        let back: IdempotencyRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn in_flight_has_no_response() {
        let record = IdempotencyRecord::in_flight();
        assert!(!record.is_completed());
        assert!(record.into_response().is_none());
    }
}
