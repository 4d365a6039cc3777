//! The Request Extractor (spec §4.1): builds an `AnalysisRecord` from
//! an `IngressRequest` without mutating the caller's data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use waf_common::model::AnalysisRecord;

use crate::ingress::{resolve_client_ip, IngressRequest};

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A stable, monotonic-in-time, unique-per-request id: the request's
/// own arrival timestamp paired with a process-wide sequence number,
/// so two requests landing in the same nanosecond still sort and
/// dedup correctly (spec §4.4: "stable `requestId`, monotonic in
/// time, unique per request").
pub fn next_request_id(now_nanos: i64) -> String {
    let seq = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("req-{now_nanos}-{seq}")
}

/// Normalizes `req` into an `AnalysisRecord`. Query, body, headers, and
/// cookies are cloned through rather than referenced, so the extractor
/// never mutates or retains the caller's original request value.
pub fn build_record(req: &dyn IngressRequest) -> AnalysisRecord {
    let timestamp = req.timestamp();
    let request_id = next_request_id(timestamp.timestamp_nanos_opt().unwrap_or_default());

    AnalysisRecord {
        request_id,
        timestamp,
        ip: resolve_client_ip(req),
        user_agent: req.user_agent().map(str::to_string),
        method: req.method().to_string(),
        path: req.path().to_string(),
        query: req.query().clone(),
        body: req.body().clone(),
        headers: req.headers().clone(),
        cookies: req.cookies().clone(),
        score: 0.0,
        threats: Vec::new(),
        modules_touched: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use waf_common::model::{Body, FieldValue, QueryValue};

    use super::*;

    struct FakeRequest {
        path: String,
        query: HashMap<String, QueryValue>,
        headers: HashMap<String, FieldValue>,
        body: Body,
    }

    impl IngressRequest for FakeRequest {
        fn method(&self) -> &str {
            "GET"
        }
        fn path(&self) -> &str {
            &self.path
        }
        fn peer_addr(&self) -> Option<&str> {
            Some("1.2.3.4")
        }
        fn headers(&self) -> &HashMap<String, FieldValue> {
            &self.headers
        }
        fn cookies(&self) -> &HashMap<String, FieldValue> {
            &self.headers
        }
        fn query(&self) -> &HashMap<String, QueryValue> {
            &self.query
        }
        fn body(&self) -> &Body {
            &self.body
        }
        fn timestamp(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    #[test]
    fn builds_record_with_resolved_ip_and_cloned_query() {
        let mut query = HashMap::new();
        query.insert("q".to_string(), QueryValue::Single("hello".to_string()));
        let req = FakeRequest {
            path: "/search".to_string(),
            query,
            headers: HashMap::new(),
            body: Body::Empty,
        };
        let record = build_record(&req);
        assert_eq!(record.ip, "1.2.3.4");
        assert_eq!(record.path, "/search");
        assert!(record.query.contains_key("q"));
        assert_eq!(record.score, 0.0);
    }

    #[test]
    fn request_ids_are_unique_and_increasing_in_sequence() {
        let a = next_request_id(1000);
        let b = next_request_id(1000);
        assert_ne!(a, b);
    }
}
