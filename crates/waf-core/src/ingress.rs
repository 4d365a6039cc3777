//! The abstract ingress shape (spec §6): what any HTTP framework
//! adapter must supply. The adapter itself — parsing the wire request,
//! sending the response — is an external collaborator; this trait is
//! the seam.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use waf_common::model::{Body, FieldValue, QueryValue};

pub trait IngressRequest {
    fn method(&self) -> &str;
    fn path(&self) -> &str;
    /// The framework's own notion of peer address, if it has one
    /// (spec §4.1 resolution step (a)).
    fn peer_addr(&self) -> Option<&str>;
    fn headers(&self) -> &HashMap<String, FieldValue>;
    fn cookies(&self) -> &HashMap<String, FieldValue>;
    fn query(&self) -> &HashMap<String, QueryValue>;
    fn body(&self) -> &Body;
    fn timestamp(&self) -> DateTime<Utc>;

    fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| match v {
                FieldValue::Text(s) => s.as_str(),
                FieldValue::Other(_) => "",
            })
    }

    fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }
}

/// Client IP resolution order (spec §4.1): direct peer address, then
/// the first token of `X-Forwarded-For`, then the literal `"unknown"`.
pub fn resolve_client_ip(req: &dyn IngressRequest) -> String {
    if let Some(peer) = req.peer_addr() {
        return peer.to_string();
    }
    if let Some(xff) = req.header("x-forwarded-for") {
        let first = xff.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    "unknown".to_string()
}
