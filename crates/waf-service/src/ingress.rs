//! Implements `waf_core::IngressRequest` for an axum request, the
//! adapter seam named in spec §1/§4.1. This is the one place in the
//! demo that knows axum's request shape; everything downstream of it
//! only sees the trait.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Uri};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use waf_common::model::{Body, FieldValue, QueryValue};
use waf_core::IngressRequest;

pub struct AxumIngressRequest {
    method: String,
    path: String,
    peer_addr: Option<String>,
    headers: HashMap<String, FieldValue>,
    cookies: HashMap<String, FieldValue>,
    query: HashMap<String, QueryValue>,
    body: Body,
    timestamp: DateTime<Utc>,
}

impl AxumIngressRequest {
    pub fn from_parts(
        method: &Method,
        uri: &Uri,
        header_map: &HeaderMap,
        connect_info: Option<&ConnectInfo<SocketAddr>>,
        body: Bytes,
    ) -> Self {
        let headers = header_map
            .iter()
            .filter(|(name, _)| *name != axum::http::header::COOKIE)
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    FieldValue::Text(value.to_str().unwrap_or_default().to_string()),
                )
            })
            .collect();

        let cookies = header_map
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(parse_cookie_header)
            .unwrap_or_default();

        let query = uri.query().map(parse_query_string).unwrap_or_default();

        let body = if body.is_empty() {
            Body::Empty
        } else {
            let text = String::from_utf8_lossy(&body).into_owned();
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => Body::Structured(value),
                Err(_) => Body::Text(text),
            }
        };

        Self {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            peer_addr: connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()),
            headers,
            cookies,
            query,
            body,
            timestamp: Utc::now(),
        }
    }
}

impl IngressRequest for AxumIngressRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    fn headers(&self) -> &HashMap<String, FieldValue> {
        &self.headers
    }

    fn cookies(&self) -> &HashMap<String, FieldValue> {
        &self.cookies
    }

    fn query(&self) -> &HashMap<String, QueryValue> {
        &self.query
    }

    fn body(&self) -> &Body {
        &self.body
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

fn parse_query_string(raw: &str) -> HashMap<String, QueryValue> {
    let mut map: HashMap<String, QueryValue> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        map.entry(key.into_owned())
            .and_modify(|existing| match existing {
                QueryValue::Single(first) => {
                    *existing = QueryValue::Multi(vec![first.clone(), value.clone().into_owned()]);
                }
                QueryValue::Multi(values) => values.push(value.clone().into_owned()),
            })
            .or_insert_with(|| QueryValue::Single(value.into_owned()));
    }
    map
}

fn parse_cookie_header(raw: &str) -> HashMap<String, FieldValue> {
    raw.split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            let value = parts.next().unwrap_or("").trim();
            if name.is_empty() {
                None
            } else {
                Some((name.to_string(), FieldValue::Text(value.to_string())))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_query_keys_as_multi() {
        let query = parse_query_string("tag=a&tag=b&q=hello");
        assert_eq!(query.get("q"), Some(&QueryValue::Single("hello".to_string())));
        match query.get("tag") {
            Some(QueryValue::Multi(values)) => assert_eq!(values, &vec!["a".to_string(), "b".to_string()]),
            other => panic!("expected Multi, got {other:?}"),
        }
    }

    #[test]
    fn parses_cookie_header_pairs() {
        let cookies = parse_cookie_header("session=abc123; theme=dark");
        assert_eq!(
            cookies.get("session").map(|v| v.as_scan_text()),
            Some("abc123".to_string())
        );
        assert_eq!(cookies.get("theme").map(|v| v.as_scan_text()), Some("dark".to_string()));
    }
}
