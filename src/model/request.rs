//! Fetch request: the unit of work carried by the queue.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::Result;

/// Newtype for request IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// A request waiting to be fetched.
///
/// The queue never looks inside a request. It only moves it around, either
/// as a value (in-process stores) or as the bytes produced by [`marshal`].
///
/// [`marshal`]: Request::marshal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,

    /// HTTP method, upper case.
    pub method: String,

    pub url: Url,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Vec<u8>,

    /// Caller-defined metadata that travels with the request.
    #[serde(default)]
    pub ctx: BTreeMap<String, String>,

    /// How many hops away from a seed request this one was discovered.
    #[serde(default)]
    pub depth: u32,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            id: RequestId::new(),
            method: method.into().to_ascii_uppercase(),
            url,
            headers: BTreeMap::new(),
            body: Vec::new(),
            ctx: BTreeMap::new(),
            depth: 0,
        }
    }

    /// A plain GET for `url`.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// Parse `address` and build a GET for it.
    pub fn parse_get(address: &str) -> Result<Self> {
        Ok(Self::get(Url::parse(address)?))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn ctx(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.insert(key.into(), value.into());
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Derive a request for `url` one hop deeper, carrying this request's context.
    pub fn follow(&self, url: Url) -> Self {
        Self {
            ctx: self.ctx.clone(),
            depth: self.depth.saturating_add(1),
            ..Self::get(url)
        }
    }

    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn marshal_keeps_every_field() {
        let req = Request::new("post", Url::parse("http://x/submit").unwrap())
            .header("Content-Type", "text/plain")
            .body("hello")
            .ctx("source", "seed")
            .depth(3);

        let back = Request::unmarshal(&req.marshal().unwrap()).unwrap();
        assert_eq!(back, req);
        assert_eq!(back.method, "POST");
    }

    #[test]
    fn unmarshal_fills_optional_fields() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"id":"{id}","method":"GET","url":"http://x/1"}}"#);
        let req = Request::unmarshal(json.as_bytes()).unwrap();
        assert_eq!(req.id, RequestId(id));
        assert_eq!(req.depth, 0);
        assert!(req.headers.is_empty());
        assert!(req.body.is_empty());
    }

    #[test]
    fn unmarshal_rejects_garbage() {
        let err = Request::unmarshal(b"not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn parse_get_rejects_bad_address() {
        let err = Request::parse_get("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn follow_goes_one_level_deeper() {
        let seed = Request::parse_get("http://x/").unwrap().ctx("crawl", "a");
        let next = seed.follow(Url::parse("http://x/next").unwrap());
        assert_eq!(next.depth, 1);
        assert_eq!(next.ctx.get("crawl").map(String::as_str), Some("a"));
        assert_ne!(next.id, seed.id);
        assert_eq!(next.method, "GET");
    }

    #[test]
    fn follow_saturates_at_max_depth() {
        let deep = Request::parse_get("http://x/").unwrap().depth(u32::MAX);
        let next = deep.follow(Url::parse("http://x/next").unwrap());
        assert_eq!(next.depth, u32::MAX);
    }
}
