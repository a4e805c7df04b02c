//! Bearer token extraction from incoming requests

use axum::extract::Query;
use http::header::{AUTHORIZATION, COOKIE};
use http::{HeaderMap, Uri};
use std::collections::HashMap;

/// One place a token may be carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Named cookie
    Cookie(String),
    /// `Authorization: Bearer <token>`
    AuthorizationHeader,
    /// Named query-string parameter
    Query(String),
}

impl TokenSource {
    pub fn extract(&self, headers: &HeaderMap, uri: &Uri) -> Option<String> {
        match self {
            TokenSource::Cookie(name) => cookie_value(headers, name),
            TokenSource::AuthorizationHeader => bearer_token(headers),
            TokenSource::Query(param) => query_value(uri, param),
        }
    }
}

/// Ordered fallback over token sources
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    sources: Vec<TokenSource>,
}

impl TokenExtractor {
    pub fn from_extractors(sources: Vec<TokenSource>) -> Self {
        Self { sources }
    }

    /// Extractor reading only the named cookie
    pub fn cookie(name: &str) -> Self {
        Self::from_extractors(vec![TokenSource::Cookie(name.to_string())])
    }

    /// First token found, or `None` when no source carries one
    pub fn extract(&self, headers: &HeaderMap, uri: &Uri) -> Option<String> {
        self.sources
            .iter()
            .find_map(|source| source.extract(headers, uri))
    }
}

/// Value of a cookie across every `Cookie` header
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, val)| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Percent-decoded value of a query parameter
fn query_value(uri: &Uri, param: &str) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove(param).filter(|val| !val.is_empty())
}
