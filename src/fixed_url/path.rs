//! Canonical alias paths.
//!
//! Replicas index aliases by the exact path string, so two call sites describing the
//! same resource must produce byte-identical paths whatever order they list the
//! parameters in. Unset parameters are dropped, pairs are sorted by key (then value)
//! in byte order, and the relative URL is base64 encoded behind the action root.

use super::types::{AliasAction, ResourceKind};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    pub fn build<I, K, V>(action: AliasAction, kind: ResourceKind, domain: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let relative = relative_url(kind, domain, params);
        Self(format!("{}{}", action.root(), STANDARD.encode(relative.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unencoded relative URL an alias points at, e.g.
/// `/leaflets/epi?gtin=...&language=en&leaflet_type=leaflet`.
pub fn relative_url<I, K, V>(kind: ResourceKind, domain: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .filter_map(|(key, value)| {
            value.map(|v| {
                (
                    urlencoding::encode(key.as_ref()).into_owned(),
                    urlencoding::encode(v.as_ref()).into_owned(),
                )
            })
        })
        .collect();
    pairs.sort();

    let root = format!("/{}/{}", kind.root_segment(), domain);
    if pairs.is_empty() {
        return root;
    }

    let query = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", root, query)
}
