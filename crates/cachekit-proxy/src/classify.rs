//! Request classification.
//!
//! Every intercepted request is classified exactly once into a closed
//! routing class; the fetch path branches on the class, never on raw URL
//! strings.

use http::Method;
use url::Url;

use crate::ProxyConfig;

/// URL pattern for matching.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    /// Pattern type.
    pub pattern_type: PatternType,
    /// Pattern string.
    pub pattern: String,
}

/// Type of URL pattern.
#[derive(Debug, Clone, Copy)]
pub enum PatternType {
    /// Exact URL match.
    Exact,
    /// Prefix match.
    Prefix,
    /// Suffix match (e.g., a file name).
    Suffix,
    /// Contains substring.
    Contains,
}

impl UrlPattern {
    /// Create an exact match pattern.
    pub fn exact(url: &str) -> Self {
        Self {
            pattern_type: PatternType::Exact,
            pattern: url.to_string(),
        }
    }

    /// Create a prefix match pattern.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            pattern_type: PatternType::Prefix,
            pattern: prefix.to_string(),
        }
    }

    /// Create a suffix match pattern.
    pub fn suffix(suffix: &str) -> Self {
        Self {
            pattern_type: PatternType::Suffix,
            pattern: suffix.to_string(),
        }
    }

    /// Create a contains pattern.
    pub fn contains(substring: &str) -> Self {
        Self {
            pattern_type: PatternType::Contains,
            pattern: substring.to_string(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        let url_str = url.as_str();
        match self.pattern_type {
            PatternType::Exact => url_str == self.pattern,
            PatternType::Prefix => url_str.starts_with(&self.pattern),
            PatternType::Suffix => url_str.ends_with(&self.pattern),
            PatternType::Contains => url_str.contains(&self.pattern),
        }
    }
}

/// What a same-origin path denotes, for fallback synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// The site's primary stylesheet.
    Stylesheet,
    /// The primary script bundle.
    Script,
    /// Anything else.
    Other,
}

/// Routing class of one request, computed once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Same-origin GET: network first, cache fallback, synthesis last.
    SameOrigin(AssetKind),
    /// The pinned third-party script: local proxy, cached copy, original.
    VendorAsset,
    /// Never intercepted; the host's normal request path applies.
    Passthrough,
}

/// Classify a request against the proxy configuration.
pub fn classify(config: &ProxyConfig, method: &Method, url: &Url) -> RequestClass {
    if *method != Method::GET {
        return RequestClass::Passthrough;
    }

    if url.origin() != config.origin.origin() {
        if config.vendor_pattern.matches(url) {
            return RequestClass::VendorAsset;
        }
        return RequestClass::Passthrough;
    }

    RequestClass::SameOrigin(asset_kind(config, url.path()))
}

fn asset_kind(config: &ProxyConfig, path: &str) -> AssetKind {
    if path.contains(&config.stylesheet_marker) {
        AssetKind::Stylesheet
    } else if path.contains(&config.script_marker) {
        AssetKind::Script
    } else {
        AssetKind::Other
    }
}
