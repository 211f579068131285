use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

pub const FEATURE_COUNT: usize = 30;

/// Column order the classifier is trained on. Never reorder.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "using_ip",
    "long_url",
    "short_url",
    "symbol_at",
    "redirecting_double_slash",
    "prefix_suffix_hyphen",
    "sub_domains",
    "https",
    "domain_registration_length",
    "favicon",
    "non_standard_port",
    "https_in_domain_url",
    "request_url",
    "anchor_url",
    "links_in_script_tags",
    "server_form_handler",
    "info_email",
    "abnormal_url",
    "website_forwarding",
    "status_bar_customization",
    "disable_right_click",
    "using_popup_window",
    "iframe_redirection",
    "age_of_domain",
    "dns_recording",
    "website_traffic",
    "page_rank",
    "google_index",
    "links_pointing_to_page",
    "stats_report",
];

// Matches a dotted quad anywhere in the URL, not only in the host.
static IP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}\.){3}\d{1,3}").expect("IP pattern compiles"));

static SCHEME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*$").expect("scheme pattern compiles"));

const LONG_URL_CHARS: usize = 75;
const SHORT_URL_CHARS: usize = 20;

/// A URL split into the pieces the lexical rules look at. Parsing never
/// fails; components that could not be recovered are `None`.
#[derive(Debug, Clone)]
pub struct UrlContext<'a> {
    raw: &'a str,
    scheme: Option<String>,
    netloc: Option<String>,
}

impl<'a> UrlContext<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let scheme = match Url::parse(raw) {
            Ok(url) => Some(url.scheme().to_string()),
            Err(_) => split_scheme(raw).map(|(scheme, _)| scheme.to_ascii_lowercase()),
        };
        Self { raw, scheme, netloc: raw_authority(raw).map(str::to_string) }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Authority text exactly as written: user-info and port included, no
    /// case folding or IDNA conversion.
    pub fn netloc(&self) -> Option<&str> {
        self.netloc.as_deref()
    }
}

fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = raw.trim().split_once(':')?;
    SCHEME_PATTERN.is_match(scheme).then_some((scheme, rest))
}

/// Text between a leading `//` and the next `/`, `?` or `#`. `None` when the
/// URL has no `//` authority marker, even if a host could be guessed.
fn raw_authority(raw: &str) -> Option<&str> {
    let rest = split_scheme(raw).map_or(raw.trim(), |(_, rest)| rest);
    let rest = rest.strip_prefix("//")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// One column of the feature vector.
///
/// Any `Fn(&UrlContext) -> f64` is a rule, so a real signal source can be
/// dropped into a slot with [`FeatureExtractor::with_rule`].
pub trait FeatureRule: Send + Sync {
    fn evaluate(&self, url: &UrlContext<'_>) -> f64;
}

impl<F> FeatureRule for F
where
    F: Fn(&UrlContext<'_>) -> f64 + Send + Sync,
{
    fn evaluate(&self, url: &UrlContext<'_>) -> f64 {
        self(url)
    }
}

/// Placeholder for signals that need data we do not fetch (WHOIS, DNS,
/// page content, rank services).
#[derive(Debug, Clone, Copy, Default)]
pub struct StubRule;

impl StubRule {
    pub const VALUE: f64 = 0.0;
}

impl FeatureRule for StubRule {
    fn evaluate(&self, _url: &UrlContext<'_>) -> f64 {
        Self::VALUE
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

pub mod rules {
    use super::*;

    pub fn using_ip(url: &UrlContext<'_>) -> f64 {
        flag(IP_PATTERN.is_match(url.raw()))
    }

    pub fn long_url(url: &UrlContext<'_>) -> f64 {
        flag(url.raw().chars().count() > LONG_URL_CHARS)
    }

    pub fn short_url(url: &UrlContext<'_>) -> f64 {
        flag(url.raw().chars().count() < SHORT_URL_CHARS)
    }

    pub fn symbol_at(url: &UrlContext<'_>) -> f64 {
        flag(url.raw().contains('@'))
    }

    pub fn redirecting_double_slash(url: &UrlContext<'_>) -> f64 {
        flag(url.raw().matches("//").count() > 1)
    }

    pub fn prefix_suffix_hyphen(url: &UrlContext<'_>) -> f64 {
        flag(url.netloc().is_some_and(|n| n.contains('-')))
    }

    pub fn sub_domains(url: &UrlContext<'_>) -> f64 {
        flag(url.netloc().is_some_and(|n| n.split('.').count() > 3))
    }

    pub fn https(url: &UrlContext<'_>) -> f64 {
        flag(url.scheme() == Some("https"))
    }

    pub fn https_in_domain_url(url: &UrlContext<'_>) -> f64 {
        flag(url.netloc().is_some_and(|n| n.to_lowercase().contains("https")))
    }

    pub fn info_email(url: &UrlContext<'_>) -> f64 {
        flag(url.raw().to_lowercase().contains("mailto:"))
    }
}

fn builtin_rule(name: &str) -> Box<dyn FeatureRule> {
    match name {
        "using_ip" => Box::new(rules::using_ip),
        "long_url" => Box::new(rules::long_url),
        "short_url" => Box::new(rules::short_url),
        "symbol_at" => Box::new(rules::symbol_at),
        "redirecting_double_slash" => Box::new(rules::redirecting_double_slash),
        "prefix_suffix_hyphen" => Box::new(rules::prefix_suffix_hyphen),
        "sub_domains" => Box::new(rules::sub_domains),
        "https" => Box::new(rules::https),
        "https_in_domain_url" => Box::new(rules::https_in_domain_url),
        "info_email" => Box::new(rules::info_email),
        _ => Box::new(StubRule),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES.iter().position(|n| *n == name).map(|i| self.0[i])
    }

    /// Names of the rules that produced a non-zero value.
    pub fn fired(&self) -> Vec<&'static str> {
        FEATURE_NAMES
            .iter()
            .zip(self.0.iter())
            .filter(|(_, v)| **v != 0.0)
            .map(|(n, _)| *n)
            .collect()
    }
}

pub struct FeatureExtractor {
    rules: [(&'static str, Box<dyn FeatureRule>); FEATURE_COUNT],
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self { rules: FEATURE_NAMES.map(|name| (name, builtin_rule(name))) }
    }

    /// Replaces the rule in the named slot. Vector order is unchanged.
    pub fn with_rule<R>(mut self, name: &str, rule: R) -> Result<Self, AppError>
    where
        R: FeatureRule + 'static,
    {
        let slot = self
            .rules
            .iter_mut()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown feature rule: {}", name)))?;
        slot.1 = Box::new(rule);
        Ok(self)
    }

    pub fn extract(&self, url: &str) -> FeatureVector {
        let ctx = UrlContext::parse(url);
        let mut values = [0.0; FEATURE_COUNT];
        for (value, (_, rule)) in values.iter_mut().zip(self.rules.iter()) {
            *value = rule.evaluate(&ctx);
        }
        FeatureVector(values)
    }
}
