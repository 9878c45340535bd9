//! URL pattern matching.
//!
//! # Responsibilities
//! - Compile path patterns (`/info/:id`, `:proto(https?://)?`, `*`) to regexes
//! - Run regex and function patterns as-is
//! - Produce a [`RouteMatch`] with named params and positional splats
//!
//! # Design Decisions
//! - Patterns compile once, when the route is declared
//! - Matching is anchored and case-insensitive, with an optional trailing slash
//! - Token names must start with a letter or `_`, so `host:8080` stays literal

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::routing::RouterError;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(/)?(\.)?:([A-Za-z_]\w*)(?:(\(.*?\)))?(\?)?|\*").expect("Valid regex pattern")
});

/// Result of a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    url: String,
    params: BTreeMap<String, Option<String>>,
    splats: Vec<String>,
}

impl RouteMatch {
    /// A match for `url` with no captures.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a named capture. `None` marks an optional token that did not match.
    pub fn with_param(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Add a positional capture.
    pub fn with_splat(mut self, value: impl Into<String>) -> Self {
        self.splats.push(value.into());
        self
    }

    /// The routed URL, always present.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Value of a named capture, if it participated.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_deref())
    }

    /// Whether the pattern declares `name`, matched or not.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn params(&self) -> &BTreeMap<String, Option<String>> {
        &self.params
    }

    pub fn splats(&self) -> &[String] {
        &self.splats
    }
}

/// Decides whether a URL belongs to a route.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns the captures on match.
    fn matches(&self, url: &str) -> Option<RouteMatch>;
}

/// Compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    regex: Regex,
    // One entry per capture group; `None` for wildcards.
    keys: Vec<Option<String>>,
}

impl PathMatcher {
    pub fn new(pattern: &str) -> Result<Self, RouterError> {
        let (source, keys) = path_to_regex(pattern);
        let regex = Regex::new(&source).map_err(|e| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            keys,
        })
    }

    /// The pattern as declared.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The compiled expression.
    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, url: &str) -> Option<RouteMatch> {
        let caps = self.regex.captures(url)?;
        let mut result = RouteMatch::new(url);
        for (index, key) in self.keys.iter().enumerate() {
            let value = capture(&caps, index + 1);
            match key {
                Some(name) => {
                    result.params.insert(name.clone(), value);
                }
                None => result.splats.push(value.unwrap_or_default()),
            }
        }
        Some(result)
    }
}

/// Caller-supplied regular expression, used verbatim.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }
}

impl Matcher for RegexMatcher {
    fn matches(&self, url: &str) -> Option<RouteMatch> {
        let found = self.regex.find(url)?;
        Some(RouteMatch::new(url).with_splat(found.as_str()))
    }
}

type MatchFn = Arc<dyn Fn(&str) -> Option<RouteMatch> + Send + Sync>;

/// Caller-supplied matching function.
#[derive(Clone)]
pub struct FnMatcher {
    f: MatchFn,
}

impl FnMatcher {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> Option<RouteMatch> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl Matcher for FnMatcher {
    fn matches(&self, url: &str) -> Option<RouteMatch> {
        let mut result = (self.f)(url)?;
        result.url = url.to_string();
        Some(result)
    }
}

impl fmt::Debug for FnMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMatcher").finish_non_exhaustive()
    }
}

/// Anything `Router::on` accepts.
pub enum Pattern {
    Path(String),
    Regex(Regex),
    Function(FnMatcher),
}

impl Pattern {
    /// Pattern backed by a function.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&str) -> Option<RouteMatch> + Send + Sync + 'static,
    {
        Pattern::Function(FnMatcher::new(f))
    }

    /// Compile into a matcher.
    pub fn compile(self) -> Result<Box<dyn Matcher>, RouterError> {
        Ok(match self {
            Pattern::Path(path) => Box::new(PathMatcher::new(&path)?),
            Pattern::Regex(regex) => Box::new(RegexMatcher::new(regex)),
            Pattern::Function(f) => Box::new(f),
        })
    }
}

impl From<&str> for Pattern {
    fn from(path: &str) -> Self {
        Pattern::Path(path.to_string())
    }
}

impl From<String> for Pattern {
    fn from(path: String) -> Self {
        Pattern::Path(path)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}

fn capture(caps: &Captures<'_>, index: usize) -> Option<String> {
    caps.get(index).map(|m| m.as_str().to_string())
}

/// Translate a path pattern into an anchored, case-insensitive regex source
/// and the key of each capture group.
fn path_to_regex(path: &str) -> (String, Vec<Option<String>>) {
    let mut keys = Vec::new();
    let source = format!("{path}/?").replace("/(", "(?:/");

    let source = TOKEN.replace_all(&source, |caps: &Captures<'_>| {
        if &caps[0] == "*" {
            keys.push(None);
            return "*".to_string();
        }
        keys.push(Some(caps[3].to_string()));

        let slash = caps.get(1).map_or("", |m| m.as_str());
        let format = caps.get(2).map_or("", |m| m.as_str());
        let group = caps.get(4).map_or("([^/]+?)", |m| m.as_str());
        let optional = caps.get(5).map_or("", |m| m.as_str());
        let (outer, inner) = if optional.is_empty() { (slash, "") } else { ("", slash) };

        format!("{outer}(?:{inner}{format}{group}){optional}")
    });

    let source = source.replace('.', r"\.").replace('*', "(.*)");
    (format!("(?i)^{source}$"), keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(pattern: &str) -> PathMatcher {
        PathMatcher::new(pattern).unwrap()
    }

    #[test]
    fn test_named_segment() {
        let m = path("/info/:id").matches("/info/42").unwrap();
        assert_eq!(m.url(), "/info/42");
        assert_eq!(m.get("id"), Some("42"));
        assert_eq!(m.params().len(), 1);

        assert!(path("/info/:id").matches("/info/").is_none());
        assert!(path("/info/:id").matches("/info/42/more").is_none());
    }

    #[test]
    fn test_trailing_slash_and_case() {
        let matcher = path("/About");
        assert!(matcher.matches("/about/").is_some());
        assert!(matcher.matches("/ABOUT").is_some());
        assert!(matcher.matches("/about/us").is_none());
    }

    #[test]
    fn test_optional_segment() {
        let matcher = path("/posts/:page?");
        let with = matcher.matches("/posts/3").unwrap();
        assert_eq!(with.get("page"), Some("3"));

        let without = matcher.matches("/posts").unwrap();
        assert!(without.has_param("page"));
        assert_eq!(without.get("page"), None);
    }

    #[test]
    fn test_format_token() {
        let matcher = path("/file/:name.:ext");
        let m = matcher.matches("/file/report.pdf").unwrap();
        assert_eq!(m.get("name"), Some("report"));
        assert_eq!(m.get("ext"), Some("pdf"));
    }

    #[test]
    fn test_wildcards_are_positional() {
        let m = path("/assets/*").matches("/assets/css/site.css").unwrap();
        assert!(m.params().is_empty());
        assert_eq!(m.splats(), ["css/site.css"]);

        let any = path("*").matches("http://example.com/x?y=1").unwrap();
        assert_eq!(any.splats(), ["http://example.com/x?y=1"]);
    }

    #[test]
    fn test_custom_groups_and_optional_paths() {
        let matcher = path(":protocol(https?://)?:www(www.)?youtube.com/(watch/:id)?");

        let full = matcher.matches("https://www.youtube.com/watch/abc").unwrap();
        assert_eq!(full.get("protocol"), Some("https://"));
        assert_eq!(full.get("www"), Some("www."));
        assert_eq!(full.get("id"), Some("abc"));

        let bare = matcher.matches("youtube.com").unwrap();
        assert_eq!(bare.get("protocol"), None);
        assert_eq!(bare.get("www"), None);
        assert_eq!(bare.get("id"), None);

        assert!(matcher.matches("youtubexcom").is_none());
        assert!(matcher.matches("https://vimeo.com/watch/abc").is_none());
    }

    #[test]
    fn test_ports_stay_literal() {
        let matcher = path("http://localhost:3000/info/:id");
        let m = matcher.matches("http://localhost:3000/info/7").unwrap();
        assert_eq!(m.get("id"), Some("7"));
        assert!(!m.has_param("3000"));
        assert!(matcher.matches("http://localhost:4000/info/7").is_none());
    }

    #[test]
    fn test_regex_pattern_verbatim() {
        let matcher = Pattern::from(Regex::new(r"example\.com/\d+").unwrap())
            .compile()
            .unwrap();
        let m = matcher.matches("http://example.com/123").unwrap();
        assert_eq!(m.url(), "http://example.com/123");
        assert_eq!(m.splats(), ["example.com/123"]);
        assert!(matcher.matches("http://example.org/").is_none());
    }

    #[test]
    fn test_function_pattern() {
        let matcher = Pattern::function(|url| {
            url.ends_with(".pdf")
                .then(|| RouteMatch::new(url).with_param("kind", Some("pdf".into())))
        })
        .compile()
        .unwrap();

        assert_eq!(matcher.matches("/a.pdf").unwrap().get("kind"), Some("pdf"));
        assert!(matcher.matches("/a.html").is_none());

        let bare = Pattern::function(|_| Some(RouteMatch::default())).compile().unwrap();
        assert_eq!(bare.matches("/anything").unwrap().url(), "/anything");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = PathMatcher::new("/broken/:id([a-z)").unwrap_err();
        assert!(matches!(err, RouterError::InvalidPattern { .. }));
    }
}
