//! Path template matching.
//!
//! Matches request paths against `/`-delimited route templates such as
//! `/users/{id}/posts/{postId}`.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::HashMap;

/// Percent-decode a request path before matching.
///
/// Invalid escapes are kept as written and invalid UTF-8 is replaced.
pub fn decode_path(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// A parsed route template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl TemplateSegment {
    fn parse(segment: &str) -> Self {
        match segment
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Some(name) if !name.is_empty() && !name.contains(['{', '}']) => {
                TemplateSegment::Param(name.to_string())
            }
            _ => TemplateSegment::Literal(segment.to_string()),
        }
    }
}

impl PathTemplate {
    /// Parse a template. Segments that are not exactly `{name}` are literals.
    pub fn parse(template: &str) -> Self {
        let segments = template.split('/').map(TemplateSegment::parse).collect();
        Self {
            raw: template.to_string(),
            segments,
        }
    }

    /// The template as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the template has no placeholders.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, TemplateSegment::Literal(_)))
    }

    /// Placeholder names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::Param(name) => Some(name.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }

    /// Match a decoded path, returning the bound placeholders.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                TemplateSegment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                TemplateSegment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_exact_path_matching() {
        let template = PathTemplate::parse("/api/users");
        assert!(template.is_static());
        assert_eq!(template.matches("/api/users"), Some(HashMap::new()));
        assert_eq!(template.matches("/api/posts"), None);
        assert_eq!(template.matches("/api/Users"), None);
    }

    #[test]
    fn test_template_path_matching() {
        let template = PathTemplate::parse("/api/users/{id}/posts/{postId}");
        assert_eq!(
            template.matches("/api/users/42/posts/7"),
            Some(params(&[("id", "42"), ("postId", "7")]))
        );
        assert_eq!(template.matches("/api/users/42/posts"), None);
        assert_eq!(template.matches("/api/users/42/posts/7/comments"), None);
        assert_eq!(template.matches("/api/users/42/comments/7"), None);
    }

    #[test]
    fn test_empty_segment_does_not_bind() {
        let template = PathTemplate::parse("/users/{id}");
        assert_eq!(template.matches("/users/"), None);
        assert_eq!(template.matches("/users/123"), Some(params(&[("id", "123")])));
    }

    #[test]
    fn test_trailing_slash_changes_segment_count() {
        let template = PathTemplate::parse("/users");
        assert_eq!(template.matches("/users/"), None);
    }

    #[test]
    fn test_mixed_segment_is_literal() {
        let template = PathTemplate::parse("/files/{name}.json");
        assert!(template.is_static());
        assert_eq!(template.param_names().count(), 0);
        assert_eq!(template.matches("/files/report.json"), None);
        assert_eq!(template.matches("/files/{name}.json"), Some(HashMap::new()));
    }

    #[test]
    fn test_param_names() {
        let template = PathTemplate::parse("/orgs/{org}/repos/{repo}");
        assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["org", "repo"]);
        assert_eq!(template.as_str(), "/orgs/{org}/repos/{repo}");
        assert!(!template.is_static());
    }

    #[test]
    fn test_decoded_segment_is_bound() {
        let template = PathTemplate::parse("/search/{term}");
        assert_eq!(
            template.matches(&decode_path("/search/a%20b")),
            Some(params(&[("term", "a b")]))
        );
    }

    #[test]
    fn test_decoded_literal_matches() {
        let template = PathTemplate::parse("/caf\u{e9}/menu");
        assert_eq!(template.matches(&decode_path("/caf%C3%A9/menu")), Some(HashMap::new()));
        assert_eq!(template.matches(&decode_path("/caf%C3%A9/men%75")), Some(HashMap::new()));
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/plain"), "/plain");
        assert_eq!(decode_path("/a%2Fb"), "/a/b");
        assert_eq!(decode_path("/bad%zz"), "/bad%zz");
    }
}
