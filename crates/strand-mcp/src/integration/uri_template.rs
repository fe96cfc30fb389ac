//! URI Template Matching
//!
//! RFC 6570-style templates with `{var}` placeholders, at the semantic
//! level resource dispatch needs: `{var}` matches a single path segment
//! (no slashes), `{+var}` may span slashes. Matching a concrete URI yields
//! a variable-to-value map or no match.
//!
//! Precedence is decided by the registry, not here: concrete resources win
//! over templates, and among templates the first inserted that matches
//! wins.

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use regex::Regex;

// Layer 3: Internal module imports
use crate::protocol::{ProtocolError, ProtocolResult};

/// A parsed URI template
///
/// # Examples
///
/// ```rust
/// use strand_mcp::integration::UriTemplate;
///
/// let template = UriTemplate::parse("db://{table}/{id}").unwrap();
/// let vars = template.matches("db://users/42").unwrap();
/// assert_eq!(vars["table"], "users");
/// assert_eq!(vars["id"], "42");
/// assert!(template.matches("db://users/42/extra").is_none());
///
/// let deep = UriTemplate::parse("file:///{+path}").unwrap();
/// assert_eq!(deep.matches("file:///a/b/c").unwrap()["path"], "a/b/c");
/// ```
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    pattern: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    /// Parse a template string
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidUriTemplate` on unbalanced braces, empty or
    /// duplicate variable names, or nested placeholders.
    pub fn parse(template: &str) -> ProtocolResult<Self> {
        let mut pattern = String::from("^");
        let mut variables = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    pattern.push_str(&regex::escape(&literal));
                    literal.clear();

                    let mut name = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(ProtocolError::InvalidUriTemplate(
                                    template.to_string(),
                                ))
                            }
                            other => name.push(other),
                        }
                    }
                    if !closed {
                        return Err(ProtocolError::InvalidUriTemplate(template.to_string()));
                    }

                    let (spans_slashes, name) = match name.strip_prefix('+') {
                        Some(rest) => (true, rest.to_string()),
                        None => (false, name),
                    };
                    if name.is_empty() || variables.contains(&name) {
                        return Err(ProtocolError::InvalidUriTemplate(template.to_string()));
                    }

                    pattern.push_str(if spans_slashes { "(.+)" } else { "([^/]+)" });
                    variables.push(name);
                }
                '}' => return Err(ProtocolError::InvalidUriTemplate(template.to_string())),
                other => literal.push(other),
            }
        }
        pattern.push_str(&regex::escape(&literal));
        pattern.push('$');

        let pattern = Regex::new(&pattern)
            .map_err(|_| ProtocolError::InvalidUriTemplate(template.to_string()))?;

        Ok(Self {
            raw: template.to_string(),
            pattern,
            variables,
        })
    }

    /// The original template string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Variable names in template order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Match a concrete URI, yielding expanded variables on success
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(uri)?;
        let mut values = HashMap::with_capacity(self.variables.len());
        for (index, name) in self.variables.iter().enumerate() {
            let value = captures.get(index + 1)?.as_str().to_string();
            values.insert(name.clone(), value);
        }
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_variable() {
        let template = UriTemplate::parse("file:///{path}").unwrap();
        assert_eq!(template.matches("file:///readme").unwrap()["path"], "readme");
        assert!(template.matches("file:///a/b").is_none());
        assert!(template.matches("file:///").is_none());
        assert!(template.matches("http:///readme").is_none());
    }

    #[test]
    fn plus_variable_spans_slashes() {
        let template = UriTemplate::parse("file:///{+path}").unwrap();
        assert_eq!(
            template.matches("file:///a/b/c.txt").unwrap()["path"],
            "a/b/c.txt"
        );
    }

    #[test]
    fn multiple_variables() {
        let template = UriTemplate::parse("db://{table}/{id}").unwrap();
        let vars = template.matches("db://users/42").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["table"], "users");
        assert_eq!(vars["id"], "42");
    }

    #[test]
    fn literals_are_escaped() {
        // Regex metacharacters in the literal part must not act as regex
        let template = UriTemplate::parse("q://a.b/{x}").unwrap();
        assert!(template.matches("q://aXb/1").is_none());
        assert!(template.matches("q://a.b/1").is_some());
    }

    #[test]
    fn no_variables_is_exact_match() {
        let template = UriTemplate::parse("static://fixed").unwrap();
        assert!(template.matches("static://fixed").is_some());
        assert!(template.matches("static://fixed/extra").is_none());
        assert!(template.variables().is_empty());
    }

    #[test]
    fn malformed_templates_rejected() {
        assert!(UriTemplate::parse("a://{unclosed").is_err());
        assert!(UriTemplate::parse("a://un{{nested}}").is_err());
        assert!(UriTemplate::parse("a://}stray").is_err());
        assert!(UriTemplate::parse("a://{}").is_err());
        assert!(UriTemplate::parse("a://{x}/{x}").is_err());
    }
}
