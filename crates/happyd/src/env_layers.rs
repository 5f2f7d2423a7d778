//! Ordered environment-variable layering for spawned sessions.
//!
//! Layers merge in a fixed, documented order with later layers winning:
//! auth first, then the caller's profile variables (with `${VAR}`
//! references expanded against the daemon's own environment), then auth
//! again so profile data can never shadow credentials.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// A named mapping of environment variables.
#[derive(Debug, Clone)]
pub struct EnvLayer {
    pub name: &'static str,
    pub vars: HashMap<String, String>,
}

impl EnvLayer {
    pub fn new(name: &'static str, vars: HashMap<String, String>) -> Self {
        Self { name, vars }
    }
}

/// Fold layers left to right; later layers override earlier ones.
pub fn merge_layers(layers: &[EnvLayer]) -> HashMap<String, String> {
    layers.iter().fold(HashMap::new(), |mut merged, layer| {
        merged.extend(layer.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    })
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// Validate caller-supplied variable names. Returns the offending names.
pub fn invalid_var_names(vars: &HashMap<String, String>) -> Vec<String> {
    let mut bad: Vec<String> = vars
        .keys()
        .filter(|k| !name_pattern().is_match(k))
        .cloned()
        .collect();
    bad.sort();
    bad
}

/// Expand `${VAR}` references in each value using `lookup`.
///
/// Unresolvable references are left verbatim; whether that matters is the
/// caller's decision (see [`unexpanded_auth_vars`]).
pub fn expand_references<F>(vars: &HashMap<String, String>, lookup: F) -> HashMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    vars.iter()
        .map(|(key, value)| {
            let expanded = reference_pattern()
                .replace_all(value, |caps: &regex::Captures<'_>| {
                    lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned();
            (key.clone(), expanded)
        })
        .collect()
}

/// Names from `auth_names` whose merged value still contains an
/// unexpanded `${...}` reference. Any hit is a hard spawn failure; a
/// subprocess launched with a dangling auth reference is doomed to
/// authenticate incorrectly.
pub fn unexpanded_auth_vars(env: &HashMap<String, String>, auth_names: &[String]) -> Vec<String> {
    let mut bad: Vec<String> = auth_names
        .iter()
        .filter(|name| {
            env.get(name.as_str())
                .map(|v| v.contains("${"))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    bad.sort();
    bad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_later_layers_win() {
        let merged = merge_layers(&[
            EnvLayer::new("auth", vars(&[("TOKEN", "real"), ("SHARED", "auth")])),
            EnvLayer::new("profile", vars(&[("TOKEN", "fake"), ("EDITOR", "vim")])),
            EnvLayer::new("auth-again", vars(&[("TOKEN", "real"), ("SHARED", "auth")])),
        ]);
        assert_eq!(merged["TOKEN"], "real");
        assert_eq!(merged["SHARED"], "auth");
        assert_eq!(merged["EDITOR"], "vim");
    }

    #[test]
    fn test_expand_references_resolves_known_vars() {
        let expanded = expand_references(&vars(&[("PATHISH", "${BASE}/bin")]), |name| {
            (name == "BASE").then(|| "/opt/happy".to_string())
        });
        assert_eq!(expanded["PATHISH"], "/opt/happy/bin");
    }

    #[test]
    fn test_expand_references_leaves_unknown_vars_verbatim() {
        let expanded = expand_references(&vars(&[("X", "${MISSING}/bin")]), |_| None);
        assert_eq!(expanded["X"], "${MISSING}/bin");
    }

    #[test]
    fn test_expand_handles_multiple_references() {
        let expanded = expand_references(&vars(&[("X", "${A}-${B}")]), |name| match name {
            "A" => Some("1".to_string()),
            "B" => Some("2".to_string()),
            _ => None,
        });
        assert_eq!(expanded["X"], "1-2");
    }

    #[test]
    fn test_invalid_var_names() {
        let bad = invalid_var_names(&vars(&[("OK_NAME", "x"), ("1BAD", "x"), ("A-B", "x")]));
        assert_eq!(bad, vec!["1BAD".to_string(), "A-B".to_string()]);
    }

    #[test]
    fn test_unexpanded_auth_vars_flags_dangling_references() {
        let env = vars(&[("TOKEN", "${HAPPY_TOKEN}"), ("OTHER", "${ALSO_MISSING}")]);
        let bad = unexpanded_auth_vars(&env, &["TOKEN".to_string()]);
        assert_eq!(bad, vec!["TOKEN".to_string()]);
    }

    #[test]
    fn test_unexpanded_auth_vars_ok_when_resolved() {
        let env = vars(&[("TOKEN", "tok_abc")]);
        assert!(unexpanded_auth_vars(&env, &["TOKEN".to_string()]).is_empty());
    }
}
