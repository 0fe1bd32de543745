//! Declarative parameter rules for commands.
//!
//! Each command declares a [`Rule`] tree describing which parameter
//! keys it accepts. The compiler asks the tree for the
//! [`missing`](Rule::missing) keys (turned into holes) and then
//! [`validate`](Rule::validate)s the final key set.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A rule over a set of provided parameter keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// Every branch must be satisfied.
    AllOf(Vec<Rule>),
    /// Exactly one branch must be satisfied.
    OneOf(Vec<Rule>),
    /// At least one branch must be satisfied.
    AtLeastOneOf(Vec<Rule>),
    /// Keys that may be present but are never required.
    Opt(Vec<String>),
    /// A single required key.
    Key(String),
}

impl Rule {
    /// Every listed rule must hold.
    #[must_use]
    pub fn all_of(rules: Vec<Rule>) -> Self {
        Self::AllOf(rules)
    }

    /// Exactly one listed rule must hold.
    #[must_use]
    pub fn one_of(rules: Vec<Rule>) -> Self {
        Self::OneOf(rules)
    }

    /// At least one listed rule must hold.
    #[must_use]
    pub fn at_least_one_of(rules: Vec<Rule>) -> Self {
        Self::AtLeastOneOf(rules)
    }

    /// Optional keys.
    #[must_use]
    pub fn opt(keys: &[&str]) -> Self {
        Self::Opt(keys.iter().map(|k| (*k).to_string()).collect())
    }

    /// A required key.
    #[must_use]
    pub fn key(name: &str) -> Self {
        Self::Key(name.to_string())
    }

    /// Whether the rule holds for the provided keys.
    #[must_use]
    pub fn satisfied(&self, keys: &[String]) -> bool {
        match self {
            Self::AllOf(rules) => rules.iter().all(|r| r.satisfied(keys)),
            Self::OneOf(rules) => rules.iter().filter(|r| r.satisfied(keys)).count() == 1,
            Self::AtLeastOneOf(rules) => rules.iter().any(|r| r.satisfied(keys)),
            Self::Opt(_) => true,
            Self::Key(name) => keys.iter().any(|k| k == name),
        }
    }

    /// The minimal set of keys whose insertion would satisfy the rule.
    ///
    /// These keys are treated as required; the compiler turns each of
    /// them into a hole. Order follows rule declaration order.
    #[must_use]
    pub fn missing(&self, keys: &[String]) -> Vec<String> {
        match self {
            Self::AllOf(rules) => {
                let mut out = Vec::new();
                for rule in rules {
                    for k in rule.missing(keys) {
                        if !out.contains(&k) {
                            out.push(k);
                        }
                    }
                }
                out
            }
            Self::OneOf(rules) | Self::AtLeastOneOf(rules) => {
                if self.satisfied(keys) || rules.iter().any(|r| r.satisfied(keys)) {
                    return Vec::new();
                }
                rules
                    .iter()
                    .map(|r| r.missing(keys))
                    .min_by_key(Vec::len)
                    .unwrap_or_default()
            }
            Self::Opt(_) => Vec::new(),
            Self::Key(name) => {
                if keys.iter().any(|k| k == name) {
                    Vec::new()
                } else {
                    vec![name.clone()]
                }
            }
        }
    }

    /// Validate the provided keys against the rule.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message on the first structural
    /// failure, or when keys not mentioned by any rule are present.
    pub fn validate(&self, keys: &[String]) -> Result<(), String> {
        self.check(keys)?;

        let mentioned = self.mentioned();
        let mut unexpected: Vec<&String> =
            keys.iter().filter(|k| !mentioned.contains(*k)).collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            let list: Vec<&str> = unexpected.iter().map(|k| k.as_str()).collect();
            return Err(format!("unexpected param(s): {}", list.join(", ")));
        }
        Ok(())
    }

    fn check(&self, keys: &[String]) -> Result<(), String> {
        match self {
            Self::AllOf(rules) => {
                for rule in rules {
                    rule.check(keys)?;
                }
                Ok(())
            }
            Self::OneOf(rules) => {
                match rules.iter().filter(|r| r.satisfied(keys)).count() {
                    1 => Ok(()),
                    0 => Err(format!("expecting one of: {}", describe(rules))),
                    _ => Err(format!("expecting only one of: {}", describe(rules))),
                }
            }
            Self::AtLeastOneOf(rules) => {
                if rules.iter().any(|r| r.satisfied(keys)) {
                    Ok(())
                } else {
                    Err(format!("expecting at least one of: {}", describe(rules)))
                }
            }
            Self::Opt(_) => Ok(()),
            Self::Key(name) => {
                if keys.iter().any(|k| k == name) {
                    Ok(())
                } else {
                    Err(format!("missing required param '{}'", name))
                }
            }
        }
    }

    /// All keys mentioned anywhere in the rule tree.
    #[must_use]
    pub fn mentioned(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.collect_mentioned(&mut out);
        out
    }

    fn collect_mentioned(&self, out: &mut IndexSet<String>) {
        match self {
            Self::AllOf(rules) | Self::OneOf(rules) | Self::AtLeastOneOf(rules) => {
                for rule in rules {
                    rule.collect_mentioned(out);
                }
            }
            Self::Opt(keys) => {
                out.extend(keys.iter().cloned());
            }
            Self::Key(name) => {
                out.insert(name.clone());
            }
        }
    }
}

fn describe(rules: &[Rule]) -> String {
    let parts: Vec<String> = rules.iter().map(ToString::to_string).collect();
    parts.join(", ")
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllOf(rules) => write!(f, "all_of({})", describe(rules)),
            Self::OneOf(rules) => write!(f, "one_of({})", describe(rules)),
            Self::AtLeastOneOf(rules) => write!(f, "at_least_one_of({})", describe(rules)),
            Self::Opt(keys) => write!(f, "optional({})", keys.join(", ")),
            Self::Key(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_key_missing_and_validate() {
        let rule = Rule::key("type");
        assert_eq!(rule.missing(&keys(&[])), vec!["type"]);
        assert!(rule.missing(&keys(&["type"])).is_empty());
        assert!(rule.validate(&keys(&["type"])).is_ok());

        let err = rule.validate(&keys(&[])).unwrap_err();
        assert!(err.contains("missing required param 'type'"));
    }

    #[test]
    fn test_all_of_missing_preserves_order() {
        let rule = Rule::all_of(vec![
            Rule::key("image"),
            Rule::key("type"),
            Rule::opt(&["name"]),
        ]);
        assert_eq!(rule.missing(&keys(&[])), vec!["image", "type"]);
        assert_eq!(rule.missing(&keys(&["image"])), vec!["type"]);
    }

    #[test]
    fn test_one_of_validate() {
        let rule = Rule::one_of(vec![Rule::key("subnet"), Rule::key("vpc")]);
        assert!(rule.validate(&keys(&["subnet"])).is_ok());
        assert!(rule.validate(&keys(&["vpc"])).is_ok());

        let err = rule.validate(&keys(&[])).unwrap_err();
        assert!(err.contains("expecting one of"));

        let err = rule.validate(&keys(&["subnet", "vpc"])).unwrap_err();
        assert!(err.contains("expecting only one of"));
    }

    #[test]
    fn test_one_of_missing_picks_smallest_branch() {
        let rule = Rule::one_of(vec![
            Rule::all_of(vec![Rule::key("a"), Rule::key("b")]),
            Rule::key("c"),
        ]);
        assert_eq!(rule.missing(&keys(&[])), vec!["c"]);
        assert!(rule.missing(&keys(&["c"])).is_empty());
    }

    #[test]
    fn test_at_least_one_of() {
        let rule = Rule::at_least_one_of(vec![Rule::key("cidr"), Rule::key("ip")]);
        assert!(rule.validate(&keys(&["cidr"])).is_ok());
        assert!(rule.validate(&keys(&["cidr", "ip"])).is_ok());

        let err = rule.validate(&keys(&[])).unwrap_err();
        assert!(err.contains("expecting at least one of"));
        assert!(err.contains("cidr"));
        assert!(err.contains("ip"));
    }

    #[test]
    fn test_opt_never_required() {
        let rule = Rule::all_of(vec![Rule::opt(&["name", "count"])]);
        assert!(rule.missing(&keys(&[])).is_empty());
        assert!(rule.validate(&keys(&["name"])).is_ok());
        assert!(rule.validate(&keys(&[])).is_ok());
    }

    #[test]
    fn test_unexpected_params_rejected_sorted() {
        let rule = Rule::all_of(vec![Rule::key("type"), Rule::opt(&["name"])]);
        let err = rule
            .validate(&keys(&["type", "zone", "count"]))
            .unwrap_err();
        assert!(err.contains("unexpected param(s): count, zone"), "{}", err);
    }

    #[test]
    fn test_missing_is_deterministic() {
        let rule = Rule::all_of(vec![
            Rule::key("b"),
            Rule::key("a"),
            Rule::at_least_one_of(vec![Rule::key("x"), Rule::key("y")]),
        ]);
        let first = rule.missing(&keys(&[]));
        let second = rule.missing(&keys(&[]));
        assert_eq!(first, second);
        assert_eq!(first, vec!["b", "a", "x"]);
    }
}
