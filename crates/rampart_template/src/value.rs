//! Parameter values and their resolution capabilities.
//!
//! A [`Value`] is what sits on the right-hand side of a command
//! parameter or a bare declaration: a literal, a named hole, a `$ref`
//! to an earlier declaration, an `@alias` to be resolved against the
//! local model, or an opaque value produced by parameter conversion.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Capability of values that carry named holes.
pub trait WithHoles {
    /// Unresolved holes, keyed by hole name, with candidate completions.
    fn holes(&self) -> IndexMap<String, Vec<String>>;

    /// Fill holes from `fillers`.
    ///
    /// Returns the (name, value) pairs that were resolved by this call.
    fn process_holes(&mut self, fillers: &IndexMap<String, Json>) -> IndexMap<String, Json>;
}

/// Capability of values that reference earlier declarations.
pub trait WithRefs {
    /// Names of the references still present.
    fn refs(&self) -> Vec<String>;

    /// Replace every reference to `name` with `value`.
    fn replace_ref(&mut self, name: &str, value: &Value);
}

/// Capability of values that carry an alias to be resolved externally.
pub trait WithAlias {
    /// Aliases still unresolved.
    fn aliases(&self) -> Vec<String>;

    /// Resolve aliases through `resolve`; unresolvable aliases are kept.
    fn resolve_alias(&mut self, resolve: &mut dyn FnMut(&str) -> Option<String>);
}

/// A named slot that must be filled before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoleValue {
    /// Hole name, e.g. `instance.type`.
    pub name: String,
    /// Candidate completions offered to interactive resolvers.
    pub candidates: Vec<String>,
    resolved: Option<Json>,
}

impl HoleValue {
    /// Create an unresolved hole.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
            resolved: None,
        }
    }

    /// Attach candidate completions.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    /// The filled value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Json> {
        self.resolved.as_ref()
    }

    fn fill(&mut self, value: Json) {
        self.resolved = Some(value);
    }
}

/// A `$name` reference to an earlier declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefValue {
    /// Referenced declaration identifier, without the `$` sigil.
    pub name: String,
}

impl RefValue {
    /// Create a reference to `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A human-friendly `@alias` resolved to a canonical identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasValue {
    /// The alias as written in the template, without the `@` sigil.
    pub alias: String,
    resolved: Option<Json>,
}

impl AliasValue {
    /// Create an unresolved alias.
    #[must_use]
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            resolved: None,
        }
    }

    /// The canonical identifier, once resolved.
    #[must_use]
    pub fn value(&self) -> Option<&Json> {
        self.resolved.as_ref()
    }
}

/// A parameter value in one of its five shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A concrete value written in the template.
    Literal(Json),
    /// A named slot to fill before execution.
    Hole(HoleValue),
    /// A `$name` reference to an earlier declaration.
    Ref(RefValue),
    /// An `@alias` resolved against the local model.
    Alias(AliasValue),
    /// An opaque value placed by parameter conversion.
    Interface(Json),
}

impl Value {
    /// A literal value.
    #[must_use]
    pub fn literal(value: impl Into<Json>) -> Self {
        Self::Literal(value.into())
    }

    /// An unresolved hole named `name`.
    #[must_use]
    pub fn hole(name: impl Into<String>) -> Self {
        Self::Hole(HoleValue::new(name))
    }

    /// A reference to declaration `name`.
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(RefValue::new(name))
    }

    /// An unresolved alias.
    #[must_use]
    pub fn alias(alias: impl Into<String>) -> Self {
        Self::Alias(AliasValue::new(alias))
    }

    /// An opaque converted value.
    #[must_use]
    pub fn interface(value: Json) -> Self {
        Self::Interface(value)
    }

    /// The concrete value, if this value is resolved.
    #[must_use]
    pub fn value(&self) -> Option<&Json> {
        match self {
            Self::Literal(v) | Self::Interface(v) => Some(v),
            Self::Hole(h) => h.value(),
            Self::Alias(a) => a.value(),
            Self::Ref(_) => None,
        }
    }

    /// Whether the value carries a concrete payload.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.value().is_some()
    }
}

impl WithHoles for Value {
    fn holes(&self) -> IndexMap<String, Vec<String>> {
        let mut out = IndexMap::new();
        if let Self::Hole(h) = self {
            if h.value().is_none() {
                out.insert(h.name.clone(), h.candidates.clone());
            }
        }
        out
    }

    fn process_holes(&mut self, fillers: &IndexMap<String, Json>) -> IndexMap<String, Json> {
        let mut processed = IndexMap::new();
        if let Self::Hole(h) = self {
            if h.value().is_none() {
                if let Some(fill) = fillers.get(&h.name) {
                    h.fill(fill.clone());
                    processed.insert(h.name.clone(), fill.clone());
                }
            }
        }
        processed
    }
}

impl WithRefs for Value {
    fn refs(&self) -> Vec<String> {
        match self {
            Self::Ref(r) => vec![r.name.clone()],
            _ => Vec::new(),
        }
    }

    fn replace_ref(&mut self, name: &str, value: &Value) {
        if let Self::Ref(r) = self {
            if r.name == name {
                *self = value.clone();
            }
        }
    }
}

impl WithAlias for Value {
    fn aliases(&self) -> Vec<String> {
        match self {
            Self::Alias(a) if a.value().is_none() => vec![a.alias.clone()],
            _ => Vec::new(),
        }
    }

    fn resolve_alias(&mut self, resolve: &mut dyn FnMut(&str) -> Option<String>) {
        if let Self::Alias(a) = self {
            if a.value().is_none() {
                if let Some(actual) = resolve(&a.alias) {
                    a.resolved = Some(Json::String(actual));
                }
            }
        }
    }
}

fn write_json(f: &mut std::fmt::Formatter<'_>, value: &Json) -> std::fmt::Result {
    match value {
        Json::String(s) => write!(f, "{}", s),
        other => write!(f, "{}", other),
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(v) | Self::Interface(v) => write_json(f, v),
            Self::Hole(h) => match h.value() {
                Some(v) => write_json(f, v),
                None => write!(f, "{{{}}}", h.name),
            },
            Self::Ref(r) => write!(f, "${}", r.name),
            Self::Alias(a) => match a.value() {
                Some(v) => write_json(f, v),
                None => write!(f, "@{}", a.alias),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_is_resolved() {
        let v = Value::literal("ami-123");
        assert!(v.is_resolved());
        assert_eq!(v.value(), Some(&json!("ami-123")));
    }

    #[test]
    fn test_hole_unresolved_then_filled() {
        let mut v = Value::hole("instance.type");
        assert!(!v.is_resolved());
        assert_eq!(v.holes().keys().collect::<Vec<_>>(), vec!["instance.type"]);

        let mut fillers = IndexMap::new();
        fillers.insert("instance.type".to_string(), json!("t2.micro"));
        let processed = v.process_holes(&fillers);

        assert_eq!(processed.get("instance.type"), Some(&json!("t2.micro")));
        assert!(v.is_resolved());
        assert!(v.holes().is_empty());
    }

    #[test]
    fn test_hole_ignores_unrelated_fillers() {
        let mut v = Value::hole("name");
        let mut fillers = IndexMap::new();
        fillers.insert("other".to_string(), json!("x"));

        let processed = v.process_holes(&fillers);
        assert!(processed.is_empty());
        assert!(!v.is_resolved());
    }

    #[test]
    fn test_hole_candidates_enumerated() {
        let v = Value::Hole(
            HoleValue::new("instance.type")
                .with_candidates(vec!["t2.micro".to_string(), "t2.nano".to_string()]),
        );
        let holes = v.holes();
        assert_eq!(holes["instance.type"], vec!["t2.micro", "t2.nano"]);
    }

    #[test]
    fn test_ref_replacement() {
        let mut v = Value::reference("subnet");
        assert_eq!(v.refs(), vec!["subnet"]);

        v.replace_ref("other", &Value::literal("nope"));
        assert_eq!(v.refs(), vec!["subnet"]);

        v.replace_ref("subnet", &Value::literal("sub-123"));
        assert!(v.refs().is_empty());
        assert_eq!(v.value(), Some(&json!("sub-123")));
    }

    #[test]
    fn test_alias_resolution() {
        let mut v = Value::alias("my-vpc");
        assert_eq!(v.aliases(), vec!["my-vpc"]);

        v.resolve_alias(&mut |_| None);
        assert_eq!(v.aliases(), vec!["my-vpc"]);

        v.resolve_alias(&mut |alias| Some(format!("vpc-{}", alias.len())));
        assert!(v.aliases().is_empty());
        assert_eq!(v.value(), Some(&json!("vpc-6")));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Value::literal("web").to_string(), "web");
        assert_eq!(Value::literal(42).to_string(), "42");
        assert_eq!(Value::hole("name").to_string(), "{name}");
        assert_eq!(Value::reference("inst").to_string(), "$inst");
        assert_eq!(Value::alias("my-vpc").to_string(), "@my-vpc");
    }

    #[test]
    fn test_display_resolved_hole_shows_value() {
        let mut v = Value::hole("name");
        let mut fillers = IndexMap::new();
        fillers.insert("name".to_string(), json!("web"));
        v.process_holes(&fillers);
        assert_eq!(v.to_string(), "web");
    }
}
