//! Compilation environment.
//!
//! The environment carries everything the passes consult: command and
//! meta-command lookups, hole fillers, the interactive missing-holes
//! callback, and the alias resolver. It also accumulates what
//! compilation produced: the fillers actually consumed and the
//! variable values inlined away.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::ast::{Command, MetaCommand};

/// Resolves a concatenated action+entity key to a command.
pub type CommandLookup = Arc<dyn Fn(&str) -> Option<Arc<dyn Command>> + Send + Sync>;

/// Resolves (action, entity, param keys) to a meta-command.
pub type MetaCommandLookup =
    Arc<dyn Fn(&str, &str, &[String]) -> Option<Arc<dyn MetaCommand>> + Send + Sync>;

/// Supplies a value for a still-open hole, given its name and
/// candidate completions.
pub type MissingHolesResolver = Arc<dyn Fn(&str, &[String]) -> Json + Send + Sync>;

/// Resolves (entity, param key, alias) to a canonical identifier.
/// Returning `None` marks the alias unresolvable.
pub type AliasResolver = Arc<dyn Fn(&str, &str, &str) -> Option<String> + Send + Sync>;

/// Environment threaded through the compile passes.
#[derive(Clone, Default)]
pub struct CompileEnv {
    lookup_command: Option<CommandLookup>,
    lookup_meta_command: Option<MetaCommandLookup>,
    fillers: IndexMap<String, Json>,
    missing_holes_resolver: Option<MissingHolesResolver>,
    alias_resolver: Option<AliasResolver>,
    processed_fillers: IndexMap<String, Json>,
    resolved_variables: IndexMap<String, Json>,
}

impl CompileEnv {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the command lookup function.
    #[must_use]
    pub fn with_command_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<Arc<dyn Command>> + Send + Sync + 'static,
    ) -> Self {
        self.lookup_command = Some(Arc::new(lookup));
        self
    }

    /// Set the meta-command lookup function.
    #[must_use]
    pub fn with_meta_command_lookup(
        mut self,
        lookup: impl Fn(&str, &str, &[String]) -> Option<Arc<dyn MetaCommand>> + Send + Sync + 'static,
    ) -> Self {
        self.lookup_meta_command = Some(Arc::new(lookup));
        self
    }

    /// Set the hole fillers.
    #[must_use]
    pub fn with_fillers(mut self, fillers: IndexMap<String, Json>) -> Self {
        self.fillers = fillers;
        self
    }

    /// Add one filler.
    #[must_use]
    pub fn with_filler(mut self, name: impl Into<String>, value: Json) -> Self {
        self.fillers.insert(name.into(), value);
        self
    }

    /// Set the interactive missing-holes callback.
    #[must_use]
    pub fn with_missing_holes_resolver(
        mut self,
        resolver: impl Fn(&str, &[String]) -> Json + Send + Sync + 'static,
    ) -> Self {
        self.missing_holes_resolver = Some(Arc::new(resolver));
        self
    }

    /// Set the alias resolver.
    #[must_use]
    pub fn with_alias_resolver(
        mut self,
        resolver: impl Fn(&str, &str, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.alias_resolver = Some(Arc::new(resolver));
        self
    }

    /// Whether a command lookup is configured.
    #[must_use]
    pub fn has_command_lookup(&self) -> bool {
        self.lookup_command.is_some()
    }

    /// Look up a command by its concatenated action+entity key.
    #[must_use]
    pub fn lookup_command(&self, key: &str) -> Option<Arc<dyn Command>> {
        self.lookup_command.as_ref().and_then(|f| f(key))
    }

    /// Whether a meta-command lookup is configured.
    #[must_use]
    pub fn has_meta_command_lookup(&self) -> bool {
        self.lookup_meta_command.is_some()
    }

    /// Look up a meta-command.
    #[must_use]
    pub fn lookup_meta_command(
        &self,
        action: &str,
        entity: &str,
        keys: &[String],
    ) -> Option<Arc<dyn MetaCommand>> {
        self.lookup_meta_command
            .as_ref()
            .and_then(|f| f(action, entity, keys))
    }

    /// The configured hole fillers.
    #[must_use]
    pub fn fillers(&self) -> &IndexMap<String, Json> {
        &self.fillers
    }

    /// Ask the missing-holes callback for a value, if configured.
    #[must_use]
    pub fn resolve_missing_hole(&self, name: &str, candidates: &[String]) -> Option<Json> {
        self.missing_holes_resolver
            .as_ref()
            .map(|f| f(name, candidates))
    }

    /// Whether an alias resolver is configured.
    #[must_use]
    pub fn has_alias_resolver(&self) -> bool {
        self.alias_resolver.is_some()
    }

    /// Resolve an alias for the given entity and param key.
    ///
    /// Returns `None` when no resolver is configured or the resolver
    /// could not map the alias.
    #[must_use]
    pub fn resolve_alias(&self, entity: &str, key: &str, alias: &str) -> Option<String> {
        self.alias_resolver
            .as_ref()
            .and_then(|f| f(entity, key, alias))
            .filter(|actual| !actual.is_empty())
    }

    /// Record fillers consumed by a hole-resolution pass.
    pub fn add_processed_fillers(&mut self, fillers: IndexMap<String, Json>) {
        self.processed_fillers.extend(fillers);
    }

    /// Record a variable value inlined away by the compiler.
    pub fn add_resolved_variable(&mut self, name: impl Into<String>, value: Json) {
        self.resolved_variables.insert(name.into(), value);
    }

    /// Fillers consumed across all passes so far.
    #[must_use]
    pub fn processed_fillers(&self) -> &IndexMap<String, Json> {
        &self.processed_fillers
    }

    /// Variable values inlined during compilation.
    #[must_use]
    pub fn resolved_variables(&self) -> &IndexMap<String, Json> {
        &self.resolved_variables
    }
}

impl std::fmt::Debug for CompileEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileEnv")
            .field("has_command_lookup", &self.lookup_command.is_some())
            .field("has_meta_command_lookup", &self.lookup_meta_command.is_some())
            .field("fillers", &self.fillers)
            .field("has_missing_holes_resolver", &self.missing_holes_resolver.is_some())
            .field("has_alias_resolver", &self.alias_resolver.is_some())
            .field("processed_fillers", &self.processed_fillers)
            .field("resolved_variables", &self.resolved_variables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Rule;
    use serde_json::json;

    struct NoopCommand;

    impl Command for NoopCommand {
        fn params(&self) -> Rule {
            Rule::all_of(vec![])
        }
    }

    #[test]
    fn test_empty_env_has_no_capabilities() {
        let env = CompileEnv::new();
        assert!(!env.has_command_lookup());
        assert!(!env.has_meta_command_lookup());
        assert!(!env.has_alias_resolver());
        assert!(env.lookup_command("createinstance").is_none());
        assert!(env.resolve_missing_hole("x", &[]).is_none());
    }

    #[test]
    fn test_command_lookup_round_trip() {
        let env = CompileEnv::new().with_command_lookup(|key| {
            if key == "createinstance" {
                Some(Arc::new(NoopCommand) as Arc<dyn Command>)
            } else {
                None
            }
        });
        assert!(env.has_command_lookup());
        assert!(env.lookup_command("createinstance").is_some());
        assert!(env.lookup_command("deleteinstance").is_none());
    }

    #[test]
    fn test_alias_resolver_empty_string_is_unresolved() {
        let env = CompileEnv::new().with_alias_resolver(|_, _, alias| {
            if alias == "known" {
                Some("id-123".to_string())
            } else {
                Some(String::new())
            }
        });
        assert_eq!(env.resolve_alias("instance", "subnet", "known"), Some("id-123".to_string()));
        assert_eq!(env.resolve_alias("instance", "subnet", "unknown"), None);
    }

    #[test]
    fn test_accumulators_extend() {
        let mut env = CompileEnv::new();
        let mut first = IndexMap::new();
        first.insert("a".to_string(), json!(1));
        env.add_processed_fillers(first);

        let mut second = IndexMap::new();
        second.insert("b".to_string(), json!(2));
        env.add_processed_fillers(second);

        env.add_resolved_variable("foo", json!("bar"));

        assert_eq!(env.processed_fillers().len(), 2);
        assert_eq!(env.resolved_variables().get("foo"), Some(&json!("bar")));
    }
}
