//! Template abstract syntax tree.
//!
//! A [`Template`] is an ordered list of [`Statement`]s produced by the
//! parser. Each statement wraps exactly one [`Node`]: a command
//! invocation, a declaration, or a bare value. The compile passes
//! mutate this tree in place or rebuild the statement list.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::{CompileError, CompileResult};
use crate::params::Rule;
use crate::value::{Value, WithAlias, WithHoles, WithRefs};

/// Extracts the variable value out of a command's execution result.
pub type ResultExtractor = Arc<dyn Fn(&Json) -> String + Send + Sync>;

/// Validates a command's resolved params; each entry is one failure.
pub type CommandValidator =
    Arc<dyn Fn(&IndexMap<String, Json>, &[String]) -> Vec<String> + Send + Sync>;

/// Pre-execution parameter conversion declared by a command.
#[derive(Clone)]
pub struct ParamConverter {
    /// Input keys consumed by the conversion.
    pub keys: Vec<String>,
    /// Conversion from consumed values to opaque output values.
    pub convert: Arc<dyn Fn(IndexMap<String, Json>) -> Result<IndexMap<String, Json>, String> + Send + Sync>,
}

/// A registered command bound to an (action, entity) pair.
///
/// [`params`](Command::params) is mandatory; the remaining capabilities
/// are optional and a command implements the subset it supports.
pub trait Command: Send + Sync {
    /// Parameter rule driving validation and hole insertion.
    fn params(&self) -> Rule;

    /// Result extraction, required when the command is assigned to a
    /// variable.
    fn result_extractor(&self) -> Option<ResultExtractor> {
        None
    }

    /// Parameter conversion run before execution.
    fn param_converter(&self) -> Option<ParamConverter> {
        None
    }

    /// Final validation over resolved params.
    fn command_validator(&self) -> Option<CommandValidator> {
        None
    }
}

/// A meta-command expanded into a sub-template at compile time.
pub trait MetaCommand: Send + Sync {
    /// Resolve the meta-command into the statements replacing it.
    ///
    /// # Errors
    ///
    /// Returns a message when the invocation cannot be expanded.
    fn resolve(&self, params: &IndexMap<String, String>) -> Result<Template, String>;
}

/// A command invocation: `action entity key=value ...`.
#[derive(Clone, Serialize, Deserialize)]
pub struct CommandNode {
    /// Action verb, e.g. `create`.
    pub action: String,
    /// Target entity, e.g. `instance`.
    pub entity: String,
    /// Parameters in declaration order.
    pub params: IndexMap<String, Value>,
    /// Command bound by the inject pass.
    #[serde(skip)]
    pub command: Option<Arc<dyn Command>>,
}

impl CommandNode {
    /// Create a command node with no parameters.
    #[must_use]
    pub fn new(action: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            entity: entity.into(),
            params: IndexMap::new(),
            command: None,
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// The registry lookup key: action and entity concatenated.
    #[must_use]
    pub fn lookup_key(&self) -> String {
        format!("{}{}", self.action, self.entity)
    }

    /// Parameter keys in declaration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    /// Resolved parameters, as handed to drivers and validators.
    #[must_use]
    pub fn driver_params(&self) -> IndexMap<String, Json> {
        self.params
            .iter()
            .filter_map(|(k, v)| v.value().map(|val| (k.clone(), val.clone())))
            .collect()
    }

    /// Parameters stringified for meta-command resolution.
    #[must_use]
    pub fn string_params(&self) -> IndexMap<String, String> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl std::fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandNode")
            .field("action", &self.action)
            .field("entity", &self.entity)
            .field("params", &self.params)
            .field("command", &self.command.as_ref().map(|_| "<bound>"))
            .finish()
    }
}

impl PartialEq for CommandNode {
    fn eq(&self, other: &Self) -> bool {
        self.action == other.action
            && self.entity == other.entity
            && self.params == other.params
            && self.command.is_some() == other.command.is_some()
    }
}

impl std::fmt::Display for CommandNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.entity)?;
        for (k, v) in &self.params {
            write!(f, " {}={}", k, v)?;
        }
        Ok(())
    }
}

impl WithHoles for CommandNode {
    fn holes(&self) -> IndexMap<String, Vec<String>> {
        let mut out: IndexMap<String, Vec<String>> = IndexMap::new();
        for value in self.params.values() {
            for (name, candidates) in value.holes() {
                let entry = out.entry(name).or_default();
                for c in candidates {
                    if !entry.contains(&c) {
                        entry.push(c);
                    }
                }
            }
        }
        out
    }

    fn process_holes(&mut self, fillers: &IndexMap<String, Json>) -> IndexMap<String, Json> {
        let mut processed = IndexMap::new();
        for value in self.params.values_mut() {
            processed.extend(value.process_holes(fillers));
        }
        processed
    }
}

impl WithRefs for CommandNode {
    fn refs(&self) -> Vec<String> {
        self.params.values().flat_map(WithRefs::refs).collect()
    }

    fn replace_ref(&mut self, name: &str, value: &Value) {
        for v in self.params.values_mut() {
            v.replace_ref(name, value);
        }
    }
}

impl WithAlias for CommandNode {
    fn aliases(&self) -> Vec<String> {
        self.params.values().flat_map(WithAlias::aliases).collect()
    }

    fn resolve_alias(&mut self, resolve: &mut dyn FnMut(&str) -> Option<String>) {
        for v in self.params.values_mut() {
            v.resolve_alias(resolve);
        }
    }
}

/// A declaration: `ident = expression`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationNode {
    /// Declared identifier, referenced later as `$ident`.
    pub ident: String,
    /// Right-hand side, a command or value node.
    pub expr: Box<Node>,
}

impl DeclarationNode {
    /// Create a declaration.
    #[must_use]
    pub fn new(ident: impl Into<String>, expr: Node) -> Self {
        Self {
            ident: ident.into(),
            expr: Box::new(expr),
        }
    }
}

/// A bare value statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueNode {
    /// The wrapped value.
    pub value: Value,
}

impl ValueNode {
    /// Wrap a value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Whether the wrapped value is resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.value.is_resolved()
    }
}

impl WithHoles for ValueNode {
    fn holes(&self) -> IndexMap<String, Vec<String>> {
        self.value.holes()
    }

    fn process_holes(&mut self, fillers: &IndexMap<String, Json>) -> IndexMap<String, Json> {
        self.value.process_holes(fillers)
    }
}

impl WithRefs for ValueNode {
    fn refs(&self) -> Vec<String> {
        self.value.refs()
    }

    fn replace_ref(&mut self, name: &str, value: &Value) {
        self.value.replace_ref(name, value);
    }
}

impl WithAlias for ValueNode {
    fn aliases(&self) -> Vec<String> {
        self.value.aliases()
    }

    fn resolve_alias(&mut self, resolve: &mut dyn FnMut(&str) -> Option<String>) {
        self.value.resolve_alias(resolve);
    }
}

/// One syntax-tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// A command invocation.
    Command(CommandNode),
    /// A declaration.
    Declaration(DeclarationNode),
    /// A bare value.
    Value(ValueNode),
}

impl Node {
    /// The command node, if this is one.
    #[must_use]
    pub fn as_command(&self) -> Option<&CommandNode> {
        match self {
            Self::Command(c) => Some(c),
            _ => None,
        }
    }

    /// Mutable access to the command node, if this is one.
    pub fn as_command_mut(&mut self) -> Option<&mut CommandNode> {
        match self {
            Self::Command(c) => Some(c),
            _ => None,
        }
    }

    /// References carried by this node, if any.
    #[must_use]
    pub fn refs(&self) -> Vec<String> {
        match self {
            Self::Command(c) => c.refs(),
            Self::Value(v) => v.refs(),
            Self::Declaration(d) => d.expr.refs(),
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(c) => write!(f, "{}", c),
            Self::Declaration(d) => write!(f, "{} = {}", d.ident, d.expr),
            Self::Value(v) => write!(f, "{}", v.value),
        }
    }
}

/// One top-level template item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// The wrapped node.
    pub node: Node,
}

impl Statement {
    /// Wrap a node.
    #[must_use]
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    /// The expression node: a declaration's right-hand side, or the
    /// node itself.
    #[must_use]
    pub fn expression(&self) -> &Node {
        match &self.node {
            Node::Declaration(d) => &*d.expr,
            other => other,
        }
    }

    /// Mutable expression node.
    pub fn expression_mut(&mut self) -> &mut Node {
        match &mut self.node {
            Node::Declaration(d) => &mut *d.expr,
            other => other,
        }
    }
}

/// An ordered DSL program, compiled as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Stable template identifier.
    pub id: String,
    /// Statements in execution order.
    pub statements: Vec<Statement>,
}

impl Template {
    /// Create an empty template with a generated identifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            statements: Vec::new(),
        }
    }

    /// Create an empty template with a fixed identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            statements: Vec::new(),
        }
    }

    /// Append a statement wrapping `node`.
    pub fn add_statement(&mut self, node: Node) {
        self.statements.push(Statement::new(node));
    }

    /// Builder form of [`add_statement`](Self::add_statement).
    #[must_use]
    pub fn with_statement(mut self, node: Node) -> Self {
        self.add_statement(node);
        self
    }

    /// All command nodes, including declaration right-hand sides.
    pub fn command_nodes(&self) -> impl Iterator<Item = &CommandNode> {
        self.statements
            .iter()
            .filter_map(|st| st.expression().as_command())
    }

    /// Mutable command nodes, including declaration right-hand sides.
    pub fn command_nodes_mut(&mut self) -> impl Iterator<Item = &mut CommandNode> {
        self.statements
            .iter_mut()
            .filter_map(|st| st.expression_mut().as_command_mut())
    }

    /// Declarations in statement order.
    pub fn declaration_nodes(&self) -> impl Iterator<Item = &DeclarationNode> {
        self.statements.iter().filter_map(|st| match &st.node {
            Node::Declaration(d) => Some(d),
            _ => None,
        })
    }

    /// Expression nodes (command or value), including declaration
    /// right-hand sides.
    pub fn expression_nodes(&self) -> impl Iterator<Item = &Node> {
        self.statements.iter().map(Statement::expression)
    }

    /// Mutable expression nodes.
    pub fn expression_nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.statements.iter_mut().map(Statement::expression_mut)
    }

    /// Visit every hole-carrying node mutably.
    pub fn visit_holes(&mut self, mut f: impl FnMut(&mut dyn WithHoles)) {
        for node in self.expression_nodes_mut() {
            match node {
                Node::Command(c) => f(c),
                Node::Value(v) => f(v),
                Node::Declaration(_) => {}
            }
        }
    }

    /// Unresolved holes across the template, with deduplicated
    /// candidate lists.
    #[must_use]
    pub fn holes(&self) -> IndexMap<String, Vec<String>> {
        let mut out: IndexMap<String, Vec<String>> = IndexMap::new();
        for node in self.expression_nodes() {
            let holes = match node {
                Node::Command(c) => c.holes(),
                Node::Value(v) => v.holes(),
                Node::Declaration(_) => continue,
            };
            for (name, candidates) in holes {
                let entry = out.entry(name).or_default();
                for c in candidates {
                    if !entry.contains(&c) {
                        entry.push(c);
                    }
                }
            }
        }
        out
    }

    /// Replace the statement at `index` with the statements of
    /// `template`, preserving surrounding order.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::StatementNotFound`] when `index` is out
    /// of range.
    pub fn replace_statement_with_template(
        &mut self,
        index: usize,
        template: Template,
    ) -> CompileResult<()> {
        if index >= self.statements.len() {
            return Err(CompileError::StatementNotFound);
        }
        self.statements
            .splice(index..=index, template.statements);
        Ok(())
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, st) in self.statements.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", st.node)?;
        }
        Ok(())
    }
}
