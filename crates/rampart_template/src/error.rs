//! Compilation error types.

use std::fmt;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Pipeline stage performing a command lookup, used to prefix
/// not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStage {
    /// Initial existence check; message carries no prefix.
    Verify,
    /// Declaration result check.
    Validate,
    /// Parameter normalization.
    ProcessParams,
    /// Parameter conversion.
    Convert,
    /// Command binding.
    Inject,
}

impl LookupStage {
    fn prefix(self) -> &'static str {
        match self {
            Self::Verify => "",
            Self::Validate => "validate: ",
            Self::ProcessParams => "process params: ",
            Self::Convert => "convert: ",
            Self::Inject => "inject: ",
        }
    }
}

/// Why a template failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// No command lookup function configured in the environment.
    NoCommandLookup,

    /// No command registered under `key`.
    CommandNotFound {
        /// Stage at which the lookup failed.
        stage: LookupStage,
        /// Concatenated action+entity lookup key.
        key: String,
    },

    /// A command-scoped failure, prefixed by `action entity:`.
    Command {
        /// Command action.
        action: String,
        /// Command entity.
        entity: String,
        /// Failure description.
        message: String,
    },

    /// A `$ref` used before any declaration of that identifier.
    UndefinedReference {
        /// Referenced identifier.
        name: String,
    },

    /// A declaration identifier assigned more than once.
    DuplicateReference {
        /// Redeclared identifier.
        name: String,
    },

    /// Holes left unresolved at the end of the runner pipeline.
    UnresolvedHoles {
        /// Hole names, sorted lexicographically.
        names: Vec<String>,
    },

    /// Aliases left unresolved at the end of the runner pipeline.
    UnresolvedAliases {
        /// Alias names in template order.
        names: Vec<String>,
    },

    /// Aliases the resolver could not map to an identifier.
    AliasResolution {
        /// Alias names in template order.
        names: Vec<String>,
    },

    /// Aggregated command validation failures.
    Validation {
        /// Per-command messages, already `action entity:` prefixed.
        messages: Vec<String>,
    },

    /// Statement splice target not present in the template.
    StatementNotFound,
}

impl CompileError {
    /// A command-scoped failure message.
    #[must_use]
    pub fn command(action: &str, entity: &str, message: impl Into<String>) -> Self {
        Self::Command {
            action: action.to_string(),
            entity: entity.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCommandLookup => write!(f, "command lookup is undefined"),
            Self::CommandNotFound { stage, key } => {
                write!(f, "{}cannot find command for '{}'", stage.prefix(), key)
            }
            Self::Command {
                action,
                entity,
                message,
            } => write!(f, "{} {}: {}", action, entity, message),
            Self::UndefinedReference { name } => write!(
                f,
                "using reference '${}' but '{}' is undefined in template",
                name, name
            ),
            Self::DuplicateReference { name } => write!(
                f,
                "using reference '${}' but '{}' has already been assigned in template",
                name, name
            ),
            Self::UnresolvedHoles { names } => {
                write!(f, "template contains unresolved holes: [{}]", names.join(", "))
            }
            Self::UnresolvedAliases { names } => {
                write!(f, "template contains unresolved alias: [{}]", names.join(", "))
            }
            Self::AliasResolution { names } => write!(
                f,
                "cannot resolve aliases: [{}]. Maybe you need to update your local model with `rampart sync`",
                names.join(", ")
            ),
            Self::Validation { messages } => match messages.len() {
                1 => write!(f, "validation error: {}", messages[0]),
                _ => write!(f, "validation errors:\n\t- {}", messages.join("\n\t- ")),
            },
            Self::StatementNotFound => write!(f, "node not found in template"),
        }
    }
}

impl std::error::Error for CompileError {}
