//! RAMPART Template Compiler
//!
//! A staged rewrite pipeline for the rampart DSL: it takes a parsed
//! template (declarations and command invocations), a compilation
//! environment (command registry, fillers, alias resolver,
//! meta-command resolver), and produces a fully resolved template
//! ready for execution, or an error describing why compilation failed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compile;
pub mod env;
pub mod error;
pub mod params;
pub mod validate;
pub mod value;

pub use ast::{
    Command, CommandNode, CommandValidator, DeclarationNode, MetaCommand, Node, ParamConverter,
    ResultExtractor, Statement, Template, ValueNode,
};
pub use compile::{
    compile, compile_with_mode, Pass, PassResult, RUNNER_COMPILE_MODE, TEST_COMPILE_MODE,
};
pub use env::{
    AliasResolver, CommandLookup, CompileEnv, MetaCommandLookup, MissingHolesResolver,
};
pub use error::{CompileError, CompileResult, LookupStage};
pub use params::Rule;
pub use validate::{EnumValidator, ParamValidator};
pub use value::{AliasValue, HoleValue, RefValue, Value, WithAlias, WithHoles, WithRefs};
