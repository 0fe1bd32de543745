//! The staged compile pipeline.
//!
//! Compilation is an ordered sequence of pure passes over
//! `(Template, CompileEnv)`. The ordering is contractual: every pass
//! assumes the post-conditions of all earlier passes, and the first
//! error aborts the pipeline.

use indexmap::{IndexMap, IndexSet};

use crate::ast::{Node, Statement, Template};
use crate::env::CompileEnv;
use crate::error::{CompileError, CompileResult, LookupStage};
use crate::value::{Value, WithAlias, WithRefs};

/// Result of one pass: the rewritten template and environment.
pub type PassResult = CompileResult<(Template, CompileEnv)>;

/// One stage of the compile pipeline.
pub type Pass = fn(Template, CompileEnv) -> PassResult;

/// Validation-only mode: resolves what it can, fails on structural
/// errors, but tolerates holes and aliases left open.
pub const TEST_COMPILE_MODE: &[Pass] = &[
    resolve_meta,
    verify_commands_defined,
    fail_on_declaration_with_no_result,
    process_and_validate_params,
    check_invalid_reference_declarations,
    resolve_holes,
    resolve_missing_holes,
    resolve_alias,
    inline_variable_value,
];

/// Full mode used by the runner: test mode followed by the
/// finalization passes that demand complete resolution and bind
/// commands to their nodes.
pub const RUNNER_COMPILE_MODE: &[Pass] = &[
    resolve_meta,
    verify_commands_defined,
    fail_on_declaration_with_no_result,
    process_and_validate_params,
    check_invalid_reference_declarations,
    resolve_holes,
    resolve_missing_holes,
    resolve_alias,
    inline_variable_value,
    fail_on_unresolved_holes,
    fail_on_unresolved_alias,
    convert_params,
    validate_commands,
    inject_commands,
];

/// Compile `template` in runner mode.
///
/// # Errors
///
/// Returns the first pass failure.
pub fn compile(template: Template, env: CompileEnv) -> PassResult {
    compile_with_mode(template, env, RUNNER_COMPILE_MODE)
}

/// Compile `template` with an explicit pass list.
///
/// # Errors
///
/// Returns the first pass failure.
pub fn compile_with_mode(
    mut template: Template,
    mut env: CompileEnv,
    mode: &[Pass],
) -> PassResult {
    for pass in mode {
        let (tpl, cenv) = pass(template, env)?;
        template = tpl;
        env = cenv;
    }
    Ok((template, env))
}

/// Expand meta-commands into their sub-templates.
///
/// A no-op when the environment carries no meta-command lookup.
/// Expanded statements are spliced in place and inspected by every
/// later pass; they are not re-scanned for further meta-commands.
pub fn resolve_meta(mut template: Template, env: CompileEnv) -> PassResult {
    if !env.has_meta_command_lookup() {
        return Ok((template, env));
    }

    let mut i = 0;
    while i < template.statements.len() {
        let expansion = match template.statements[i].node.as_command() {
            Some(node) => {
                match env.lookup_meta_command(&node.action, &node.entity, &node.keys()) {
                    Some(meta) => {
                        let resolved = meta.resolve(&node.string_params()).map_err(|msg| {
                            CompileError::command(
                                &node.action,
                                &node.entity,
                                format!("resolve meta command: {}", msg),
                            )
                        })?;
                        Some(resolved)
                    }
                    None => None,
                }
            }
            None => None,
        };

        match expansion {
            Some(sub) => {
                let inserted = sub.statements.len();
                template.replace_statement_with_template(i, sub)?;
                i += inserted;
            }
            None => i += 1,
        }
    }
    Ok((template, env))
}

/// Fail when the command lookup is missing or any command is
/// unregistered.
pub fn verify_commands_defined(template: Template, env: CompileEnv) -> PassResult {
    if !env.has_command_lookup() {
        return Err(CompileError::NoCommandLookup);
    }
    for node in template.command_nodes() {
        let key = node.lookup_key();
        if env.lookup_command(&key).is_none() {
            return Err(CompileError::CommandNotFound {
                stage: LookupStage::Verify,
                key,
            });
        }
    }
    Ok((template, env))
}

/// Fail when a declaration's command cannot produce a result.
pub fn fail_on_declaration_with_no_result(template: Template, env: CompileEnv) -> PassResult {
    for decl in template.declaration_nodes() {
        let Some(node) = decl.expr.as_command() else {
            continue;
        };
        let key = node.lookup_key();
        let Some(command) = env.lookup_command(&key) else {
            return Err(CompileError::CommandNotFound {
                stage: LookupStage::Validate,
                key,
            });
        };
        if command.result_extractor().is_none() {
            return Err(CompileError::command(
                &node.action,
                &node.entity,
                "command does not return a result, cannot assign to a variable",
            ));
        }
    }
    Ok((template, env))
}

/// Turn missing required params into holes named `entity.key`, then
/// validate each command's key set against its rule.
pub fn process_and_validate_params(mut template: Template, env: CompileEnv) -> PassResult {
    for node in template.command_nodes_mut() {
        let key = node.lookup_key();
        let Some(command) = env.lookup_command(&key) else {
            return Err(CompileError::CommandNotFound {
                stage: LookupStage::ProcessParams,
                key,
            });
        };
        let rule = command.params();
        for missing in rule.missing(&node.keys()) {
            let hole = format!("{}.{}", node.entity, missing);
            node.params.insert(missing, Value::hole(hole));
        }
        if let Err(msg) = rule.validate(&node.keys()) {
            return Err(CompileError::command(&node.action, &node.entity, msg));
        }
    }
    Ok((template, env))
}

/// Enforce forward-only, single-assignment reference scoping.
pub fn check_invalid_reference_declarations(template: Template, env: CompileEnv) -> PassResult {
    let mut known: IndexSet<String> = IndexSet::new();

    for st in &template.statements {
        for name in st.node.refs() {
            if !known.contains(&name) {
                return Err(CompileError::UndefinedReference { name });
            }
        }
        if let Node::Declaration(decl) = &st.node {
            if known.contains(&decl.ident) {
                return Err(CompileError::DuplicateReference {
                    name: decl.ident.clone(),
                });
            }
            known.insert(decl.ident.clone());
        }
    }
    Ok((template, env))
}

/// Fill holes from the environment's fillers.
pub fn resolve_holes(mut template: Template, mut env: CompileEnv) -> PassResult {
    let fillers = env.fillers().clone();
    let mut processed = IndexMap::new();
    template.visit_holes(|h| {
        processed.extend(h.process_holes(&fillers));
    });
    env.add_processed_fillers(processed);
    Ok((template, env))
}

/// Ask the missing-holes callback for every still-open hole, in
/// lexical name order, then fill with the answers.
pub fn resolve_missing_holes(mut template: Template, mut env: CompileEnv) -> PassResult {
    let open = template.holes();
    let mut names: Vec<&String> = open.keys().collect();
    names.sort();

    let mut fillers = IndexMap::new();
    for name in names {
        if let Some(value) = env.resolve_missing_hole(name, &open[name]) {
            fillers.insert(name.clone(), value);
        }
    }

    let mut processed = IndexMap::new();
    template.visit_holes(|h| {
        processed.extend(h.process_holes(&fillers));
    });
    env.add_processed_fillers(processed);
    Ok((template, env))
}

/// Resolve aliases through the environment's resolver.
///
/// Aliases the resolver maps to nothing fail the pass; with no
/// resolver configured, aliases are simply left open.
pub fn resolve_alias(mut template: Template, env: CompileEnv) -> PassResult {
    let mut unresolvable: Vec<String> = Vec::new();

    for node in template.expression_nodes_mut() {
        match node {
            Node::Command(cmd) => {
                let entity = cmd.entity.clone();
                for (key, value) in cmd.params.iter_mut() {
                    if value.aliases().is_empty() {
                        continue;
                    }
                    value.resolve_alias(&mut |alias| match env.resolve_alias(&entity, key, alias) {
                        Some(actual) => {
                            tracing::debug!(alias, actual = %actual, key = %key, "alias resolved");
                            Some(actual)
                        }
                        None => {
                            if env.has_alias_resolver() {
                                unresolvable.push(alias.to_string());
                            }
                            None
                        }
                    });
                }
            }
            Node::Value(value_node) => {
                if value_node.aliases().is_empty() {
                    continue;
                }
                value_node.resolve_alias(&mut |alias| match env.resolve_alias("", "", alias) {
                    Some(actual) => {
                        tracing::debug!(alias, actual = %actual, "alias resolved");
                        Some(actual)
                    }
                    None => {
                        if env.has_alias_resolver() {
                            unresolvable.push(alias.to_string());
                        }
                        None
                    }
                });
            }
            Node::Declaration(_) => {}
        }
    }

    if !unresolvable.is_empty() {
        return Err(CompileError::AliasResolution {
            names: unresolvable,
        });
    }
    Ok((template, env))
}

/// Inline resolved value declarations into later references and drop
/// the declarations; unresolved value declarations are kept but still
/// substituted into later statements.
pub fn inline_variable_value(mut template: Template, mut env: CompileEnv) -> PassResult {
    let mut statements = std::mem::take(&mut template.statements);
    let mut kept: Vec<Statement> = Vec::with_capacity(statements.len());

    for i in 0..statements.len() {
        let declared_value = match &statements[i].node {
            Node::Declaration(decl) => match decl.expr.as_ref() {
                Node::Value(v) => Some((decl.ident.clone(), v.value.clone())),
                _ => None,
            },
            _ => None,
        };

        if let Some((ident, value)) = declared_value {
            if let Some(val) = value.value() {
                env.add_resolved_variable(&ident, val.clone());
            }
            let (_, tail) = statements.split_at_mut(i + 1);
            for st in tail {
                match st.expression_mut() {
                    Node::Command(c) => c.replace_ref(&ident, &value),
                    Node::Value(v) => v.replace_ref(&ident, &value),
                    Node::Declaration(_) => {}
                }
            }
            if value.is_resolved() {
                continue;
            }
        }
        kept.push(statements[i].clone());
    }

    template.statements = kept;
    Ok((template, env))
}

/// Fail when any hole remains open; the reported list is sorted.
pub fn fail_on_unresolved_holes(template: Template, env: CompileEnv) -> PassResult {
    let mut names: Vec<String> = template.holes().keys().cloned().collect();
    if !names.is_empty() {
        names.sort();
        return Err(CompileError::UnresolvedHoles { names });
    }
    Ok((template, env))
}

/// Fail when any alias remains open.
pub fn fail_on_unresolved_alias(template: Template, env: CompileEnv) -> PassResult {
    let mut names: Vec<String> = Vec::new();
    for node in template.expression_nodes() {
        match node {
            Node::Command(c) => names.extend(c.aliases()),
            Node::Value(v) => names.extend(v.aliases()),
            Node::Declaration(_) => {}
        }
    }
    if !names.is_empty() {
        return Err(CompileError::UnresolvedAliases { names });
    }
    Ok((template, env))
}

/// Run each command's parameter conversion, replacing consumed keys
/// with opaque converted values.
pub fn convert_params(mut template: Template, env: CompileEnv) -> PassResult {
    for node in template.command_nodes_mut() {
        let key = node.lookup_key();
        let Some(command) = env.lookup_command(&key) else {
            return Err(CompileError::CommandNotFound {
                stage: LookupStage::Convert,
                key,
            });
        };
        let Some(converter) = command.param_converter() else {
            continue;
        };

        let driver = node.driver_params();
        let mut values = IndexMap::new();
        for k in &converter.keys {
            if let Some(v) = driver.get(k) {
                values.insert(k.clone(), v.clone());
            }
        }
        let converted = (converter.convert)(values)
            .map_err(|msg| CompileError::command(&node.action, &node.entity, msg))?;

        for k in &converter.keys {
            node.params.shift_remove(k);
        }
        for (k, v) in converted {
            node.params.insert(k, Value::interface(v));
        }
    }
    Ok((template, env))
}

/// Collect every command's validation failures across the template.
pub fn validate_commands(template: Template, env: CompileEnv) -> PassResult {
    let mut messages: Vec<String> = Vec::new();

    for node in template.command_nodes() {
        let key = node.lookup_key();
        let Some(command) = env.lookup_command(&key) else {
            return Err(CompileError::CommandNotFound {
                stage: LookupStage::Validate,
                key,
            });
        };
        let Some(validator) = command.command_validator() else {
            continue;
        };

        let ref_keys: Vec<String> = node
            .params
            .iter()
            .filter(|(_, v)| !v.refs().is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        for msg in validator(&node.driver_params(), &ref_keys) {
            messages.push(format!("{} {}: {}", node.action, node.entity, msg));
        }
    }

    if !messages.is_empty() {
        return Err(CompileError::Validation { messages });
    }
    Ok((template, env))
}

/// Bind each command node to its registered command.
pub fn inject_commands(mut template: Template, env: CompileEnv) -> PassResult {
    for node in template.command_nodes_mut() {
        let key = node.lookup_key();
        match env.lookup_command(&key) {
            Some(command) => node.command = Some(command),
            None => {
                return Err(CompileError::CommandNotFound {
                    stage: LookupStage::Inject,
                    key,
                });
            }
        }
    }
    Ok((template, env))
}
