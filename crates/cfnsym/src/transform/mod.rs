//! Macro Expander
//!
//! Rewrites a template bottom-up into a new tree:
//! - `Fn::ForEach::<Name>` blocks are unrolled into sibling keys, one set of keys per
//!   collection item, with the loop variable bound while the body is expanded
//! - `${name}` / `&{name}` placeholders in object keys and in `Fn::Sub` strings are substituted
//!   with bound loop variables
//! - `Ref` to a loop variable is replaced by its value
//! - `Fn::FindInMap` is resolved when its arguments only depend on loop variables
//! - `Fn::ToJsonString` of a value without intrinsic functions becomes a string
//!
//! Collections that can not be resolved statically are replaced by placeholders from the
//! [cache::CollectionCache] so the shape of the expansion can still be validated.
//!
//! Structural problems abort the expansion with a [Diagnostic]; the input is never modified.
pub mod bindings;
pub mod cache;
pub mod evaluate;
pub mod intrinsic;
pub mod pseudo;
pub mod sub;

use crate::settings::Settings;
use crate::template::Template;
use crate::value::{Map, Path, PathSegment, Value};
use bindings::Scope;
use cache::CollectionCache;
use evaluate::Evaluator;
use intrinsic::{function_call, IntrinsicKind};

/// Per-invocation state of one transform pass
#[derive(Debug)]
pub struct TransformContext<'t> {
    pub(crate) parameters: Option<&'t Map>,
    pub(crate) mappings: Option<&'t Map>,
    pub(crate) region: String,
    cache: CollectionCache,
}

impl<'t> TransformContext<'t> {
    pub fn new(template: &'t Template, settings: &Settings) -> Self {
        Self {
            parameters: template.parameters(),
            mappings: template.mappings(),
            region: settings.primary_region().to_string(),
            cache: Default::default(),
        }
    }

    pub fn cache(&self) -> &CollectionCache {
        &self.cache
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, serde::Serialize)]
pub enum DiagnosticKind {
    #[error("Fn::ForEach must be a list of [identifier, collection, output], found {0} element(s)")]
    ForEachArity(usize),
    #[error("Fn::ForEach must be a list")]
    ForEachNotList,
    #[error("Fn::ForEach loop identifier must be a string")]
    LoopVariableNotString,
    #[error("Fn::ForEach collection must be a list")]
    CollectionNotList,
    #[error("Fn::ForEach output must be a mapping")]
    OutputNotMapping,
    #[error("duplicate key {0} after Fn::ForEach expansion")]
    DuplicateKey(String),
    #[error("internal error during transform: {0}")]
    Internal(String),
}

/// A structural problem, located at the offending node
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: Path,
    pub node: Value,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self
            .path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/");
        write!(f, "{} at /{path}", self.kind)
    }
}

#[derive(derive_new::new, Debug)]
pub struct TransformErrors {
    #[new(default)]
    diagnostics: Vec<Diagnostic>,
}

impl TransformErrors {
    pub fn log(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(?diagnostic, "diagnostic found");
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl std::error::Error for TransformErrors {}

impl std::fmt::Display for TransformErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.diagnostics.first() {
            Some(diagnostic) => diagnostic.fmt(f),
            None => f.write_str("transform failed"),
        }
    }
}

/// Expands all macros of `template`
///
/// Panics inside the expansion are reported as a single [DiagnosticKind::Internal].
pub fn expand(template: &Template, settings: &Settings) -> Result<Value, TransformErrors> {
    if !template.uses_language_extensions() {
        tracing::debug!("template does not declare the language extensions transform");
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut context = TransformContext::new(template, settings);
        let expanded = Expander::new(&mut context).expand(template.root());
        (expanded, context.cache.len())
    }));

    let mut errors = TransformErrors::new();
    match outcome {
        Ok((Ok(expanded), placeholders)) => {
            tracing::debug!(placeholders, "template expanded");
            return Ok(expanded);
        }
        Ok((Err(diagnostic), _)) => errors.log(diagnostic),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            errors.log(Diagnostic {
                kind: DiagnosticKind::Internal(message),
                path: vec![],
                node: template.root().clone(),
            });
        }
    }
    Err(errors)
}

/// Like [expand], but falls back to the original tree so validation can continue
pub fn expand_or_original(template: &Template, settings: &Settings) -> (Vec<Diagnostic>, Value) {
    match expand(template, settings) {
        Ok(expanded) => (vec![], expanded),
        Err(errors) => (errors.into_diagnostics(), template.root().clone()),
    }
}

struct Expander<'c, 't> {
    context: &'c mut TransformContext<'t>,
}

impl<'c, 't> Expander<'c, 't> {
    fn new(context: &'c mut TransformContext<'t>) -> Self {
        Self { context }
    }

    fn expand(&mut self, root: &Value) -> Result<Value, Diagnostic> {
        self.value(root, &Scope::root(), &mut vec![])
    }

    fn value(
        &mut self,
        value: &Value,
        scope: &Scope<'_>,
        path: &mut Path,
    ) -> Result<Value, Diagnostic> {
        match value {
            Value::Object(object) => self.object(object, scope, path),
            Value::Array(items) => {
                let mut expanded = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    expanded.push(self.value(item, scope, path)?);
                    path.pop();
                }
                Ok(Value::Array(expanded))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn object(
        &mut self,
        object: &Map,
        scope: &Scope<'_>,
        path: &mut Path,
    ) -> Result<Value, Diagnostic> {
        if object.len() == 1 {
            if let Some((key, args)) = object.first() {
                if let Some(kind) = IntrinsicKind::parse(key).filter(|kind| kind.is_function()) {
                    return self.function(kind, key, args, scope, path);
                }
            }
        }

        // loop macros first, so generated keys exist before the literal keys are checked
        let mut generated: Vec<Option<Vec<(String, Value)>>> = Vec::with_capacity(object.len());
        for (key, block) in object {
            if IntrinsicKind::parse(key) != Some(IntrinsicKind::ForEach) {
                generated.push(None);
                continue;
            }
            path.push(PathSegment::Key(key.clone()));
            let entries = self.for_each(block, scope, path)?;
            path.pop();
            generated.push(Some(entries));
        }

        let mut output = Map::with_capacity(object.len());
        for ((key, child), generated) in object.iter().zip(generated) {
            match generated {
                Some(entries) => {
                    for (generated_key, value) in entries {
                        insert_unique(&mut output, generated_key, value, path, key, child)?;
                    }
                }
                None => {
                    let output_key = substitute_key(key, scope);
                    path.push(PathSegment::Key(key.clone()));
                    let value = self.value(child, scope, path)?;
                    path.pop();
                    insert_unique(&mut output, output_key, value, path, key, child)?;
                }
            }
        }

        Ok(Value::Object(output))
    }

    fn function(
        &mut self,
        kind: IntrinsicKind,
        key: &str,
        args: &Value,
        scope: &Scope<'_>,
        path: &mut Path,
    ) -> Result<Value, Diagnostic> {
        match (kind, args) {
            (IntrinsicKind::Ref, Value::String(name)) => {
                if let Some(bound) = scope.get(name) {
                    return Ok(bound.clone());
                }
            }
            (IntrinsicKind::Sub, _) if !scope.is_empty() => {
                path.push(PathSegment::Key(key.to_string()));
                let args = self.sub(args, scope, path)?;
                path.pop();
                return Ok(call(key, args));
            }
            (IntrinsicKind::FindInMap, _) if !scope.is_empty() => {
                let evaluator = Evaluator::new(&*self.context, scope, true);
                if let Ok(found) = evaluator.resolve(&call(key, args.clone())) {
                    return Ok(found);
                }
            }
            _ => {}
        }

        path.push(PathSegment::Key(key.to_string()));
        let args = self.value(args, scope, path)?;
        path.pop();

        if kind == IntrinsicKind::ToJsonString && !contains_function(&args) {
            return Ok(Value::String(args.to_json_string()));
        }

        Ok(call(key, args))
    }

    /// `Fn::Sub` arguments with bound loop variables substituted
    fn sub(
        &mut self,
        args: &Value,
        scope: &Scope<'_>,
        path: &mut Path,
    ) -> Result<Value, Diagnostic> {
        match args {
            Value::String(text) => Ok(Value::String(substitute_text(text, scope, None))),
            Value::Array(parts) => match parts.as_slice() {
                [Value::String(text), Value::Object(variables)] => {
                    path.push(PathSegment::Index(1));
                    let expanded_variables = self.object(variables, scope, path)?;
                    path.pop();
                    Ok(Value::Array(vec![
                        Value::String(substitute_text(text, scope, Some(variables))),
                        expanded_variables,
                    ]))
                }
                _ => self.value(args, scope, path),
            },
            _ => self.value(args, scope, path),
        }
    }

    fn for_each(
        &mut self,
        block: &Value,
        scope: &Scope<'_>,
        path: &mut Path,
    ) -> Result<Vec<(String, Value)>, Diagnostic> {
        let malformed = |kind: DiagnosticKind, path: &Path| Diagnostic {
            kind,
            path: path.clone(),
            node: block.clone(),
        };

        let Value::Array(parts) = block else {
            return Err(malformed(DiagnosticKind::ForEachNotList, &*path));
        };
        let [variable, collection, body] = parts.as_slice() else {
            return Err(malformed(DiagnosticKind::ForEachArity(parts.len()), &*path));
        };
        let Value::String(variable) = variable else {
            return Err(malformed(DiagnosticKind::LoopVariableNotString, &*path));
        };
        let Value::Object(body) = body else {
            return Err(malformed(DiagnosticKind::OutputNotMapping, &*path));
        };

        let items = self.collection(collection, scope, path)?;

        tracing::trace!(%variable, items = items.len(), "unrolling Fn::ForEach");

        let mut entries = vec![];
        path.push(PathSegment::Index(2));
        for item in items {
            let mut iteration = scope.child();
            iteration.bind(variable.clone(), item);

            let Value::Object(expanded) = self.object(body, &iteration, path)? else {
                path.pop();
                return Err(malformed(DiagnosticKind::OutputNotMapping, &*path));
            };
            entries.extend(expanded);
        }
        path.pop();

        Ok(entries)
    }

    /// Items a loop iterates over
    fn collection(
        &mut self,
        collection: &Value,
        scope: &Scope<'_>,
        path: &Path,
    ) -> Result<Vec<Value>, Diagnostic> {
        let not_a_list = || Diagnostic {
            kind: DiagnosticKind::CollectionNotList,
            path: path.clone(),
            node: collection.clone(),
        };

        match collection {
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    let value = Evaluator::new(&*self.context, scope, false).resolve(item);
                    match value {
                        Ok(Value::Null) => {}
                        Ok(value) => resolved.push(value),
                        Err(unresolved) => {
                            tracing::trace!(%unresolved, "collection item replaced by placeholder");
                            let placeholders = self.context.cache.placeholders(item);
                            resolved.extend(placeholders.into_iter().take(1));
                        }
                    }
                }
                Ok(resolved)
            }
            Value::Object(_) if function_call(collection).is_some() => {
                let value = Evaluator::new(&*self.context, scope, false).resolve(collection);
                match value {
                    Ok(Value::Array(items)) => Ok(items),
                    Ok(_) => Err(not_a_list()),
                    Err(unresolved) => {
                        tracing::trace!(%unresolved, "collection replaced by placeholders");
                        Ok(self.context.cache.placeholders(collection))
                    }
                }
            }
            _ => Err(not_a_list()),
        }
    }
}

fn call(key: &str, args: Value) -> Value {
    Value::Object(Map::from_iter([(key.to_string(), args)]))
}

fn insert_unique(
    output: &mut Map,
    key: String,
    value: Value,
    path: &Path,
    source_key: &str,
    source: &Value,
) -> Result<(), Diagnostic> {
    if output.contains_key(&key) {
        tracing::debug!(%key, "duplicate key");
        let mut path = path.clone();
        path.push(PathSegment::Key(source_key.to_string()));
        return Err(Diagnostic {
            kind: DiagnosticKind::DuplicateKey(key),
            path,
            node: source.clone(),
        });
    }
    output.insert(key, value);
    Ok(())
}

fn substitute_key(key: &str, scope: &Scope<'_>) -> String {
    if scope.is_empty() {
        return key.to_string();
    }
    sub::substitute(key, |name| scope.get(name).cloned()).text
}

/// Substitutes loop variables, skipping names the `Fn::Sub` variable map defines itself
fn substitute_text(text: &str, scope: &Scope<'_>, variables: Option<&Map>) -> String {
    sub::substitute_dollar(text, |name| {
        if variables.is_some_and(|variables| variables.contains_key(name)) {
            return None;
        }
        scope.get(name).cloned()
    })
    .text
}

fn contains_function(value: &Value) -> bool {
    if function_call(value).is_some() {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(contains_function),
        Value::Object(object) => object
            .iter()
            .any(|(key, item)| IntrinsicKind::parse(key).is_some() || contains_function(item)),
        _ => false,
    }
}
