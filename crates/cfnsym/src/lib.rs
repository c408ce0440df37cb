//! # cfnsym - symbolic evaluation of infrastructure templates
//!
//! Figures out which values a template can produce without deploying it: which branches of
//! conditional logic are reachable and what loop macros expand to.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `cfnsym` works internally.
//!
//! ### Template terms
//!
//! Quick introduction to terms used to describe elements of templates.
//!
//! - a template is a tree of mappings, sequences and scalars ([value::Value])
//! - a location in that tree is a [value::Path] of keys and indices
//! - an intrinsic function is a mapping with exactly one reserved key, e.g. `{"Ref": "Env"}`
//! - `Conditions` holds named boolean expressions over parameters
//! - a ternary is `{"Fn::If": [condition, if_true, if_false]}`
//! - `{"Ref": "AWS::NoValue"}` means "this property does not exist"
//! - a loop macro is a key `Fn::ForEach::<Name>` holding `[identifier, collection, output]`
//!
//! This is a (small) valid template:
//! ```yaml
//! Transform: AWS::LanguageExtensions
//! Conditions:
//!   IsProd: {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
//! Resources:
//!   Fn::ForEach::Topics:
//!     - Name
//!     - [Alerts, Events]
//!     - Topic${Name}:
//!         Type: AWS::SNS::Topic
//!         Properties:
//!           TopicName:
//!             Fn::If: [IsProd, "${Name}", {"Ref": "AWS::NoValue"}]
//! ```
//!
//! ### Loading files
//!
//! Decoding is done by [serde_json] and [serde_yaml]. The result is converted into a
//! [value::Value] tree (mapping order is preserved) and wrapped in a [template::Template] which
//! remembers where it was loaded from.
//!
//! ### Macro expansion
//!
//! see [transform::expand]
//!
//! The expander builds a new tree bottom-up. At every mapping the loop macros are unrolled
//! first, then the literal keys are copied. While a loop body is expanded its identifier is
//! bound in a [transform::bindings::Scope], which is consulted for `${Name}` / `&{Name}`
//! placeholders in keys and `Fn::Sub` strings, and for `Ref`.
//!
//! Collections are resolved by the partial evaluator ([transform::evaluate::Evaluator]).
//! It knows pseudo-parameters, parameter defaults, mappings and a handful of functions. Anything
//! depending on deploy-time state is [transform::evaluate::Unresolved]; an unresolved
//! collection is replaced by placeholders which stay the same for the whole pass.
//!
//! Structural mistakes (e.g. a loop without output mapping, or two iterations producing the same
//! key) abort the expansion with a [transform::Diagnostic].
//!
//! ### Conditions and scenarios
//!
//! A scenario is one consistent true/false assignment to a set of conditions.
//!
//! **Example**
//!
//! ```yaml
//! Conditions:
//!   IsProd: {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
//!   IsDev: {"Fn::Equals": [{"Ref": "Env"}, "dev"]}
//! ```
//!
//! **Scenarios** for `{IsProd: {true, false}, IsDev: {true, false}}`
//!
//! | **IsProd** | **IsDev** |
//! |------------|-----------|
//! | `true`     | `false`   |
//! | `false`    | `true`    |
//! | `false`    | `false`   |
//!
//! `Env` can not equal two different strings, so both conditions being `true` is pruned.
//!
//! Conditions are indexed by [conditions::ConditionIndex], which also implements
//! [conditions::ScenarioBuilder]. Queries about locations ("what gates this path", "what shapes
//! can this property take") are answered by [conditions::Analysis].
//!
//! ### Output
//!
//! Everything the crate returns implements [serde::Serialize].
//!
pub mod conditions;
pub mod settings;
pub mod template;
pub mod transform;
pub mod value;
mod visit;
