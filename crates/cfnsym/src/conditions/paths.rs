//! Path based condition queries
//!
//! [Analysis] answers, for one template:
//! - which conditions gate a location ([Analysis::conditions_along_path])
//! - which scenarios decide every ternary below a location ([Analysis::scenarios_below_path])
//! - which shapes a conditional value takes ([Analysis::flatten_under_conditions])
//! - whether a reference to a guarded resource can dangle ([Analysis::is_guarded_elsewhere])
//!
//! All queries are total: malformed ternaries or guards, missing keys and cyclic conditions
//! degrade to "no constraint" or "no scenario".
use super::{ConditionConstraints, Scenario, ScenarioBuilder};
use crate::template::{Template, CONDITION_ATTRIBUTE, OUTPUTS, RESOURCES};
use crate::transform::intrinsic::{function_call, is_no_value, IntrinsicKind};
use crate::value::{Path, PathSegment, Value};
use crate::visit::{Ternary, TernarySite, VisitTernaries};
use std::collections::{BTreeSet, HashMap};

const IF_KEY: &str = "Fn::If";

/// One possible shape of a conditional value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Flattened {
    /// `None` when the value did not contain any ternary
    pub scenario: Option<Scenario>,
    pub value: Value,
}

/// Per-template condition analysis
///
/// Holds memoized path lookups, so one instance must not be shared between templates.
#[derive(derive_new::new)]
pub struct Analysis<'t> {
    template: &'t Template,
    builder: &'t dyn ScenarioBuilder,
    /// region that makes `AWS::Region` comparisons constant
    region: Option<String>,
    #[new(default)]
    path_cache: HashMap<(Path, bool, bool), ConditionConstraints>,
}

impl<'t> Analysis<'t> {
    /// Conditions that must hold (with their possible values) to reach `path`
    ///
    /// - a ternary on the way records `true` for branch 1, `false` for branch 2 and both
    ///   otherwise
    /// - with `only_deepest`, only the ternary closest to the end of `path` is recorded
    /// - a path inside `Resources.<name>` or `Outputs.<name>` records the entity's guard
    ///   condition as `true`
    pub fn conditions_along_path(
        &mut self,
        path: &[PathSegment],
        include_conditions_inside_functions: bool,
        only_deepest: bool,
    ) -> ConditionConstraints {
        let key = (
            path.to_vec(),
            include_conditions_inside_functions,
            only_deepest,
        );
        if let Some(constraints) = self.path_cache.get(&key) {
            return constraints.clone();
        }

        let constraints =
            self.walk_path(path, include_conditions_inside_functions, only_deepest);
        tracing::trace!(?path, ?constraints, "conditions along path");
        self.path_cache.insert(key, constraints.clone());
        constraints
    }

    fn walk_path(
        &self,
        path: &[PathSegment],
        include_conditions_inside_functions: bool,
        only_deepest: bool,
    ) -> ConditionConstraints {
        let mut constraints = ConditionConstraints::new();
        if let Some(guard) = self.guard_of(path) {
            constraints.entry(guard.to_string()).or_default().insert(true);
        }

        let mut branches = ConditionConstraints::new();
        let mut current = Some(self.template.root());
        let mut inside_function = false;

        for (depth, segment) in path.iter().enumerate() {
            let Some(value) = current else {
                break;
            };

            if let Some(ternary) = Ternary::parse(value) {
                if include_conditions_inside_functions || !inside_function {
                    let taken = match path.get(depth + 1) {
                        Some(PathSegment::Index(1)) if segment.as_key() == Some(IF_KEY) => {
                            BTreeSet::from([true])
                        }
                        Some(PathSegment::Index(2)) if segment.as_key() == Some(IF_KEY) => {
                            BTreeSet::from([false])
                        }
                        _ => BTreeSet::from([true, false]),
                    };
                    if only_deepest {
                        branches.clear();
                    }
                    branches
                        .entry(ternary.condition.to_string())
                        .or_default()
                        .extend(taken);
                }
            } else if matches!(function_call(value), Some((kind, _)) if kind != IntrinsicKind::If) {
                inside_function = true;
            }

            current = value.lookup(std::slice::from_ref(segment));
        }

        for (name, values) in branches {
            constraints.entry(name).or_default().extend(values);
        }
        constraints
    }

    /// Guard condition of the resource or output `path` points into
    fn guard_of(&self, path: &[PathSegment]) -> Option<&'t str> {
        let [section, name, ..] = path else {
            return None;
        };
        let section = section.as_key().filter(|s| *s == RESOURCES || *s == OUTPUTS)?;

        let template = self.template;
        template
            .root()
            .get(section)?
            .get(name.as_key()?)?
            .get(CONDITION_ATTRIBUTE)?
            .as_str()
    }

    /// Scenarios deciding every ternary found under `path`
    ///
    /// Conditions gating `path` itself keep the values they are restricted to. Empty when
    /// there is no ternary below `path` or the conditions are cyclic.
    pub fn scenarios_below_path(
        &mut self,
        path: &[PathSegment],
        include_conditions_inside_functions: bool,
        region: Option<&str>,
    ) -> Vec<Scenario> {
        let template = self.template;
        let Some(subtree) = template.root().lookup(path) else {
            return vec![];
        };

        let mut constraints =
            self.conditions_along_path(path, include_conditions_inside_functions, false);
        if !collect_ternaries(subtree, include_conditions_inside_functions, &mut constraints) {
            return vec![];
        }

        self.build(&constraints, region)
    }

    /// Every shape `subtree` can take, one entry per scenario
    ///
    /// Ternaries are replaced by the branch the scenario selects and `AWS::NoValue` entries are
    /// removed. A scenario under which the whole value is absent, or a mapping loses all its
    /// keys, contributes no entry. Lists keep their (possibly empty) shape.
    pub fn flatten_under_conditions(&self, subtree: &Value) -> Vec<Flattened> {
        self.flatten(subtree, false)
    }

    /// Like [Analysis::flatten_under_conditions], but emptied mappings are kept
    pub fn flatten_preserving_shape(&self, subtree: &Value) -> Vec<Flattened> {
        self.flatten(subtree, true)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn flatten(&self, subtree: &Value, preserve_shape: bool) -> Vec<Flattened> {
        let mut constraints = ConditionConstraints::new();
        if !collect_ternaries(subtree, true, &mut constraints) {
            return vec![Flattened {
                scenario: None,
                value: subtree.clone(),
            }];
        }

        self.build(&constraints, self.region.as_deref())
            .into_iter()
            .filter_map(|scenario| {
                let value = match resolve(subtree, &scenario) {
                    None => {
                        tracing::trace!(?scenario, "value absent in scenario");
                        return None;
                    }
                    Some(Value::Object(object)) if object.is_empty() && !preserve_shape => {
                        tracing::trace!(?scenario, "mapping empty in scenario");
                        return None;
                    }
                    Some(value) => value,
                };
                Some(Flattened {
                    scenario: Some(scenario),
                    value,
                })
            })
            .collect()
    }

    /// Scenarios in which `path` is reachable while `entity`'s guard condition is false
    ///
    /// Empty when the reference is always safe.
    pub fn is_guarded_elsewhere(&mut self, path: &[PathSegment], entity: &str) -> Vec<Scenario> {
        let template = self.template;
        let Some(guard) = template.resource_condition(entity) else {
            return vec![];
        };

        let constraints = self.conditions_along_path(path, true, false);
        let mut scenario: Scenario = constraints
            .iter()
            .filter(|(name, _)| name.as_str() != guard)
            .filter_map(|(name, values)| match values.len() {
                1 => values.first().map(|value| (name.as_str(), *value)),
                _ => None,
            })
            .collect();

        let guarded = match constraints.get(guard) {
            Some(values) if values.len() == 1 => values.contains(&true),
            None if scenario.is_empty() => false,
            _ => self.builder.check_implies(&scenario, guard),
        };
        if guarded {
            return vec![];
        }

        tracing::debug!(?path, %entity, %guard, "reference may dangle");
        scenario.insert(guard, false);
        vec![scenario]
    }

    fn build(&self, constraints: &ConditionConstraints, region: Option<&str>) -> Vec<Scenario> {
        match self.builder.build_scenarios(constraints, region) {
            Ok(scenarios) => scenarios,
            Err(err) => {
                tracing::debug!(%err, "no scenarios");
                vec![]
            }
        }
    }
}

/// Adds every ternary condition below `value` that is not restricted yet; `false` when there
/// is none
fn collect_ternaries(
    value: &Value,
    include_conditions_inside_functions: bool,
    constraints: &mut ConditionConstraints,
) -> bool {
    let mut found = false;
    value.visit_ternaries(&mut |site: TernarySite<'_>| {
        if site.inside_function && !include_conditions_inside_functions {
            return;
        }
        found = true;
        constraints
            .entry(site.ternary.condition.to_string())
            .or_insert_with(|| BTreeSet::from([true, false]));
    });
    found
}

/// `value` under `scenario`; `None` if it is absent
fn resolve(value: &Value, scenario: &Scenario) -> Option<Value> {
    if let Some(ternary) = Ternary::parse(value) {
        return match scenario.get(ternary.condition) {
            Some(choice) => resolve(ternary.branch(choice), scenario),
            None => Some(value.clone()),
        };
    }
    if is_no_value(value) {
        return None;
    }

    Some(match value {
        Value::Object(object) => Value::Object(
            object
                .iter()
                .filter_map(|(key, child)| Some((key.clone(), resolve(child, scenario)?)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| resolve(item, scenario))
                .collect(),
        ),
        scalar => scalar.clone(),
    })
}
