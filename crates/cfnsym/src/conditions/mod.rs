//! Condition Index and scenario enumeration
//!
//! Named conditions (the `Conditions` section) are parsed into [ConditionExpr] trees and stored
//! in a [ConditionIndex]. A [Scenario] is one complete true/false assignment to a set of
//! condition names. Turning partial constraints into scenarios is done through the
//! [ScenarioBuilder] trait; [ConditionIndex] implements it with the solver in [solver].
//!
//! Path based queries (which conditions gate a location, which shapes a conditional value can
//! take) live in [paths::Analysis].
pub mod expr;
pub mod paths;
pub mod solver;

pub use expr::{ConditionExpr, Operand};
pub use paths::{Analysis, Flattened};

use crate::settings::Settings;
use crate::template::Template;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// Condition name → boolean values the condition may take at some location
pub type ConditionConstraints = IndexMap<String, BTreeSet<bool>>;

/// One complete, self-consistent assignment of condition names to booleans
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Scenario(IndexMap<String, bool>);

impl Scenario {
    pub fn get(&self, condition: &str) -> Option<bool> {
        self.0.get(condition).copied()
    }

    pub fn insert(&mut self, condition: impl Into<String>, value: bool) {
        self.0.insert(condition.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for Scenario {
    fn from_iter<T: IntoIterator<Item = (S, bool)>>(iter: T) -> Self {
        Scenario(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ScenarioError {
    #[error("condition {0} is defined in terms of itself")]
    Cycle(String),
}

/// Expands partial condition constraints into complete scenarios
pub trait ScenarioBuilder {
    /// All satisfiable total assignments to the names in `constraints`, where each name only
    /// takes values from its constraint set
    fn build_scenarios(
        &self,
        constraints: &ConditionConstraints,
        region: Option<&str>,
    ) -> Result<Vec<Scenario>, ScenarioError>;

    /// Whether every assignment consistent with `scenario` makes `target` true
    fn check_implies(&self, scenario: &Scenario, target: &str) -> bool;
}

/// Named conditions of one template
#[derive(Debug, Clone)]
pub struct ConditionIndex {
    conditions: IndexMap<String, ConditionExpr>,
    /// parameter name → `AllowedValues`
    allowed_values: HashMap<String, Vec<String>>,
    max_scenarios: usize,
}

impl ConditionIndex {
    pub fn new(template: &Template, settings: &Settings) -> Self {
        let conditions: IndexMap<String, ConditionExpr> = template
            .conditions()
            .map(|conditions| {
                conditions
                    .iter()
                    .map(|(name, expr)| (name.clone(), ConditionExpr::parse(expr)))
                    .collect()
            })
            .unwrap_or_default();

        let allowed_values = template
            .parameters()
            .map(|parameters| {
                parameters
                    .iter()
                    .filter_map(|(name, parameter)| {
                        let allowed = parameter.get("AllowedValues")?.as_array()?;
                        let allowed = allowed
                            .iter()
                            .map(Value::to_scalar_string)
                            .collect::<Option<Vec<_>>>()?;
                        Some((name.clone(), allowed))
                    })
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(conditions = conditions.len(), "condition index built");

        Self {
            conditions,
            allowed_values,
            max_scenarios: settings.max_scenarios,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConditionExpr> {
        self.conditions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    pub fn allowed_values(&self, parameter: &str) -> Option<&[String]> {
        self.allowed_values.get(parameter).map(Vec::as_slice)
    }

    pub fn max_scenarios(&self) -> usize {
        self.max_scenarios
    }
}

impl ScenarioBuilder for ConditionIndex {
    fn build_scenarios(
        &self,
        constraints: &ConditionConstraints,
        region: Option<&str>,
    ) -> Result<Vec<Scenario>, ScenarioError> {
        solver::Solver::new(self, region).enumerate(constraints, self.max_scenarios)
    }

    fn check_implies(&self, scenario: &Scenario, target: &str) -> bool {
        solver::Solver::new(self, None).implies(scenario, target)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template;
    use pretty_assertions::assert_eq;

    pub(crate) fn constraints(entries: &[(&str, &[bool])]) -> ConditionConstraints {
        entries
            .iter()
            .map(|(name, values)| (name.to_string(), values.iter().copied().collect()))
            .collect()
    }

    fn index_for(template: &Template) -> ConditionIndex {
        ConditionIndex::new(template, &Settings::default())
    }

    #[test]
    fn parses_conditions_and_allowed_values() {
        let template = template! {r#"
        Parameters:
          Env:
            Type: String
            AllowedValues: [dev, prod]
          Free:
            Type: String
        Conditions:
          IsProd: {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
          IsDev: {"Fn::Not": [{"Condition": "IsProd"}]}
        "#};
        let index = index_for(&template);

        assert_eq!(index.names().collect::<Vec<_>>(), vec!["IsProd", "IsDev"]);
        assert_eq!(
            index.allowed_values("Env"),
            Some(["dev".to_string(), "prod".to_string()].as_slice())
        );
        assert_eq!(index.allowed_values("Free"), None);
    }

    #[test]
    fn independent_conditions_enumerate_all_combinations() {
        let template = template! {r#"
        Conditions:
          A: {"Fn::Equals": [{"Ref": "One"}, "x"]}
          B: {"Fn::Equals": [{"Ref": "Two"}, "y"]}
        "#};
        let index = index_for(&template);

        let scenarios = index
            .build_scenarios(&constraints(&[("A", &[true, false]), ("B", &[true, false])]), None)
            .expect("no cycles");

        assert_eq!(
            scenarios,
            vec![
                Scenario::from_iter([("A", true), ("B", true)]),
                Scenario::from_iter([("A", true), ("B", false)]),
                Scenario::from_iter([("A", false), ("B", true)]),
                Scenario::from_iter([("A", false), ("B", false)]),
            ]
        );
    }

    #[test]
    fn contradicting_conditions_are_pruned() {
        let template = template! {r#"
        Conditions:
          IsProd: {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
          IsNotProd: {"Fn::Not": [{"Condition": "IsProd"}]}
        "#};
        let index = index_for(&template);

        let scenarios = index
            .build_scenarios(
                &constraints(&[("IsProd", &[true, false]), ("IsNotProd", &[true, false])]),
                None,
            )
            .expect("no cycles");

        assert_eq!(
            scenarios,
            vec![
                Scenario::from_iter([("IsProd", true), ("IsNotProd", false)]),
                Scenario::from_iter([("IsProd", false), ("IsNotProd", true)]),
            ]
        );
    }

    #[test]
    fn same_parameter_different_values_exclude_each_other() {
        let template = template! {r#"
        Conditions:
          IsProd: {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
          IsDev: {"Fn::Equals": ["dev", {"Ref": "Env"}]}
        "#};
        let index = index_for(&template);

        let scenarios = index
            .build_scenarios(
                &constraints(&[("IsProd", &[true, false]), ("IsDev", &[true, false])]),
                None,
            )
            .expect("no cycles");

        assert_eq!(scenarios.len(), 3);
        assert!(!scenarios.contains(&Scenario::from_iter([("IsProd", true), ("IsDev", true)])));
    }

    #[test]
    fn allowed_values_must_cover_one_branch() {
        let template = template! {r#"
        Parameters:
          Env:
            Type: String
            AllowedValues: [dev, prod]
        Conditions:
          IsProd: {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
          IsDev: {"Fn::Equals": [{"Ref": "Env"}, "dev"]}
          IsTest: {"Fn::Equals": [{"Ref": "Env"}, "test"]}
        "#};
        let index = index_for(&template);

        let scenarios = index
            .build_scenarios(
                &constraints(&[("IsProd", &[true, false]), ("IsDev", &[true, false])]),
                None,
            )
            .expect("no cycles");
        assert_eq!(
            scenarios,
            vec![
                Scenario::from_iter([("IsProd", true), ("IsDev", false)]),
                Scenario::from_iter([("IsProd", false), ("IsDev", true)]),
            ]
        );

        // "test" is not an allowed value, so the condition can never hold
        let scenarios = index
            .build_scenarios(&constraints(&[("IsTest", &[true, false])]), None)
            .expect("no cycles");
        assert_eq!(scenarios, vec![Scenario::from_iter([("IsTest", false)])]);
    }

    #[test]
    fn region_equality_is_constant_when_region_is_known() {
        let template = template! {r#"
        Conditions:
          InVirginia: {"Fn::Equals": [{"Ref": "AWS::Region"}, "us-east-1"]}
        "#};
        let index = index_for(&template);
        let all = constraints(&[("InVirginia", &[true, false])]);

        assert_eq!(
            index.build_scenarios(&all, Some("us-east-1")),
            Ok(vec![Scenario::from_iter([("InVirginia", true)])])
        );
        assert_eq!(
            index.build_scenarios(&all, Some("eu-west-1")),
            Ok(vec![Scenario::from_iter([("InVirginia", false)])])
        );
        assert_eq!(index.build_scenarios(&all, None).map(|s| s.len()), Ok(2));
    }

    #[test]
    fn cyclic_conditions_are_reported() {
        let template = template! {r#"
        Conditions:
          A: {"Fn::Not": [{"Condition": "B"}]}
          B: {"Fn::And": [{"Condition": "A"}, {"Condition": "A"}]}
        "#};
        let index = index_for(&template);

        assert_eq!(
            index.build_scenarios(&constraints(&[("A", &[true, false])]), None),
            Err(ScenarioError::Cycle("A".to_string()))
        );
    }

    #[test]
    fn implication_through_and() {
        let template = template! {r#"
        Conditions:
          IsPrimary: {"Fn::Equals": [{"Ref": "Role"}, "primary"]}
          IsProd: {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
          IsPrimaryProd: {"Fn::And": [{"Condition": "IsPrimary"}, {"Condition": "IsProd"}]}
        "#};
        let index = index_for(&template);

        assert!(index.check_implies(&Scenario::from_iter([("IsPrimaryProd", true)]), "IsPrimary"));
        assert!(!index.check_implies(&Scenario::from_iter([("IsProd", true)]), "IsPrimary"));
        assert!(index.check_implies(&Scenario::from_iter([("IsPrimary", true)]), "IsPrimary"));
        assert!(!index.check_implies(&Scenario::default(), "IsPrimary"));
    }

    #[test]
    fn unknown_conditions_are_free() {
        let index = index_for(&template!(r#"{}"#));

        let scenarios = index
            .build_scenarios(&constraints(&[("c", &[true, false])]), None)
            .expect("no cycles");

        assert_eq!(
            scenarios,
            vec![
                Scenario::from_iter([("c", true)]),
                Scenario::from_iter([("c", false)]),
            ]
        );
    }

    #[test]
    fn enumeration_stops_at_the_cap() {
        let template = template!(r#"{}"#);
        let index = ConditionIndex::new(
            &template,
            &Settings {
                max_scenarios: 3,
                ..Default::default()
            },
        );

        let scenarios = index
            .build_scenarios(
                &constraints(&[
                    ("a", &[true, false]),
                    ("b", &[true, false]),
                    ("c", &[true, false]),
                ]),
                None,
            )
            .expect("no cycles");
        assert_eq!(scenarios.len(), 3);
    }
}
