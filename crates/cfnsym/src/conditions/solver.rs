//! default scenario builder
//!
//! Every named condition is compiled into a [Formula] over boolean atoms. An atom is either an
//! `Fn::Equals` comparison (normalised so operand order does not matter), a condition name the
//! index does not know, or an opaque expression.
//!
//! Extra knowledge about atoms:
//! - `Ref P == a` and `Ref P == b` with `a != b` can not both hold
//! - with `AllowedValues` for `P`, a literal outside of them never matches, and if every
//!   allowed value has an atom, one of them must hold
//! - with a known region, comparisons against `AWS::Region` are constant
//!
//! Satisfiability is decided by backtracking over the atoms that occur in the constraints,
//! evaluating formulas with three-valued logic so that partial assignments prune early.
use super::{
    ConditionConstraints, ConditionExpr, ConditionIndex, Operand, Scenario, ScenarioError,
};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

const REGION_PSEUDO_PARAMETER: &str = "AWS::Region";

#[derive(Debug, Clone)]
pub(crate) enum Formula {
    Const(bool),
    Atom(usize),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    /// Three-valued evaluation; `None` when unassigned atoms decide the result
    fn eval(&self, assignment: &[Option<bool>]) -> Option<bool> {
        match self {
            Formula::Const(value) => Some(*value),
            Formula::Atom(atom) => assignment[*atom],
            Formula::Not(inner) => inner.eval(assignment).map(|value| !value),
            Formula::And(operands) => {
                let mut result = Some(true);
                for operand in operands {
                    match operand.eval(assignment) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Formula::Or(operands) => {
                let mut result = Some(false);
                for operand in operands {
                    match operand.eval(assignment) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
        }
    }

    fn collect_atoms(&self, atoms: &mut BTreeSet<usize>) {
        match self {
            Formula::Const(_) => {}
            Formula::Atom(atom) => {
                atoms.insert(*atom);
            }
            Formula::Not(inner) => inner.collect_atoms(atoms),
            Formula::And(operands) | Formula::Or(operands) => {
                for operand in operands {
                    operand.collect_atoms(atoms);
                }
            }
        }
    }
}

#[derive(Debug)]
struct Atom {
    /// `(parameter, literal)` for `Ref parameter == literal` comparisons
    equals: Option<(String, String)>,
}

pub(crate) struct Solver<'i> {
    index: &'i ConditionIndex,
    region: Option<&'i str>,
    atom_ids: HashMap<String, usize>,
    atoms: Vec<Atom>,
    compiled: HashMap<String, Formula>,
}

impl<'i> Solver<'i> {
    pub(crate) fn new(index: &'i ConditionIndex, region: Option<&'i str>) -> Self {
        Self {
            index,
            region,
            atom_ids: Default::default(),
            atoms: Default::default(),
            compiled: Default::default(),
        }
    }

    /// Enumerates satisfiable scenarios, at most `limit` of them
    pub(crate) fn enumerate(
        mut self,
        constraints: &ConditionConstraints,
        limit: usize,
    ) -> Result<Vec<Scenario>, ScenarioError> {
        let mut choices = Vec::with_capacity(constraints.len());
        for (name, values) in constraints {
            let formula = self.compile_condition(name, &mut vec![])?;
            choices.push((name.as_str(), formula, values));
        }

        let mut scenarios = vec![];
        let mut partial: Vec<(Formula, bool)> = vec![];
        self.enumerate_from(&choices, &mut partial, limit, &mut scenarios);

        tracing::trace!(
            conditions = constraints.len(),
            scenarios = scenarios.len(),
            "scenarios enumerated"
        );
        Ok(scenarios)
    }

    fn enumerate_from(
        &self,
        choices: &[(&str, Formula, &BTreeSet<bool>)],
        partial: &mut Vec<(Formula, bool)>,
        limit: usize,
        scenarios: &mut Vec<Scenario>,
    ) {
        let depth = partial.len();
        if depth == choices.len() {
            if scenarios.len() >= limit {
                tracing::debug!(limit, "scenario limit reached");
                return;
            }
            scenarios.push(
                choices
                    .iter()
                    .zip(partial.iter())
                    .map(|((name, _, _), (_, value))| (*name, *value))
                    .collect(),
            );
            return;
        }

        let (name, formula, values) = &choices[depth];
        // true before false
        for value in values.iter().rev() {
            partial.push((formula.clone(), *value));
            if self.satisfiable(partial) {
                self.enumerate_from(choices, partial, limit, scenarios);
            } else {
                tracing::trace!(condition = %name, value, "branch pruned");
            }
            partial.pop();

            if scenarios.len() >= limit {
                return;
            }
        }
    }

    /// Whether every consistent completion of `scenario` makes `target` true
    pub(crate) fn implies(mut self, scenario: &Scenario, target: &str) -> bool {
        if let Some(value) = scenario.get(target) {
            return value;
        }

        let mut constraints = vec![];
        for (name, value) in scenario.iter() {
            match self.compile_condition(name, &mut vec![]) {
                Ok(formula) => constraints.push((formula, value)),
                Err(err) => {
                    tracing::debug!(%err, "implication check on cyclic condition");
                    return false;
                }
            }
        }

        match self.compile_condition(target, &mut vec![]) {
            Ok(formula) => constraints.push((formula, false)),
            Err(err) => {
                tracing::debug!(%err, "implication check on cyclic condition");
                return false;
            }
        }

        !self.satisfiable(&constraints)
    }

    fn compile_condition(
        &mut self,
        name: &str,
        stack: &mut Vec<String>,
    ) -> Result<Formula, ScenarioError> {
        if let Some(formula) = self.compiled.get(name) {
            return Ok(formula.clone());
        }

        if stack.iter().any(|entry| entry == name) {
            return Err(ScenarioError::Cycle(name.to_string()));
        }

        let index = self.index;
        let formula = match index.get(name) {
            None => Formula::Atom(self.atom(format!("condition:{name}"), None)),
            Some(expr) => {
                stack.push(name.to_string());
                let formula = self.compile_expr(expr, stack);
                stack.pop();
                formula?
            }
        };

        self.compiled.insert(name.to_string(), formula.clone());
        Ok(formula)
    }

    fn compile_expr(
        &mut self,
        expr: &ConditionExpr,
        stack: &mut Vec<String>,
    ) -> Result<Formula, ScenarioError> {
        Ok(match expr {
            ConditionExpr::Equals(left, right) => self.compile_equals(left, right),
            ConditionExpr::And(operands) => Formula::And(
                operands
                    .iter()
                    .map(|operand| self.compile_expr(operand, stack))
                    .collect::<Result<_, _>>()?,
            ),
            ConditionExpr::Or(operands) => Formula::Or(
                operands
                    .iter()
                    .map(|operand| self.compile_expr(operand, stack))
                    .collect::<Result<_, _>>()?,
            ),
            ConditionExpr::Not(operand) => {
                Formula::Not(Box::new(self.compile_expr(operand, stack)?))
            }
            ConditionExpr::Condition(name) => self.compile_condition(name, stack)?,
            ConditionExpr::Opaque(digest) => {
                Formula::Atom(self.atom(format!("opaque:{digest}"), None))
            }
        })
    }

    fn compile_equals(&mut self, left: &Operand, right: &Operand) -> Formula {
        match (left, right) {
            (Operand::Literal(left), Operand::Literal(right)) => Formula::Const(left == right),
            (Operand::Ref(left), Operand::Ref(right)) if left == right => Formula::Const(true),
            (Operand::Ref(parameter), Operand::Literal(literal))
            | (Operand::Literal(literal), Operand::Ref(parameter)) => {
                if parameter == REGION_PSEUDO_PARAMETER {
                    if let Some(region) = self.region {
                        return Formula::Const(region == literal);
                    }
                }

                if let Some(allowed) = self.index.allowed_values(parameter) {
                    if !allowed.contains(literal) {
                        return Formula::Const(false);
                    }
                }

                Formula::Atom(self.atom(
                    format!("equals:{parameter}={literal}"),
                    Some((parameter.clone(), literal.clone())),
                ))
            }
            (left, right) => {
                let mut keys = [left.key(), right.key()];
                keys.sort();
                Formula::Atom(self.atom(format!("equals:{}={}", keys[0], keys[1]), None))
            }
        }
    }

    fn atom(&mut self, key: String, equals: Option<(String, String)>) -> usize {
        if let Some(id) = self.atom_ids.get(&key) {
            return *id;
        }

        let id = self.atoms.len();
        self.atoms.push(Atom { equals });
        self.atom_ids.insert(key, id);
        id
    }

    fn satisfiable(&self, constraints: &[(Formula, bool)]) -> bool {
        let mut relevant = BTreeSet::new();
        for (formula, _) in constraints {
            formula.collect_atoms(&mut relevant);
        }
        let relevant: Vec<usize> = relevant.into_iter().collect();

        // parameter -> atoms comparing it against a literal
        let mut by_parameter: IndexMap<&str, Vec<(usize, &str)>> = IndexMap::new();
        for atom in &relevant {
            if let Some((parameter, literal)) = &self.atoms[*atom].equals {
                by_parameter
                    .entry(parameter.as_str())
                    .or_default()
                    .push((*atom, literal.as_str()));
            }
        }

        let mut assignment = vec![None; self.atoms.len()];
        self.search(constraints, &relevant, &by_parameter, &mut assignment, 0)
    }

    fn search(
        &self,
        constraints: &[(Formula, bool)],
        relevant: &[usize],
        by_parameter: &IndexMap<&str, Vec<(usize, &str)>>,
        assignment: &mut Vec<Option<bool>>,
        next: usize,
    ) -> bool {
        if !self.parameters_consistent(by_parameter, assignment) {
            return false;
        }

        let mut decided = true;
        for (formula, wanted) in constraints {
            match formula.eval(assignment) {
                Some(value) if value != *wanted => return false,
                Some(_) => {}
                None => decided = false,
            }
        }
        if decided {
            return true;
        }

        let Some(atom) = relevant.get(next).copied() else {
            return false;
        };

        for value in [true, false] {
            assignment[atom] = Some(value);
            if self.search(constraints, relevant, by_parameter, assignment, next + 1) {
                assignment[atom] = None;
                return true;
            }
        }
        assignment[atom] = None;
        false
    }

    fn parameters_consistent(
        &self,
        by_parameter: &IndexMap<&str, Vec<(usize, &str)>>,
        assignment: &[Option<bool>],
    ) -> bool {
        for (parameter, atoms) in by_parameter {
            let matched = atoms
                .iter()
                .filter(|(atom, _)| assignment[*atom] == Some(true))
                .count();
            if matched > 1 {
                return false;
            }

            let Some(allowed) = self.index.allowed_values(parameter) else {
                continue;
            };
            let all_allowed_rejected = allowed.iter().all(|value| {
                atoms.iter().any(|(atom, literal)| {
                    *literal == value.as_str() && assignment[*atom] == Some(false)
                })
            });
            if !allowed.is_empty() && all_allowed_rejected {
                return false;
            }
        }
        true
    }
}
