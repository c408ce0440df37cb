//! boolean condition expressions
use crate::value::Value;

/// One side of an `Fn::Equals`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// `{"Ref": name}`
    Ref(String),
    /// a scalar, compared by its string form
    Literal(String),
    /// any other expression, identified by its structural digest
    Other(String),
}

impl Operand {
    pub fn parse(value: &Value) -> Self {
        if let Some(("Ref", Value::String(name))) = value.single_entry() {
            return Operand::Ref(name.clone());
        }

        match value.to_scalar_string() {
            Some(literal) => Operand::Literal(literal),
            None => Operand::Other(value.digest()),
        }
    }

    /// Stable key used to identify `Fn::Equals` atoms regardless of operand order
    pub fn key(&self) -> String {
        match self {
            Operand::Ref(name) => format!("ref:{name}"),
            Operand::Literal(literal) => format!("literal:{literal}"),
            Operand::Other(digest) => format!("expr:{digest}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Equals(Operand, Operand),
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    Not(Box<ConditionExpr>),
    /// reference to another named condition
    Condition(String),
    /// anything that is not a well-formed condition function
    ///
    /// Treated as an unknown boolean, identified by its structural digest.
    Opaque(String),
}

impl ConditionExpr {
    /// Never fails. Malformed shapes become [ConditionExpr::Opaque].
    pub fn parse(value: &Value) -> Self {
        let opaque = || ConditionExpr::Opaque(value.digest());

        let Some((function, args)) = value.single_entry() else {
            return opaque();
        };

        match (function, args) {
            ("Fn::Equals", Value::Array(operands)) if operands.len() == 2 => {
                ConditionExpr::Equals(Operand::parse(&operands[0]), Operand::parse(&operands[1]))
            }
            ("Fn::And", Value::Array(operands)) if !operands.is_empty() => {
                ConditionExpr::And(operands.iter().map(ConditionExpr::parse).collect())
            }
            ("Fn::Or", Value::Array(operands)) if !operands.is_empty() => {
                ConditionExpr::Or(operands.iter().map(ConditionExpr::parse).collect())
            }
            ("Fn::Not", Value::Array(operands)) if operands.len() == 1 => {
                ConditionExpr::Not(Box::new(ConditionExpr::parse(&operands[0])))
            }
            ("Condition", Value::String(name)) => ConditionExpr::Condition(name.clone()),
            _ => opaque(),
        }
    }

    /// Names of directly referenced conditions
    pub fn referenced_conditions(&self) -> Vec<&str> {
        let mut names = vec![];
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            ConditionExpr::Condition(name) => names.push(name),
            ConditionExpr::And(operands) | ConditionExpr::Or(operands) => {
                for operand in operands {
                    operand.collect_references(names);
                }
            }
            ConditionExpr::Not(operand) => operand.collect_references(names),
            ConditionExpr::Equals(..) | ConditionExpr::Opaque(_) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template::parse_json;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> ConditionExpr {
        ConditionExpr::parse(&parse_json(text).expect("valid json"))
    }

    #[test]
    fn nested_expression() {
        let expr = parse(
            r#"{"Fn::Or": [
                {"Fn::Equals": [{"Ref": "Env"}, "prod"]},
                {"Fn::Not": [{"Condition": "IsDev"}]}
            ]}"#,
        );

        assert_eq!(
            expr,
            ConditionExpr::Or(vec![
                ConditionExpr::Equals(
                    Operand::Ref("Env".to_string()),
                    Operand::Literal("prod".to_string())
                ),
                ConditionExpr::Not(Box::new(ConditionExpr::Condition("IsDev".to_string()))),
            ])
        );
        assert_eq!(expr.referenced_conditions(), vec!["IsDev"]);
    }

    #[test]
    fn numbers_compare_as_strings() {
        assert_eq!(
            parse(r#"{"Fn::Equals": [1, "1"]}"#),
            ConditionExpr::Equals(
                Operand::Literal("1".to_string()),
                Operand::Literal("1".to_string())
            )
        );
    }

    #[test]
    fn malformed_shapes_are_opaque() {
        for text in [
            r#"{"Fn::Equals": ["only one"]}"#,
            r#"{"Fn::Not": [{"Condition": "A"}, {"Condition": "B"}]}"#,
            r#"{"Condition": ["A"]}"#,
            r#""just a string""#,
            r#"{"Fn::And": [], "extra": 1}"#,
        ] {
            assert!(
                matches!(parse(text), ConditionExpr::Opaque(_)),
                "{text} must be opaque"
            );
        }
    }
}
