//! reserved vocabulary: intrinsic function keys
use crate::value::Value;

pub const FOR_EACH_PREFIX: &str = "Fn::ForEach::";
pub const NO_VALUE: &str = "AWS::NoValue";

/// Every intrinsic function the engine recognises
///
/// Any other key is opaque data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    Ref,
    If,
    FindInMap,
    Sub,
    /// `Fn::ForEach::<LoopName>`; a macro block rather than a value producing function
    ForEach,
    ToJsonString,
    Length,
    GetAtt,
    GetAZs,
    Join,
    Select,
    Split,
    Base64,
    Cidr,
    ImportValue,
    Equals,
    And,
    Or,
    Not,
}

impl IntrinsicKind {
    pub fn parse(key: &str) -> Option<Self> {
        use IntrinsicKind::*;

        Some(match key {
            "Ref" => Ref,
            "Fn::If" => If,
            "Fn::FindInMap" => FindInMap,
            "Fn::Sub" => Sub,
            "Fn::ToJsonString" => ToJsonString,
            "Fn::Length" => Length,
            "Fn::GetAtt" => GetAtt,
            "Fn::GetAZs" => GetAZs,
            "Fn::Join" => Join,
            "Fn::Select" => Select,
            "Fn::Split" => Split,
            "Fn::Base64" => Base64,
            "Fn::Cidr" => Cidr,
            "Fn::ImportValue" => ImportValue,
            "Fn::Equals" => Equals,
            "Fn::And" => And,
            "Fn::Or" => Or,
            "Fn::Not" => Not,
            key if key.starts_with(FOR_EACH_PREFIX) && key.len() > FOR_EACH_PREFIX.len() => ForEach,
            _ => return None,
        })
    }

    /// Whether a one-entry object with this key is a function call producing a value
    pub fn is_function(self) -> bool {
        self != IntrinsicKind::ForEach
    }
}

/// Recognises `{"<intrinsic>": args}` and returns the kind and the arguments
pub fn function_call(value: &Value) -> Option<(IntrinsicKind, &Value)> {
    let (key, args) = value.single_entry()?;
    let kind = IntrinsicKind::parse(key)?;
    kind.is_function().then_some((kind, args))
}

/// `{"Ref": "AWS::NoValue"}`
pub fn is_no_value(value: &Value) -> bool {
    matches!(
        function_call(value),
        Some((IntrinsicKind::Ref, Value::String(name))) if name == NO_VALUE
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template::parse_json;

    #[test]
    fn recognises_function_calls() {
        let value = parse_json(r#"{"Fn::GetAtt": ["Bucket", "Arn"]}"#).unwrap();
        assert!(matches!(
            function_call(&value),
            Some((IntrinsicKind::GetAtt, Value::Array(_)))
        ));

        let value = parse_json(r#"{"Fn::GetAtt": ["Bucket", "Arn"], "Other": 1}"#).unwrap();
        assert!(function_call(&value).is_none());

        let value = parse_json(r#"{"Fn::Unknown": 1}"#).unwrap();
        assert!(function_call(&value).is_none());
    }

    #[test]
    fn for_each_needs_a_loop_name() {
        assert_eq!(
            IntrinsicKind::parse("Fn::ForEach::Buckets"),
            Some(IntrinsicKind::ForEach)
        );
        assert_eq!(IntrinsicKind::parse("Fn::ForEach::"), None);

        let value = parse_json(r#"{"Fn::ForEach::Buckets": ["x", [], {}]}"#).unwrap();
        assert!(function_call(&value).is_none());
    }

    #[test]
    fn no_value_marker() {
        assert!(is_no_value(&parse_json(r#"{"Ref": "AWS::NoValue"}"#).unwrap()));
        assert!(!is_no_value(&parse_json(r#"{"Ref": "AWS::Region"}"#).unwrap()));
        assert!(!is_no_value(&parse_json(r#""AWS::NoValue""#).unwrap()));
    }
}
