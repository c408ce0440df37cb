//! Intrinsic Partial Evaluator
//!
//! Best-effort resolution of intrinsic function calls against the loop bindings, the
//! pseudo-parameters, parameter defaults and the `Mappings` section. Anything that is only
//! known after deployment yields [Unresolved]; callers decide whether that is fatal.
use super::bindings::Scope;
use super::intrinsic::{function_call, IntrinsicKind};
use super::{pseudo, sub, TransformContext};
use crate::value::{Map, Value};

/// A value can not be determined without deploying the template
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("unresolved: {reason}")]
pub struct Unresolved {
    pub reason: String,
}

impl Unresolved {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

type Resolved = Result<Value, Unresolved>;

const SSM_PARAMETER_TYPE_PREFIX: &str = "AWS::SSM::Parameter::Value<";
const FIND_IN_MAP_DEFAULT: &str = "DefaultValue";

#[derive(derive_new::new)]
pub struct Evaluator<'a, 't> {
    context: &'a TransformContext<'t>,
    scope: &'a Scope<'a>,
    /// only loop bindings (and literals) may be used, no parameters or pseudo-parameters
    bindings_only: bool,
}

impl<'a, 't> Evaluator<'a, 't> {
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn resolve(&self, value: &Value) -> Resolved {
        if let Some((kind, args)) = function_call(value) {
            return self.resolve_function(kind, args);
        }

        match value {
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(object) => Ok(Value::Object(
                object
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.resolve(item)?)))
                    .collect::<Result<_, Unresolved>>()?,
            )),
            scalar => Ok(scalar.clone()),
        }
    }

    fn resolve_function(&self, kind: IntrinsicKind, args: &Value) -> Resolved {
        use IntrinsicKind::*;

        match kind {
            Ref => match args {
                Value::String(name) => self.resolve_ref(name),
                _ => Err(Unresolved::new("Ref expects a name")),
            },
            FindInMap => self.resolve_find_in_map(args),
            Sub => self.resolve_sub(args),
            GetAZs => self.resolve_get_azs(args),
            Join => self.resolve_join(args),
            Select => self.resolve_select(args),
            Split => self.resolve_split(args),
            Length => match self.resolve(args)? {
                Value::Array(items) => Ok(Value::Integer(items.len() as i64)),
                _ => Err(Unresolved::new("Fn::Length expects a list")),
            },
            ToJsonString => {
                let resolved = self.resolve(args)?;
                Ok(Value::String(resolved.to_json_string()))
            }
            If | GetAtt | Base64 | Cidr | ImportValue | Equals | And | Or | Not | ForEach => Err(
                Unresolved::new(format!("{kind:?} can not be evaluated statically")),
            ),
        }
    }

    pub fn resolve_ref(&self, name: &str) -> Resolved {
        if let Some(bound) = self.scope.get(name) {
            return Ok(bound.clone());
        }

        if self.bindings_only {
            return Err(Unresolved::new(format!("{name} is not a loop variable")));
        }

        if let Some(value) = pseudo::resolve(name, &self.context.region) {
            return Ok(value);
        }

        let Some(parameter) = self
            .context
            .parameters
            .and_then(|parameters| parameters.get(name))
        else {
            return Err(Unresolved::new(format!("{name} is not a parameter")));
        };

        resolve_parameter(name, parameter)
    }

    fn resolve_scalar(&self, value: &Value) -> Option<String> {
        self.resolve(value)
            .ok()
            .and_then(|resolved| resolved.to_scalar_string())
    }

    fn resolve_find_in_map(&self, args: &Value) -> Resolved {
        let Value::Array(args) = args else {
            return Err(Unresolved::new("Fn::FindInMap expects a list"));
        };
        if args.len() != 3 && args.len() != 4 {
            return Err(Unresolved::new("Fn::FindInMap expects three or four arguments"));
        }

        let default = args
            .get(3)
            .and_then(|options| options.get(FIND_IN_MAP_DEFAULT))
            .map(|default| self.resolve(default).unwrap_or_else(|_| default.clone()));

        let map_name = self.resolve_scalar(&args[0]);
        let top_key = self.resolve_scalar(&args[1]);
        let second_key = self.resolve_scalar(&args[2]);

        let found = self.context.mappings.and_then(|mappings| {
            find_in_map(
                mappings,
                map_name.as_deref(),
                top_key.as_deref(),
                second_key.as_deref(),
            )
        });

        match (found, default) {
            (Some(value), _) => Ok(value.clone()),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(Unresolved::new(format!(
                "no mapping entry for [{}, {}, {}]",
                map_name.as_deref().unwrap_or("?"),
                top_key.as_deref().unwrap_or("?"),
                second_key.as_deref().unwrap_or("?"),
            ))),
        }
    }

    fn resolve_sub(&self, args: &Value) -> Resolved {
        let (text, variables) = match args {
            Value::String(text) => (text, None),
            Value::Array(parts) => match parts.as_slice() {
                [Value::String(text)] => (text, None),
                [Value::String(text), Value::Object(variables)] => (text, Some(variables)),
                _ => return Err(Unresolved::new("malformed Fn::Sub")),
            },
            _ => return Err(Unresolved::new("malformed Fn::Sub")),
        };

        let substituted = sub::substitute_dollar(text, |name| {
            if let Some(variable) = variables.and_then(|variables| variables.get(name)) {
                return self.resolve(variable).ok();
            }
            if name.contains('.') {
                // attribute of a resource
                return None;
            }
            self.resolve_ref(name).ok()
        });

        if substituted.is_complete() {
            Ok(Value::String(sub::unescape(&substituted.text)))
        } else {
            Err(Unresolved::new(format!(
                "Fn::Sub placeholders {:?} are unresolved",
                substituted.unresolved
            )))
        }
    }

    fn resolve_get_azs(&self, args: &Value) -> Resolved {
        let region = match self.resolve_scalar(args) {
            Some(region) if !region.is_empty() => region,
            Some(_) if !self.bindings_only => self.context.region.clone(),
            _ => return Err(Unresolved::new("Fn::GetAZs region is unknown")),
        };

        Ok(Value::Array(
            ["a", "b", "c"]
                .iter()
                .map(|zone| Value::String(format!("{region}{zone}")))
                .collect(),
        ))
    }

    fn resolve_join(&self, args: &Value) -> Resolved {
        let Some([delimiter, items]) = args.as_array() else {
            return Err(Unresolved::new("Fn::Join expects [delimiter, list]"));
        };
        let delimiter = self
            .resolve_scalar(delimiter)
            .ok_or_else(|| Unresolved::new("Fn::Join delimiter is unknown"))?;

        let Value::Array(items) = self.resolve(items)? else {
            return Err(Unresolved::new("Fn::Join expects a list"));
        };

        let parts = items
            .iter()
            .map(|item| {
                item.to_scalar_string()
                    .ok_or_else(|| Unresolved::new("Fn::Join element is not a scalar"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Value::String(parts.join(&delimiter)))
    }

    fn resolve_select(&self, args: &Value) -> Resolved {
        let Some([index, items]) = args.as_array() else {
            return Err(Unresolved::new("Fn::Select expects [index, list]"));
        };

        let index = self
            .resolve_scalar(index)
            .and_then(|index| index.parse::<usize>().ok())
            .ok_or_else(|| Unresolved::new("Fn::Select index is unknown"))?;

        let Value::Array(items) = self.resolve(items)? else {
            return Err(Unresolved::new("Fn::Select expects a list"));
        };

        items
            .into_iter()
            .nth(index)
            .ok_or_else(|| Unresolved::new("Fn::Select index out of bounds"))
    }

    fn resolve_split(&self, args: &Value) -> Resolved {
        let Some([delimiter, source]) = args.as_array() else {
            return Err(Unresolved::new("Fn::Split expects [delimiter, string]"));
        };
        let (Some(delimiter), Some(source)) =
            (self.resolve_scalar(delimiter), self.resolve_scalar(source))
        else {
            return Err(Unresolved::new("Fn::Split arguments are unknown"));
        };

        Ok(Value::Array(
            source
                .split(delimiter.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ))
    }
}

/// Default (or first allowed) value of a declared parameter
fn resolve_parameter(name: &str, parameter: &Value) -> Resolved {
    let parameter_type = parameter.get("Type").and_then(Value::as_str).unwrap_or("");
    if parameter_type.starts_with(SSM_PARAMETER_TYPE_PREFIX) {
        return Err(Unresolved::new(format!(
            "{name} is read from the parameter store at deploy time"
        )));
    }

    let value = parameter
        .get("Default")
        .or_else(|| {
            parameter
                .get("AllowedValues")
                .and_then(Value::as_array)
                .and_then(<[Value]>::first)
        })
        .ok_or_else(|| Unresolved::new(format!("{name} has no default value")))?;

    let is_list = parameter_type == "CommaDelimitedList" || parameter_type.starts_with("List<");
    match value {
        Value::String(text) if is_list => Ok(Value::Array(
            text.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        )),
        value => Ok(value.clone()),
    }
}

/// Exact lookup with the structural fallbacks
///
/// - an unknown map name falls back to the only map, if there is exactly one
/// - an unresolved top level key is inferred when exactly one section contains the second key
/// - an unresolved second level key is inferred when the section has exactly one key
///
/// These guesses can pick the wrong section for templates with several similar maps.
fn find_in_map<'m>(
    mappings: &'m Map,
    map_name: Option<&str>,
    top_key: Option<&str>,
    second_key: Option<&str>,
) -> Option<&'m Value> {
    let map = match map_name.and_then(|name| mappings.get(name)) {
        Some(map) => map,
        None if mappings.len() == 1 => {
            tracing::debug!(?map_name, "Fn::FindInMap falls back to the only map");
            mappings.first().map(|(_, map)| map)?
        }
        None => return None,
    };
    let map = map.as_object()?;

    let section = match top_key {
        Some(top_key) => map.get(top_key)?,
        None => {
            let second_key = second_key?;
            let mut candidates = map
                .values()
                .filter(|section| section.get(second_key).is_some());
            let section = candidates.next()?;
            if candidates.next().is_some() {
                return None;
            }
            tracing::debug!(second_key, "Fn::FindInMap top level key inferred");
            section
        }
    };
    let section = section.as_object()?;

    match second_key {
        Some(second_key) => section.get(second_key),
        None if section.len() == 1 => {
            tracing::debug!(?top_key, "Fn::FindInMap second level key inferred");
            section.first().map(|(_, value)| value)
        }
        None => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::settings::Settings;
    use crate::template;
    use crate::template::{parse_json, Template};
    use pretty_assertions::assert_eq;

    fn fixture() -> Template {
        template! {r#"
        Parameters:
          Env:
            Type: String
            Default: prod
          Subnets:
            Type: CommaDelimitedList
            Default: "subnet-a, subnet-b"
          Size:
            Type: String
            AllowedValues: [small, large]
          Ami:
            Type: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>"
            Default: /aws/service/ami
          Open:
            Type: String
        Mappings:
          Sizes:
            prod:
              Instance: m5.large
              Count: 3
            dev:
              Instance: t3.micro
        "#}
    }

    fn resolve_with(template: &Template, region: &str, expression: &str) -> Resolved {
        let settings = Settings {
            regions: vec![region.to_string()],
            ..Default::default()
        };
        let context = TransformContext::new(template, &settings);
        let scope = Scope::root();
        Evaluator::new(&context, &scope, false).resolve(&parse_json(expression).unwrap())
    }

    fn resolve(template: &Template, expression: &str) -> Resolved {
        resolve_with(template, "us-east-1", expression)
    }

    #[test]
    fn pseudo_parameters_inside_sub() {
        let template = fixture();
        assert_eq!(
            resolve_with(&template, "eu-west-1", r#"{"Fn::Sub": "bucket-${AWS::Region}"}"#),
            Ok("bucket-eu-west-1".into())
        );
        assert_eq!(
            resolve_with(&template, "us-gov-west-1", r#"{"Fn::Sub": "arn:${AWS::Partition}:s3"}"#),
            Ok("arn:aws-us-gov:s3".into())
        );
        assert_eq!(
            resolve_with(&template, "cn-north-1", r#"{"Ref": "AWS::Partition"}"#),
            Ok("aws-cn".into())
        );
    }

    #[test]
    fn sub_variables_and_unresolvable_attributes() {
        let template = fixture();
        assert_eq!(
            resolve(&template, r#"{"Fn::Sub": ["${Env}-${Suffix}", {"Suffix": "logs"}]}"#),
            Ok("prod-logs".into())
        );
        assert!(resolve(&template, r#"{"Fn::Sub": "${Bucket.Arn}"}"#).is_err());
    }

    #[test]
    fn sub_escapes_and_ampersands_stay_literal() {
        let template = fixture();
        assert_eq!(
            resolve(&template, r#"{"Fn::Sub": "${!Literal}-${Env}"}"#),
            Ok("${Literal}-prod".into())
        );
        assert_eq!(
            resolve(&template, r#"{"Fn::Sub": "&{Env}-${Env}"}"#),
            Ok("&{Env}-prod".into())
        );
    }

    #[test]
    fn parameters() {
        let template = fixture();
        assert_eq!(resolve(&template, r#"{"Ref": "Env"}"#), Ok("prod".into()));
        assert_eq!(
            resolve(&template, r#"{"Ref": "Subnets"}"#),
            Ok(Value::from(vec!["subnet-a", "subnet-b"]))
        );
        assert_eq!(resolve(&template, r#"{"Ref": "Size"}"#), Ok("small".into()));
        assert!(resolve(&template, r#"{"Ref": "Ami"}"#).is_err());
        assert!(resolve(&template, r#"{"Ref": "Open"}"#).is_err());
        assert!(resolve(&template, r#"{"Ref": "SomeResource"}"#).is_err());
    }

    #[test]
    fn find_in_map_exact_and_default() {
        let template = fixture();
        assert_eq!(
            resolve(&template, r#"{"Fn::FindInMap": ["Sizes", {"Ref": "Env"}, "Instance"]}"#),
            Ok("m5.large".into())
        );
        assert_eq!(
            resolve(
                &template,
                r#"{"Fn::FindInMap": ["Sizes", "qa", "Instance", {"DefaultValue": "t3.nano"}]}"#
            ),
            Ok("t3.nano".into())
        );
        assert!(resolve(&template, r#"{"Fn::FindInMap": ["Sizes", "qa", "Instance"]}"#).is_err());
        assert!(resolve(&template, r#"{"Fn::FindInMap": ["Sizes", "prod"]}"#).is_err());
    }

    #[test]
    fn find_in_map_structural_fallbacks() {
        let template = fixture();
        // unknown map name, but there is only one map
        assert_eq!(
            resolve(&template, r#"{"Fn::FindInMap": ["Other", "dev", "Instance"]}"#),
            Ok("t3.micro".into())
        );
        // top level key unresolved, "Count" only exists in one section
        assert_eq!(
            resolve(
                &template,
                r#"{"Fn::FindInMap": ["Sizes", {"Fn::GetAtt": ["R", "A"]}, "Count"]}"#
            ),
            Ok(Value::Integer(3))
        );
        // ambiguous: "Instance" is in both sections
        assert!(resolve(
            &template,
            r#"{"Fn::FindInMap": ["Sizes", {"Fn::GetAtt": ["R", "A"]}, "Instance"]}"#
        )
        .is_err());
        // second level key unresolved, "dev" has exactly one entry
        assert_eq!(
            resolve(
                &template,
                r#"{"Fn::FindInMap": ["Sizes", "dev", {"Fn::GetAtt": ["R", "A"]}]}"#
            ),
            Ok("t3.micro".into())
        );
    }

    #[test]
    fn list_functions() {
        let template = fixture();
        assert_eq!(
            resolve(&template, r#"{"Fn::GetAZs": ""}"#),
            Ok(Value::from(vec!["us-east-1a", "us-east-1b", "us-east-1c"]))
        );
        assert_eq!(
            resolve(&template, r#"{"Fn::Select": [1, {"Fn::Split": [",", "a,b,c"]}]}"#),
            Ok("b".into())
        );
        assert_eq!(
            resolve(&template, r#"{"Fn::Join": ["-", [{"Ref": "Env"}, "x", 1]]}"#),
            Ok("prod-x-1".into())
        );
        assert_eq!(
            resolve(&template, r#"{"Fn::Length": {"Ref": "Subnets"}}"#),
            Ok(Value::Integer(2))
        );
        assert_eq!(
            resolve(&template, r#"{"Fn::ToJsonString": {"Env": {"Ref": "Env"}}}"#),
            Ok(r#"{"Env":"prod"}"#.into())
        );
        assert!(resolve(&template, r#"{"Fn::GetAtt": ["Bucket", "Arn"]}"#).is_err());
    }

    #[test]
    fn bindings_take_precedence_and_can_be_exclusive() {
        let template = fixture();
        let context = TransformContext::new(&template, &Settings::default());
        let mut scope = Scope::root();
        scope.bind("Env", "dev".into());

        let expression =
            parse_json(r#"{"Fn::FindInMap": ["Sizes", {"Ref": "Env"}, "Instance"]}"#).unwrap();
        assert_eq!(
            Evaluator::new(&context, &scope, true).resolve(&expression),
            Ok("t3.micro".into())
        );

        let expression = parse_json(r#"{"Ref": "AWS::Region"}"#).unwrap();
        assert!(Evaluator::new(&context, &scope, true).resolve(&expression).is_err());
        assert_eq!(
            Evaluator::new(&context, &scope, false).resolve(&expression),
            Ok("us-east-1".into())
        );
    }
}
