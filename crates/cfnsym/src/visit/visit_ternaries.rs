use super::Visit;
use crate::transform::intrinsic::{function_call, IntrinsicKind};
use crate::value::{Path, PathSegment, Value};

/// A well-formed `{"Fn::If": [condition, if_true, if_false]}`
#[derive(Debug, Clone, Copy)]
pub struct Ternary<'v> {
    pub condition: &'v str,
    pub if_true: &'v Value,
    pub if_false: &'v Value,
}

impl<'v> Ternary<'v> {
    /// `None` for anything that is not a well-formed ternary
    pub fn parse(value: &'v Value) -> Option<Self> {
        let (IntrinsicKind::If, Value::Array(args)) = function_call(value)? else {
            return None;
        };

        match args.as_slice() {
            [Value::String(condition), if_true, if_false] => Some(Self {
                condition,
                if_true,
                if_false,
            }),
            _ => None,
        }
    }

    pub fn branch(&self, value: bool) -> &'v Value {
        if value {
            self.if_true
        } else {
            self.if_false
        }
    }
}

/// Where a ternary was found
#[derive(Debug, Clone)]
pub struct TernarySite<'v> {
    /// path of the `{"Fn::If": ...}` object, relative to the visited value
    pub path: Path,
    pub ternary: Ternary<'v>,
    /// whether an enclosing intrinsic function (other than `Fn::If`) wraps the ternary
    pub inside_function: bool,
}

/// Recursively visit all well-formed ternaries
pub trait VisitTernaries {
    fn visit_ternaries<'v>(&'v self, visitor: &mut dyn Visit<TernarySite<'v>>);
}

impl VisitTernaries for Value {
    fn visit_ternaries<'v>(&'v self, visitor: &mut dyn Visit<TernarySite<'v>>) {
        walk(self, &mut vec![], false, visitor);
    }
}

fn walk<'v>(
    value: &'v Value,
    path: &mut Path,
    inside_function: bool,
    visitor: &mut dyn Visit<TernarySite<'v>>,
) {
    if let Some(ternary) = Ternary::parse(value) {
        visitor.visit(TernarySite {
            path: path.clone(),
            ternary,
            inside_function,
        });

        for (index, branch) in [(1, ternary.if_true), (2, ternary.if_false)] {
            path.push(PathSegment::Key("Fn::If".to_string()));
            path.push(PathSegment::Index(index));
            walk(branch, path, inside_function, visitor);
            path.pop();
            path.pop();
        }
        return;
    }

    let inside_function = inside_function
        || matches!(function_call(value), Some((kind, _)) if kind != IntrinsicKind::If);

    match value {
        Value::Object(object) => {
            for (key, child) in object {
                path.push(PathSegment::Key(key.clone()));
                walk(child, path, inside_function, visitor);
                path.pop();
            }
        }
        Value::Array(array) => {
            for (index, child) in array.iter().enumerate() {
                path.push(PathSegment::Index(index));
                walk(child, path, inside_function, visitor);
                path.pop();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template::parse_json;
    use crate::template_path;
    use pretty_assertions::assert_eq;

    fn sites(value: &Value) -> Vec<(Path, String, bool)> {
        let mut found = vec![];
        value.visit_ternaries(&mut |site: TernarySite<'_>| {
            found.push((
                site.path,
                site.ternary.condition.to_string(),
                site.inside_function,
            ))
        });
        found
    }

    #[test]
    fn finds_nested_ternaries() {
        let value = parse_json(
            r#"{
                "A": {"Fn::If": ["outer", {"Fn::If": ["inner", 1, 2]}, 3]},
                "B": {"Fn::Join": ["", [{"Fn::If": ["joined", "x", "y"]}]]}
            }"#,
        )
        .unwrap();

        assert_eq!(
            sites(&value),
            vec![
                (template_path!["A"], "outer".to_string(), false),
                (
                    template_path!["A", "Fn::If", 1usize],
                    "inner".to_string(),
                    false
                ),
                (
                    template_path!["B", "Fn::Join", 1usize, 0usize],
                    "joined".to_string(),
                    true
                ),
            ]
        );
    }

    #[test]
    fn malformed_ternaries_are_skipped() {
        let value = parse_json(
            r#"{
                "A": {"Fn::If": ["too", "few"]},
                "B": {"Fn::If": [{"Ref": "x"}, 1, 2]},
                "C": {"Fn::If": ["ok", 1, 2], "Other": 1}
            }"#,
        )
        .unwrap();

        assert_eq!(sites(&value), vec![]);
    }
}
