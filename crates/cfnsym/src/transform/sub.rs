//! `${name}` / `&{name}` placeholder substitution
//!
//! - `${name}` is replaced by the bound value
//! - `&{name}` is replaced by the bound value with every non-alphanumeric character removed
//! - `${!Literal}` is an escape and left alone, [unescape] turns it into `${Literal}`
//!
//! Loop identifiers in keys use both forms, `Fn::Sub` text only knows `${name}`
//! ([substitute_dollar]).
//!
//! Arrays and objects are substituted by a short digest of their structure. Names without a
//! binding stay in the text verbatim and are reported back, so the caller can try again once
//! more bindings are known.
use crate::value::Value;

/// Number of hex characters of the digest used for array and object substitutions
const SHORT_DIGEST_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Dollar,
    Ampersand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub text: String,
    /// placeholder names left in `text`
    pub unresolved: Vec<String>,
}

impl Substituted {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Substitutes all placeholders `lookup` knows about
pub fn substitute(text: &str, lookup: impl FnMut(&str) -> Option<Value>) -> Substituted {
    substitute_forms(text, &[Form::Dollar, Form::Ampersand], lookup)
}

/// Like [substitute], but `&{name}` is plain text
pub fn substitute_dollar(text: &str, lookup: impl FnMut(&str) -> Option<Value>) -> Substituted {
    substitute_forms(text, &[Form::Dollar], lookup)
}

fn substitute_forms(
    text: &str,
    forms: &[Form],
    mut lookup: impl FnMut(&str) -> Option<Value>,
) -> Substituted {
    let mut out = String::with_capacity(text.len());
    let mut unresolved = vec![];
    let mut rest = text;

    while let Some(start) = rest.find(['$', '&']) {
        let form = if rest[start..].starts_with('$') {
            Form::Dollar
        } else {
            Form::Ampersand
        };

        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        if !forms.contains(&form) || !candidate[1..].starts_with('{') {
            out.push_str(&candidate[..1]);
            rest = &candidate[1..];
            continue;
        }

        let Some(end) = candidate.find('}') else {
            // unterminated, nothing left to substitute
            out.push_str(candidate);
            rest = "";
            break;
        };

        let placeholder = &candidate[..=end];
        let name = &candidate[2..end];
        rest = &candidate[end + 1..];

        if name.starts_with('!') || name.is_empty() {
            out.push_str(placeholder);
            continue;
        }

        match lookup(name).and_then(|value| render(&value, form)) {
            Some(rendered) => out.push_str(&rendered),
            None => {
                out.push_str(placeholder);
                unresolved.push(name.to_string());
            }
        }
    }
    out.push_str(rest);

    Substituted {
        text: out,
        unresolved,
    }
}

/// Names of all placeholders (escapes excluded)
pub fn placeholders(text: &str) -> Vec<String> {
    substitute(text, |_| None).unresolved
}

fn render(value: &Value, form: Form) -> Option<String> {
    let rendered = match value {
        Value::Array(_) | Value::Object(_) => short_digest(value),
        Value::Null => return None,
        scalar => scalar.to_scalar_string()?,
    };

    Some(match form {
        Form::Dollar => rendered,
        Form::Ampersand => rendered.chars().filter(char::is_ascii_alphanumeric).collect(),
    })
}

/// Final rendering of `Fn::Sub` text: `${!Literal}` becomes `${Literal}`
pub fn unescape(text: &str) -> String {
    text.replace("${!", "${")
}

pub fn short_digest(value: &Value) -> String {
    value.digest()[..SHORT_DIGEST_LEN].to_string()
}
