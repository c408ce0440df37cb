//! a decoded template document ([Value] tree and path to source file)
//!
//! [Template] tracks
//! - the source path (if loaded from disk)
//! - the root value
//!
//! and offers accessors for the well-known top level sections. Source positions are the
//! decoder's business; everything in this crate identifies locations by [crate::value::Path].
use crate::value::{Map, Value};
use std::path::Path;

pub const RESOURCES: &str = "Resources";
pub const OUTPUTS: &str = "Outputs";
pub const PARAMETERS: &str = "Parameters";
pub const MAPPINGS: &str = "Mappings";
pub const CONDITIONS: &str = "Conditions";
pub const TRANSFORM: &str = "Transform";

/// Key of the guard-condition attribute on resources and outputs
pub const CONDITION_ATTRIBUTE: &str = "Condition";

pub const LANGUAGE_EXTENSIONS: &str = "AWS::LanguageExtensions";

#[derive(Debug, Clone)]
pub struct Template {
    source: Source,
    root: Value,
}

impl Template {
    pub fn new(root: Value, path: impl Into<Option<std::path::PathBuf>>) -> Self {
        Self {
            source: path.into(),
            root,
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    fn section(&self, name: &str) -> Option<&Map> {
        self.root.get(name).and_then(Value::as_object)
    }

    pub fn parameters(&self) -> Option<&Map> {
        self.section(PARAMETERS)
    }

    pub fn mappings(&self) -> Option<&Map> {
        self.section(MAPPINGS)
    }

    pub fn conditions(&self) -> Option<&Map> {
        self.section(CONDITIONS)
    }

    pub fn resources(&self) -> Option<&Map> {
        self.section(RESOURCES)
    }

    pub fn outputs(&self) -> Option<&Map> {
        self.section(OUTPUTS)
    }

    /// Whether `Transform` (string or list form) names the language extensions macro
    pub fn uses_language_extensions(&self) -> bool {
        match self.root.get(TRANSFORM) {
            Some(Value::String(name)) => name == LANGUAGE_EXTENSIONS,
            Some(Value::Array(names)) => names
                .iter()
                .any(|name| name.as_str() == Some(LANGUAGE_EXTENSIONS)),
            _ => false,
        }
    }

    /// The whole document with all loop macros expanded, see [crate::transform::expand]
    pub fn expand(
        &self,
        settings: &crate::settings::Settings,
    ) -> Result<Value, crate::transform::TransformErrors> {
        crate::transform::expand(self, settings)
    }

    /// Guard condition of a resource, if it carries a well-formed one
    pub fn resource_condition(&self, resource: &str) -> Option<&str> {
        self.resources()?
            .get(resource)?
            .get(CONDITION_ATTRIBUTE)?
            .as_str()
    }
}

impl Template {
    pub fn load_file(file_path: &Path) -> Result<Self, LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        let extension = file_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());

        let root = match extension.as_deref() {
            Some("json") => parse_json(&file_contents)?,
            Some("yaml" | "yml" | "template") => parse_yaml(&file_contents)?,
            _ => return Err(LoadError::UnsupportedExtension(file_path)),
        };

        Ok(Self::new(root, Some(file_path)))
    }

    /// Parses JSON or, failing that, YAML (JSON is a subset of YAML)
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        let root = match parse_json(text) {
            Ok(root) => root,
            Err(_) => parse_yaml(text)?,
        };
        Ok(Self::new(root, None))
    }
}

pub fn parse_json(text: &str) -> Result<Value, LoadError> {
    Ok(serde_json::from_str::<serde_json::Value>(text)?.into())
}

pub fn parse_yaml(text: &str) -> Result<Value, LoadError> {
    Ok(serde_yaml::from_str::<serde_json::Value>(text)?.into())
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse json template")]
    JsonParseFailed(#[from] serde_json::Error),
    #[error("Unable to parse yaml template")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("Unsupported template file extension: {}", .0.display())]
    UnsupportedExtension(std::path::PathBuf),
}

impl From<Value> for Template {
    fn from(value: Value) -> Self {
        Template::new(value, None)
    }
}

/// Utility macro to create a [Template]
///
/// ```
/// # use cfnsym::template;
/// let template = template!(r#"{"Resources": {}}"#);
/// assert!(template.resources().is_some());
/// ```
///
/// YAML works as well
/// ```
/// # use cfnsym::template;
/// let template = template!("Resources:\n  Bucket:\n    Type: AWS::S3::Bucket\n");
/// assert!(template.resources().is_some());
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use cfnsym::template;
/// template!("{ not: [valid");
/// ```
#[macro_export]
macro_rules! template {
    { $expr:expr } => {
        $crate::template::Template::parse($expr).expect("template must parse")
    };
}

pub type Source = Option<std::path::PathBuf>;
