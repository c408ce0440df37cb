//! cfnsym cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand all Fn::ForEach loop macros
    Expand(ExpandCommand),

    /// Print the conditions gating a path
    Conditions(ConditionsCommand),

    /// Print the scenarios deciding every Fn::If below a path
    Scenarios(ScenariosCommand),

    /// Print every shape the value at a path can take
    Flatten(FlattenCommand),

    /// Print scenarios in which a reference to a resource dangles
    Guarded(GuardedCommand),
}

#[derive(Parser, Debug)]
pub struct SettingsArgs {
    /// Region to analyse for; the first one resolves pseudo-parameters
    ///
    /// Can be specified multiple times.
    #[clap(short = 'r', long = "region", global(true))]
    pub regions: Vec<String>,

    /// Upper bound on the scenarios of one query
    #[clap(long = "max-scenarios", global(true))]
    pub max_scenarios: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Template file (json or yaml)
    ///
    /// Reads the template from stdin if omitted.
    #[clap(short = 'f', long = "input-file")]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct ExpandCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ConditionsCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Dotted path, e.g. Resources.Bucket.Properties.BucketName.Fn::If.1
    pub path: String,

    /// Ignore Fn::If nested inside other intrinsic functions
    #[clap(long = "exclude-functions")]
    pub exclude_functions: bool,

    /// Only record the Fn::If closest to the end of the path
    #[clap(long = "only-deepest")]
    pub only_deepest: bool,
}

#[derive(Parser, Debug)]
pub struct ScenariosCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Dotted path, e.g. Resources.Bucket.Properties
    pub path: String,

    /// Ignore Fn::If nested inside other intrinsic functions
    #[clap(long = "exclude-functions")]
    pub exclude_functions: bool,
}

#[derive(Parser, Debug)]
pub struct FlattenCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Dotted path, e.g. Resources.Bucket.Properties
    pub path: String,

    /// Keep mappings that lose all their keys
    #[clap(long = "preserve-shape")]
    pub preserve_shape: bool,
}

#[derive(Parser, Debug)]
pub struct GuardedCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Dotted path of the reference
    pub path: String,

    /// Name of the referenced resource
    pub resource: String,
}
