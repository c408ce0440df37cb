mod cli;

use cfnsym::conditions::{Analysis, ConditionIndex};
use cfnsym::settings::Settings;
use cfnsym::template::Template;
use cfnsym::value::parse_path;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("CFNSYM_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let settings = settings(&cli.settings);

    let command_result = match cli.command {
        cli::Command::Expand(expand_cli) => expand(expand_cli, &settings),
        cli::Command::Conditions(conditions_cli) => conditions(conditions_cli, &settings),
        cli::Command::Scenarios(scenarios_cli) => scenarios(scenarios_cli, &settings),
        cli::Command::Flatten(flatten_cli) => flatten(flatten_cli, &settings),
        cli::Command::Guarded(guarded_cli) => guarded(guarded_cli, &settings),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn settings(args: &cli::SettingsArgs) -> Settings {
    let mut settings = Settings::default();
    if !args.regions.is_empty() {
        settings.regions = args.regions.clone();
    }
    if let Some(max_scenarios) = args.max_scenarios {
        settings.max_scenarios = max_scenarios;
    }
    settings
}

pub fn expand(cli: cli::ExpandCommand, settings: &Settings) -> anyhow::Result<()> {
    let template = load(&cli.input)?;
    let expanded = template.expand(settings)?;

    output(&cli.output, &expanded)
}

pub fn conditions(cli: cli::ConditionsCommand, settings: &Settings) -> anyhow::Result<()> {
    let template = load_expanded(&cli.input, settings)?;
    let index = ConditionIndex::new(&template, settings);
    let region = Some(settings.primary_region().to_string());
    let mut analysis = Analysis::new(&template, &index, region);

    let constraints = analysis.conditions_along_path(
        &parse_path(&cli.path),
        !cli.exclude_functions,
        cli.only_deepest,
    );

    output(&cli.output, &constraints)
}

pub fn scenarios(cli: cli::ScenariosCommand, settings: &Settings) -> anyhow::Result<()> {
    let template = load_expanded(&cli.input, settings)?;
    let index = ConditionIndex::new(&template, settings);
    let region = Some(settings.primary_region().to_string());
    let mut analysis = Analysis::new(&template, &index, region);

    let scenarios = analysis.scenarios_below_path(
        &parse_path(&cli.path),
        !cli.exclude_functions,
        Some(settings.primary_region()),
    );

    output(&cli.output, &scenarios)
}

pub fn flatten(cli: cli::FlattenCommand, settings: &Settings) -> anyhow::Result<()> {
    let template = load_expanded(&cli.input, settings)?;
    let index = ConditionIndex::new(&template, settings);
    let region = Some(settings.primary_region().to_string());
    let analysis = Analysis::new(&template, &index, region);

    let path = parse_path(&cli.path);
    let subtree = template
        .root()
        .lookup(&path)
        .ok_or_else(|| anyhow::anyhow!("Nothing found at {}", cli.path))?;

    let flattened = match cli.preserve_shape {
        true => analysis.flatten_preserving_shape(subtree),
        false => analysis.flatten_under_conditions(subtree),
    };

    output(&cli.output, &flattened)
}

pub fn guarded(cli: cli::GuardedCommand, settings: &Settings) -> anyhow::Result<()> {
    let template = load_expanded(&cli.input, settings)?;
    let index = ConditionIndex::new(&template, settings);
    let region = Some(settings.primary_region().to_string());
    let mut analysis = Analysis::new(&template, &index, region);

    let counterexamples = analysis.is_guarded_elsewhere(&parse_path(&cli.path), &cli.resource);

    output(&cli.output, &counterexamples)
}

fn load(input: &cli::InputArgs) -> anyhow::Result<Template> {
    match &input.file {
        Some(file_path) => Ok(Template::load_file(file_path)?),
        None => {
            let stdin = std::io::read_to_string(std::io::stdin())?;
            Ok(Template::parse(&stdin)?)
        }
    }
}

/// Loads the template and expands its loop macros, keeping the original on failure
fn load_expanded(input: &cli::InputArgs, settings: &Settings) -> anyhow::Result<Template> {
    let template = load(input)?;
    let (diagnostics, root) = cfnsym::transform::expand_or_original(&template, settings);
    for diagnostic in &diagnostics {
        tracing::warn!(%diagnostic, "continuing with the unexpanded template");
    }

    Ok(Template::new(root, template.source().clone()))
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
