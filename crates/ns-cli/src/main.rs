//! Likelihood engine CLI

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ns_core::{DataType, RunContext};
use ns_inference::{LikelihoodEngine, apply_migrations, chi2_p_value};
use ns_propagator::{MemoryEventSource, ParameterInjection};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ns-cli")]
#[command(about = "Binned model/data likelihood evaluation")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the likelihood at the nominal point (or at injected values)
    Eval {
        #[command(flatten)]
        engine: EngineArgs,

        /// Parameter injection (JSON, `parameterSetList` layout) applied before evaluating.
        #[arg(long)]
        inject: Option<PathBuf>,

        /// Print the sample and dataset breakdown tables to stderr.
        #[arg(long)]
        tables: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export final events and binned rates of both propagators
    Export {
        #[command(flatten)]
        engine: EngineArgs,

        /// Include every binned event, not only the rates.
        #[arg(long)]
        events: bool,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Relocate deprecated configuration keys and print the upgraded document
    Migrate {
        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Engine configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Threads (0 = auto). Use 1 for deterministic parity.
    #[arg(long, default_value = "1")]
    threads: usize,

    /// Seed for toy throws.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Override the configured data type.
    #[arg(long, value_enum)]
    data_type: Option<DataTypeArg>,

    /// Register an event source: `name=path.json` (repeatable).
    #[arg(long = "event-source", value_name = "NAME=PATH")]
    event_sources: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DataTypeArg {
    Asimov,
    Toy,
    RealData,
}

impl From<DataTypeArg> for DataType {
    fn from(arg: DataTypeArg) -> Self {
        match arg {
            DataTypeArg::Asimov => DataType::Asimov,
            DataTypeArg::Toy => DataType::Toy,
            DataTypeArg::RealData => DataType::RealData,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Eval { engine, inject, tables, output } => {
            cmd_eval(&engine, inject.as_deref(), tables, output.as_deref())
        }
        Commands::Export { engine, events, output } => cmd_export(&engine, events, output.as_deref()),
        Commands::Migrate { config, output } => cmd_migrate(&config, output.as_deref()),
    }
}

fn cmd_eval(args: &EngineArgs, inject: Option<&Path>, tables: bool, output: Option<&Path>) -> Result<()> {
    let mut engine = build_engine(args)?;

    if let Some(path) = inject {
        let injection: ParameterInjection = serde_json::from_value(read_json(path)?)
            .with_context(|| format!("invalid parameter injection in {}", path.display()))?;
        engine.model_mut().parameters_mut().inject_parameter_values(&injection)?;
        engine.propagate_model()?;
    }
    let total = engine.evaluate()?;
    tracing::info!(total, "likelihood evaluated");

    if tables {
        eprintln!("{}", engine.sample_breakdown_table());
        eprintln!("{}", engine.dataset_breakdown_table());
    }

    let dof = engine.nb_fit_bins().saturating_sub(engine.nb_fit_parameters());
    let p_value = if dof > 0 { Some(chi2_p_value(total, dof)?) } else { None };
    let datasets: Vec<Value> = engine
        .datasets()
        .iter()
        .zip(engine.dataset_status())
        .map(|(ds, status)| json!({ "name": ds.name(), "status": status }))
        .collect();
    let migrations: Vec<&str> = engine.applied_migrations().iter().map(|m| m.old_path).collect();

    let output_json = json!({
        "data_type": engine.config().data_type.as_str(),
        "joint_probability": engine.joint_probability().map(|jp| jp.type_tag().to_string()),
        "summary": engine.summary(),
        "nb_fit_parameters": engine.nb_fit_parameters(),
        "nb_fit_bins": engine.nb_fit_bins(),
        "dof": dof,
        "p_value": p_value,
        "datasets": datasets,
        "applied_migrations": migrations,
    });
    write_json(output, output_json)
}

fn cmd_export(args: &EngineArgs, events: bool, output: Option<&Path>) -> Result<()> {
    let engine = build_engine(args)?;
    let mut output_json = json!({ "rates": engine.export_event_rates() });
    if events {
        output_json["events"] = serde_json::to_value(engine.export_events())?;
    }
    write_json(output, output_json)
}

fn cmd_migrate(config: &Path, output: Option<&Path>) -> Result<()> {
    let mut document = read_json(config)?;
    let applied = apply_migrations(&mut document);
    for m in &applied {
        tracing::info!(from = m.old_path, to = m.new_path, "relocated");
    }
    write_json(output, document)
}

fn build_engine(args: &EngineArgs) -> Result<LikelihoodEngine> {
    let mut document = read_json(&args.config)?;
    if let Some(data_type) = args.data_type {
        let data_type: DataType = data_type.into();
        document["dataType"] = json!(data_type.as_str());
    }

    let ctx = RunContext::with_threads(args.threads).seed(args.seed);
    let mut engine = LikelihoodEngine::new(&document, ctx)?;
    for spec in &args.event_sources {
        let (name, path) = parse_event_source(spec)?;
        let source: MemoryEventSource = serde_json::from_value(read_json(&path)?)
            .with_context(|| format!("invalid event source file {}", path.display()))?;
        tracing::info!(name, dispensers = source.dispensers.len(), "event source registered");
        engine.register_event_source(name, Arc::new(source));
    }

    engine.initialize()?;
    tracing::info!(
        parameters = engine.nb_fit_parameters(),
        bins = engine.nb_fit_bins(),
        "engine initialized"
    );
    Ok(engine)
}

fn parse_event_source(spec: &str) -> Result<(&str, PathBuf)> {
    match spec.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name, PathBuf::from(path))),
        _ => bail!("--event-source expects NAME=PATH, got \"{spec}\""),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    tracing::info!(path = %path.display(), "reading");
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_json(output: Option<&Path>, value: Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
