use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tablegraph::export::{CanonicalOptions, to_json};
use tablegraph::{
    Annotation, ConfigArgs, Engine, EngineConfig, LoggingConfig, METRICS, Wikifier, Window,
    init_logging,
};

#[derive(Parser, Debug)]
#[command(
    name = "tablegraph",
    version,
    about = "Turn annotated spreadsheet regions into knowledge-graph statements"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[arg(long, global = true, help = "Print Prometheus metrics to stderr on exit")]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate statements for one sheet
    Generate(GenerateArgs),
    /// Parse a file and store every sheet in the cache
    WarmCache {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Remove cached results and sheet artifacts
    ClearCache {
        #[arg(value_name = "FILE", help = "Only purge the sheet artifacts of this file")]
        file: Option<PathBuf>,
    },
    /// Check an annotation file without generating anything
    Validate {
        #[arg(value_name = "ANNOTATION")]
        annotation: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,

    #[arg(long, help = "Sheet name; defaults to the first sheet of the file")]
    sheet: Option<String>,

    #[arg(long, short = 'a', value_name = "ANNOTATION")]
    annotation: PathBuf,

    #[arg(long = "wikifier", value_name = "CSV", help = "Item table CSV; may be repeated")]
    wikifiers: Vec<PathBuf>,

    #[arg(long, value_name = "JSON", help = "Previously saved item table")]
    item_table: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    start: usize,

    #[arg(long)]
    end: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    #[arg(long, default_value = "", help = "dataset_id column of the canonical export")]
    dataset_id: String,

    #[arg(long, short = 'o', value_name = "FILE", help = "Write to a file instead of stdout")]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Canonical,
}

fn main() -> Result<()> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = Cli::parse();
    let config = EngineConfig::from_args(cli.config)?;
    let engine = Engine::new(config);

    let result = run(&engine, cli.command);

    if cli.print_metrics {
        eprintln!("{}", METRICS.encode());
    }
    result
}

fn run(engine: &Engine, command: Command) -> Result<()> {
    match command {
        Command::Generate(args) => generate(engine, args),
        Command::WarmCache { file } => {
            let sheets = engine.warm(&file)?;
            for sheet in sheets {
                println!("{sheet}");
            }
            Ok(())
        }
        Command::ClearCache { file } => {
            let removed = engine.clear_cache(file.as_deref())?;
            println!("removed {removed} cache files");
            Ok(())
        }
        Command::Validate { annotation } => {
            let annotation = Annotation::load(&annotation)?;
            annotation.validate()?;
            println!("annotation is valid ({} regions)", annotation.regions().len());
            Ok(())
        }
    }
}

fn generate(engine: &Engine, args: GenerateArgs) -> Result<()> {
    let annotation = Annotation::load(&args.annotation)?;

    let mut wikifier = match &args.item_table {
        Some(path) => Wikifier::load(path)?,
        None => Wikifier::new(),
    };
    for path in &args.wikifiers {
        let report = wikifier.add_file(path)?;
        if !report.is_empty() {
            eprintln!("{}: {} entries overwritten", path.display(), report.len());
        }
    }

    let sheet = match args.sheet {
        Some(sheet) => sheet,
        None => first_sheet(engine, &args.file)?,
    };
    let window = match args.end {
        Some(end) => Window::new(args.start, end),
        None => Window {
            start: args.start,
            end: None,
        },
    };

    let output = engine.generate(
        &args.file,
        &sheet,
        &annotation,
        wikifier.item_table(),
        window,
    )?;
    let errors: usize = output.result.errors.values().map(Vec::len).sum();
    tracing::info!(
        statements = output.result.statements.len(),
        errors,
        cache = %output.cache,
        "generate finished"
    );

    let rendered = match args.format {
        OutputFormat::Json => to_json(&output.result.statements, &output.result.errors)?,
        OutputFormat::Canonical => {
            let options = CanonicalOptions {
                dataset_id: args.dataset_id,
                ..CanonicalOptions::default()
            };
            engine.export_canonical(&output.result.statements, &options)?
        }
    };
    match &args.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn first_sheet(engine: &Engine, file: &Path) -> Result<String> {
    engine
        .warm(file)?
        .into_iter()
        .next()
        .with_context(|| format!("{} has no sheets", file.display()))
}
