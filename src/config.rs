use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CACHE_CAPACITY: usize = 64;
const DEFAULT_CACHE_DIRECTORY: &str = ".tablegraph/cache";

/// Settings threaded into every cache, the generator and the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// When false the sheet cache is bypassed and nothing is written to disk.
    pub cache_enabled: bool,
    pub cache_directory: PathBuf,
    /// SPARQL endpoint for property types and labels. `None` disables the
    /// remote resolver.
    pub endpoint: Option<String>,
    /// Entries kept by the in-memory result cache.
    pub cache_capacity: usize,
    pub warn_for_empty_cells: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_directory: PathBuf::from(DEFAULT_CACHE_DIRECTORY),
            endpoint: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            warn_for_empty_cells: false,
        }
    }
}

impl EngineConfig {
    /// Merges the config file, `TABLEGRAPH_*` environment and CLI flags.
    /// Environment values reach us through clap, so a flag beats its
    /// variable and both beat the file.
    pub fn from_args(args: ConfigArgs) -> Result<Self> {
        let ConfigArgs {
            config,
            cache_enabled: cli_cache_enabled,
            cache_directory: cli_cache_directory,
            endpoint: cli_endpoint,
            cache_capacity: cli_cache_capacity,
            warn_empty_cells: cli_warn_empty_cells,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            cache_enabled: file_cache_enabled,
            cache_directory: file_cache_directory,
            endpoint: file_endpoint,
            cache_capacity: file_cache_capacity,
            warn_for_empty_cells: file_warn_empty_cells,
        } = file_config;

        let defaults = Self::default();

        // A relative cache directory from a file is anchored next to the file.
        let file_cache_directory = file_cache_directory.map(|dir| {
            match config.as_deref().and_then(Path::parent) {
                Some(parent) if dir.is_relative() => parent.join(dir),
                _ => dir,
            }
        });

        let endpoint = cli_endpoint
            .or(file_endpoint)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        let config = Self {
            cache_enabled: cli_cache_enabled
                .or(file_cache_enabled)
                .unwrap_or(defaults.cache_enabled),
            cache_directory: cli_cache_directory
                .or(file_cache_directory)
                .unwrap_or(defaults.cache_directory),
            endpoint,
            cache_capacity: cli_cache_capacity
                .or(file_cache_capacity)
                .unwrap_or(defaults.cache_capacity),
            warn_for_empty_cells: cli_warn_empty_cells
                .or(file_warn_empty_cells)
                .unwrap_or(defaults.warn_for_empty_cells),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.cache_capacity > 0, "cache capacity must be at least 1");
        if let Some(endpoint) = self.endpoint.as_deref() {
            let url = reqwest::Url::parse(endpoint)
                .with_context(|| format!("invalid endpoint URL {endpoint:?}"))?;
            anyhow::ensure!(
                matches!(url.scheme(), "http" | "https"),
                "endpoint {:?} must use http or https",
                endpoint
            );
        }
        Ok(())
    }

    pub fn sheets_directory(&self) -> PathBuf {
        self.cache_directory.join("sheets")
    }

    pub fn results_directory(&self) -> PathBuf {
        self.cache_directory.join("results")
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "TABLEGRAPH_CACHE_ENABLED",
        value_name = "BOOL",
        help = "Reuse sheet and result artifacts between runs",
        value_parser = clap::builder::BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,

    #[arg(
        long = "cache-dir",
        env = "TABLEGRAPH_CACHE_DIR",
        value_name = "DIR",
        help = "Directory holding cache artifacts",
        global = true
    )]
    pub cache_directory: Option<PathBuf>,

    #[arg(
        long,
        env = "TABLEGRAPH_ENDPOINT",
        value_name = "URL",
        help = "SPARQL endpoint used to look up property types and labels",
        global = true
    )]
    pub endpoint: Option<String>,

    #[arg(
        long,
        env = "TABLEGRAPH_CACHE_CAPACITY",
        value_name = "N",
        help = "Number of result sets kept in memory",
        value_parser = clap::value_parser!(usize),
        global = true
    )]
    pub cache_capacity: Option<usize>,

    #[arg(
        long,
        env = "TABLEGRAPH_WARN_EMPTY_CELLS",
        value_name = "BOOL",
        help = "Record a warning for every empty data cell",
        value_parser = clap::builder::BoolishValueParser::new(),
        global = true
    )]
    pub warn_empty_cells: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    cache_enabled: Option<bool>,
    cache_directory: Option<PathBuf>,
    endpoint: Option<String>,
    cache_capacity: Option<usize>,
    warn_for_empty_cells: Option<bool>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
