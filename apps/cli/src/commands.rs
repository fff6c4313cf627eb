//! CLI command definitions, routing, and tracing setup.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bcorag_core::{
    Diagnostics, DocumentLog, DomainQueryOrchestrator, DomainRegistry, RUN_END, ScriptedSelector,
    SessionContext, SessionLog, TracingLog, run_domain_loop,
};
use bcorag_index::{VectorIndex, build_index, load_document};
use bcorag_shared::{
    AppConfig, IndexSettings, SessionMode, config_dir, init_config, validate_api_key,
};
use bcorag_storage::EmbeddingCache;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};

use crate::prompt::{StdinSelector, pick_paper, spinner};

/// Domains used when the config names no domains file.
const BUNDLED_DOMAINS: &str = include_str!("../assets/domains.toml");

/// Run-level log file name inside the log directory.
const RUN_LOG_FILE: &str = "bcorag.log";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// BCO-RAG: generate BioCompute Object domains from a paper.
#[derive(Parser)]
#[command(
    name = "bcorag",
    version,
    about = "Generate BioCompute Object domains from a research paper with retrieval-augmented generation.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Session mode flag.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ModeArg {
    Production,
    Debug,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Production => SessionMode::Production,
            ModeArg::Debug => SessionMode::Debug,
        }
    }
}

/// Options shared by every command that opens a session.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct SessionArgs {
    /// Session mode (debug keeps a token ledger and logs prompts).
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Chat model override.
    #[arg(long)]
    pub llm: Option<String>,

    /// Embedding model override.
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Output root directory override.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Domains file override (TOML `[[domains]]` list).
    #[arg(long)]
    pub domains_file: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Index a paper and generate domains interactively.
    Run {
        /// Paper to index. Prompts from the papers directory when omitted.
        #[arg(short, long)]
        paper: Option<PathBuf>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Index a paper and generate the given domains without prompting.
    Generate {
        /// Paper to index.
        #[arg(short, long)]
        paper: PathBuf,

        /// Domain names or codes, in order (repeatable).
        #[arg(short, long = "domain", required = true)]
        domains: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// List the registered domains.
    Domains {
        /// Domains file override.
        #[arg(long)]
        domains_file: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

impl Command {
    /// Whether this command runs a session and so appends to the run log.
    fn runs_session(&self) -> bool {
        matches!(self, Self::Run { .. } | Self::Generate { .. })
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Session commands also append plain-text entries to `{log_dir}/bcorag.log`.
pub(crate) fn init_tracing(cli: &Cli, config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer, fmt};

    let filter = match cli.verbose {
        0 => "bcorag=info",
        1 => "bcorag=debug",
        _ => "bcorag=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let console = match cli.log_format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let run_log = if cli.command.runs_session() {
        open_run_log(Path::new(&config.defaults.log_dir))
    } else {
        None
    };
    let file = run_log.map(|f| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(f))
            .boxed()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();
}

fn open_run_log(log_dir: &Path) -> Option<std::fs::File> {
    let opened = std::fs::create_dir_all(log_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(RUN_LOG_FILE))
    });
    match opened {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("warning: cannot open run log in '{}': {e}", log_dir.display());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Command::Run { paper, session } => cmd_run(config, paper, session).await,
        Command::Generate {
            paper,
            domains,
            session,
        } => cmd_generate(config, paper, domains, session).await,
        Command::Domains { domains_file } => cmd_domains(&config, domains_file.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

async fn cmd_run(config: AppConfig, paper: Option<PathBuf>, args: SessionArgs) -> Result<()> {
    info!("################ RUN START ################");

    let paper = match paper {
        Some(p) => p,
        None => match pick_paper(Path::new(&config.defaults.papers_dir))? {
            Some(p) => p,
            None => return graceful_exit(),
        },
    };

    let orchestrator = open_session(config, &paper, &args).await?;
    let mut selector = StdinSelector::new();
    run_domain_loop(&orchestrator, &mut selector).await?;

    graceful_exit()
}

async fn cmd_generate(
    config: AppConfig,
    paper: PathBuf,
    domains: Vec<String>,
    args: SessionArgs,
) -> Result<()> {
    info!("################ RUN START ################");

    let orchestrator = open_session(config, &paper, &args).await?;
    let mut selector = ScriptedSelector::new(domains);
    let summary = run_domain_loop(&orchestrator, &mut selector).await?;

    for token in selector.unrecognized() {
        warn!(token = %token, "skipped unrecognized domain");
    }
    for domain in &summary.generated {
        println!("Successfully generated the {domain} domain.");
    }
    info!("################ {RUN_END} ################");

    if summary.failed.is_empty() {
        Ok(())
    } else {
        Err(eyre!("failed to generate: {}", summary.failed.join(", ")))
    }
}

fn cmd_domains(config: &AppConfig, domains_file: Option<&Path>) -> Result<()> {
    let registry = load_registry(config, domains_file)?;
    for d in registry.all() {
        println!("  [{:>3}] {:<12} {}", d.selection_code, d.name, d.user_label);
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    if let Err(e) = validate_api_key(config) {
        println!("warning: {e}");
    }
    Ok(())
}

fn graceful_exit() -> Result<()> {
    info!("################ {RUN_END} ################");
    println!("Exiting...");
    Ok(())
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

/// Apply CLI overrides on top of the loaded config.
fn apply_overrides(mut config: AppConfig, args: &SessionArgs) -> AppConfig {
    if let Some(mode) = args.mode {
        config.defaults.mode = mode.into();
    }
    if let Some(llm) = &args.llm {
        config.openai.llm = llm.clone();
    }
    if let Some(model) = &args.embedding_model {
        config.openai.embedding_model = model.clone();
    }
    if let Some(out) = &args.out {
        config.defaults.output_dir = out.to_string_lossy().to_string();
    }
    if let Some(file) = &args.domains_file {
        config.domains_file = Some(file.to_string_lossy().to_string());
    }
    config
}

/// Registry from the override, the configured domains file, or the bundled set.
fn load_registry(config: &AppConfig, override_file: Option<&Path>) -> Result<DomainRegistry> {
    let file = override_file
        .map(Path::to_path_buf)
        .or_else(|| config.domains_file.as_ref().map(PathBuf::from));

    let registry = match file {
        Some(path) => DomainRegistry::from_file(&path)?,
        None => DomainRegistry::from_toml_str(BUNDLED_DOMAINS)?,
    };
    Ok(registry)
}

/// Load the paper, build its index, and wire up the orchestrator.
async fn open_session(
    config: AppConfig,
    paper: &Path,
    args: &SessionArgs,
) -> Result<DomainQueryOrchestrator<VectorIndex>> {
    let config = apply_overrides(config, args);
    let mode = config.defaults.mode;

    let registry = load_registry(&config, None)?;
    let settings = IndexSettings::from_config(&config)?;
    let document = load_document(paper)?;

    let log_dir = Path::new(&config.defaults.log_dir);
    let log: Arc<dyn SessionLog> = match DocumentLog::open(log_dir, &document.identity) {
        Ok(doc_log) => Arc::new(doc_log),
        Err(e) => {
            warn!(error = %e, "document log unavailable, logging to the console only");
            Arc::new(TracingLog)
        }
    };
    log.info("RUN START");
    if mode.is_debug() {
        log.info(&format!(
            "User selections:\n\tfilename: '{}'\n\tfilepath: '{}'\n\tllm: '{}'\n\tembedding_model: '{}'\n\tmode: '{}'",
            document.identity,
            document.path.display(),
            settings.llm,
            settings.embedding_model,
            mode,
        ));
    }

    let cache = if config.retrieval.cache_embeddings {
        open_cache(&settings.embedding_model).await
    } else {
        None
    };

    let progress = spinner(format!("Indexing {}...", document.identity));
    let built = build_index(&document, &settings, cache.as_ref()).await;
    progress.finish_and_clear();
    let (index, stats) = built.inspect_err(|e| log.error(&format!("Indexing failed: {e}")))?;

    log.info(&format!(
        "Indexed {} chunks ({} from cache, {} embedding tokens)",
        stats.chunks, stats.cache_hits, stats.embedding_tokens
    ));

    let output_root = PathBuf::from(&config.defaults.output_dir);
    std::fs::create_dir_all(&output_root)
        .map_err(|e| eyre!("cannot create output directory '{}': {e}", output_root.display()))?;

    let diagnostics = if mode.is_debug() {
        Diagnostics::enabled()
    } else {
        Diagnostics::Disabled
    };

    let context = SessionContext {
        document_identity: document.identity.clone(),
        index,
        diagnostics,
        output_root,
    };

    let orchestrator = DomainQueryOrchestrator::new(registry, context, log)?
        .with_query_timeout(Duration::from_secs(config.openai.query_timeout_secs));

    info!(
        document = %document.identity,
        session_dir = %orchestrator.store().session_dir().display(),
        mode = %mode,
        "session ready"
    );

    Ok(orchestrator)
}

/// Open the embedding cache under the config directory, or run without one.
async fn open_cache(embedding_model: &str) -> Option<EmbeddingCache> {
    let path = match config_dir() {
        Ok(dir) => dir.join("cache").join("embeddings.db"),
        Err(e) => {
            warn!(error = %e, "embedding cache disabled");
            return None;
        }
    };
    match EmbeddingCache::open(&path).await {
        Ok(cache) => {
            match cache.count(embedding_model).await {
                Ok(cached) => info!(path = %path.display(), cached, "embedding cache opened"),
                Err(e) => warn!(error = %e, "could not count cached embeddings"),
            }
            Some(cache)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "embedding cache disabled");
            None
        }
    }
}
