use clap::{Parser, Subcommand};
use crawlconf::api::{Api, Request, Response};
use crawlconf::config::{ConfigId, ConfigLoader, DocumentValidator};
use crawlconf::coordinator::Coordinator;
use crawlconf::output::SinkFactory;
use crawlconf::settings::Settings;
use crawlconf::spider::HttpSpider;
use crawlconf::store::{ConfigStore, SqliteRepository};
use crawlconf::template::{Overrides, TemplateRegistry};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "crawlconf")]
#[command(version = "0.1.0")]
#[command(about = "Manage and run declarative crawl configurations", long_about = None)]
struct Cli {
    /// Settings file (TOML/YAML/JSON); defaults to ./crawlconf.*
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration document without storing it
    Check {
        /// Path to the document (JSON/YAML/TOML)
        file: PathBuf,
    },
    /// List the built-in templates
    Templates,
    /// Produce a draft document from a template
    Instantiate {
        key: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        website_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Write the draft here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store a new configuration
    Create { file: PathBuf },
    /// Replace the editable fields of a configuration
    Update { id: ConfigId, file: PathBuf },
    /// List stored configurations
    List,
    /// Show one configuration
    Show { id: ConfigId },
    Activate { id: ConfigId },
    Deactivate { id: ConfigId },
    Delete { id: ConfigId },
    /// Run a configuration once
    Run {
        id: ConfigId,

        /// Show a spinner while the run is in progress (stderr)
        #[arg(short, long)]
        progress: bool,
    },
    /// Show run metrics of this process
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.settings.as_deref())?;

    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", &settings.log_level);
        }
    }
    let logger = env_logger::Builder::from_default_env().build();
    let multi = MultiProgress::new();
    let progress = matches!(cli.command, Commands::Run { progress: true, .. });
    if progress {
        indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init()?;
    } else {
        let level = logger.filter();
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
    }

    let api = build_api(&settings).await?;

    let response = match cli.command {
        Commands::Check { file } => match load_document(&api, &file) {
            Ok(document) => api.handle(Request::ValidateConfig { document }).await,
            Err(response) => response,
        },
        Commands::Templates => api.handle(Request::ListTemplates).await,
        Commands::Instantiate {
            key,
            name,
            website_name,
            description,
            output,
        } => {
            let overrides = Overrides {
                name,
                website_name,
                description,
            };
            let response = api
                .handle(Request::InstantiateTemplate { key, overrides })
                .await;
            if let (Some(path), true) = (output, response.is_success()) {
                std::fs::write(&path, serde_json::to_string_pretty(&response.body)?)?;
                log::info!("Draft written to {}", path.display());
                return Ok(());
            }
            response
        }
        Commands::Create { file } => match load_document(&api, &file) {
            Ok(document) => api.handle(Request::CreateConfig { document }).await,
            Err(response) => response,
        },
        Commands::Update { id, file } => match load_document(&api, &file) {
            Ok(document) => api.handle(Request::UpdateConfig { id, document }).await,
            Err(response) => response,
        },
        Commands::List => api.handle(Request::ListConfigs).await,
        Commands::Show { id } => api.handle(Request::GetConfig { id }).await,
        Commands::Activate { id } => api.handle(Request::SetActive { id, active: true }).await,
        Commands::Deactivate { id } => {
            api.handle(Request::SetActive { id, active: false }).await
        }
        Commands::Delete { id } => api.handle(Request::DeleteConfig { id }).await,
        Commands::Run { id, progress } => {
            let spinner = progress.then(|| {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.set_message(format!("Running configuration {}", id));
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            });

            let response = api.handle(Request::TriggerRun { id }).await;

            if let Some(pb) = spinner {
                let verdict = if response.is_success() { "✅" } else { "❌" };
                pb.finish_with_message(format!("{} Configuration {} finished", verdict, id));
            }
            response
        }
        Commands::Metrics => api.handle(Request::Metrics).await,
    };

    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn build_api(settings: &Settings) -> anyhow::Result<Api> {
    let validator = DocumentValidator::new(settings.sink_kinds());

    let (store, pool) = match settings.database_url() {
        Some(url) => {
            log::debug!("Opening configuration database {}", url);
            let repository = SqliteRepository::connect(url).await?;
            let pool = repository.pool().clone();
            let store = ConfigStore::open(Arc::new(repository), validator).await?;
            (store, Some(pool))
        }
        None => {
            log::warn!("No database configured; configurations are kept in memory");
            (ConfigStore::in_memory(validator), None)
        }
    };

    let spider = HttpSpider::new(
        settings.request_timeout(),
        settings.run_timeout(),
        SinkFactory::new(settings.output_dir(), pool),
    );
    let coordinator = Coordinator::new(Arc::new(store), Arc::new(spider), None);
    Ok(Api::new(Arc::new(coordinator), TemplateRegistry::builtin()))
}

fn load_document(api: &Api, path: &Path) -> Result<serde_json::Value, Response> {
    log::info!("Loading document from {:?}", path);
    ConfigLoader::load_validated(path, api.validator())
        .map(|(document, _)| document)
        .map_err(|e| Response::error(&e))
}
