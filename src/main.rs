//! docsort command line.
//!
//! Usage:
//!   docsort process <FILES>...   Classify, rename and file scanned PDFs
//!   docsort check                Check the Ollama endpoint and installed models
//!   docsort config               Print the effective configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use docsort_lib::config::{self, ConfigError, ConfigStore};
use docsort_lib::pipeline::classification::{
    is_vision_model, ClassificationError, LlmClient, OllamaClient,
};
use docsort_lib::pipeline::processor::{build_processor, ProcessingError};
use docsort_lib::queue::{
    AddOutcome, ItemStatus, ProcessingQueue, QueueError, QueueItem, QueueListener,
};

#[derive(Parser)]
#[command(name = "docsort", version, about = "Classify, rename and file scanned PDFs")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = config::CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process the given PDF files one after another
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check that Ollama is reachable and the configured models are installed
    Check,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("{0} document(s) failed")]
    Failed(usize),

    #[error("Missing models: {0}")]
    MissingModels(String),
}

fn main() -> ExitCode {
    docsort_lib::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli.config.unwrap_or_else(config::default_config_path);
    let store = Arc::new(ConfigStore::load(&path)?);

    match cli.command {
        Command::Process { files } => process(store, files),
        Command::Check => check(&store),
        Command::Config => {
            print!("{}", store.snapshot().to_toml()?);
            Ok(())
        }
    }
}

fn process(store: Arc<ConfigStore>, files: Vec<PathBuf>) -> Result<(), CliError> {
    let processor = Arc::new(build_processor(store)?);
    let queue = ProcessingQueue::with_listener(processor, Arc::new(ConsoleListener::default()));

    let mut rejected = 0;
    for (file, outcome) in files.iter().zip(queue.add_files(&files)) {
        match outcome {
            Ok(AddOutcome::Added(_)) => {}
            Ok(AddOutcome::AlreadyQueued(_)) => {
                println!("{}: listed twice, processing once", file.display());
            }
            Err(e) => {
                eprintln!("{}: {e}", file.display());
                rejected += 1;
            }
        }
    }

    queue.start()?;
    while !queue.wait_idle(Duration::from_secs(1)) {}
    queue.stop();

    let stats = queue.stats();
    println!(
        "{} processed, {} failed, {} rejected",
        stats.completed, stats.failed, rejected
    );

    let failed = stats.failed + rejected;
    if failed > 0 {
        return Err(CliError::Failed(failed));
    }
    Ok(())
}

fn check(store: &ConfigStore) -> Result<(), CliError> {
    let snapshot = store.snapshot();
    let client = OllamaClient::from_config(&snapshot.ollama)?;
    let models = client.list_models()?;
    println!("Ollama reachable at {} ({} models)", client.base_url(), models.len());
    for model in &models {
        println!("  {}", model.name);
    }

    let installed = |wanted: &str| {
        models
            .iter()
            .any(|m| m.name == wanted || m.name.split(':').next() == Some(wanted))
    };
    let mut missing = Vec::new();
    for (role, name) in [
        ("vision", &snapshot.ollama.vision_model),
        ("text", &snapshot.ollama.text_model),
        ("ocr", &snapshot.ollama.ocr_model),
    ] {
        if !installed(name) {
            missing.push(format!("{name} ({role})"));
        } else if role != "text" && !is_vision_model(name) {
            println!("warning: {name} is used for images but does not look like a vision model");
        }
    }

    if missing.is_empty() {
        println!("All configured models are installed");
        Ok(())
    } else {
        Err(CliError::MissingModels(missing.join(", ")))
    }
}

/// Prints one line per step change and a final line per document.
#[derive(Default)]
struct ConsoleListener {
    last_step: Mutex<HashMap<Uuid, String>>,
}

impl QueueListener for ConsoleListener {
    fn on_item_changed(&self, item: &QueueItem) {
        let name = item
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match &item.status {
            ItemStatus::Pending => {}
            ItemStatus::Processing => {
                let Ok(mut last) = self.last_step.lock() else {
                    return;
                };
                if last.get(&item.id) != Some(&item.current_step) {
                    last.insert(item.id, item.current_step.clone());
                    println!(
                        "[{:>3.0}%] {name}: {}",
                        item.progress * 100.0,
                        item.current_step
                    );
                }
            }
            ItemStatus::Completed => {
                if let Some(result) = &item.result {
                    println!(
                        "{name} -> {} ({}, confidence {:.2})",
                        result.new_path.display(),
                        result.document.doc_type.as_str(),
                        result.confidence
                    );
                }
            }
            ItemStatus::Failed { error } => println!("{name} failed: {error}"),
        }
    }
}
