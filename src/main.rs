use coursemate::cli::{Cli, Commands, ConfigAction};
use coursemate::config::{Config, ConfigValidator};
use coursemate::error::{CourseMateError, Result};
use coursemate::ingest::IndexWriteFailure;
use coursemate::model::DocumentSource;
use coursemate::retrieval::{SearchMode, SearchResponse};
use coursemate::Engine;
use serde::Serialize;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Config { action } => cmd_config(cli.config, cli.profile, action),
        command => {
            let config = load_config(cli.config, cli.profile)?;
            let rt = tokio::runtime::Runtime::new().map_err(|e| CourseMateError::Io {
                source: e,
                context: "Failed to create tokio runtime".to_string(),
            })?;
            rt.block_on(run(config, command))
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("coursemate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coursemate=info"))
    };

    // stdout is reserved for command output (and --json)
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: Config, command: Commands) -> Result<()> {
    let engine = Engine::open(&config).await?;

    match command {
        Commands::Ingest {
            file,
            title,
            pdf,
            json,
        } => cmd_ingest(&engine, &file, title, pdf, json).await,
        Commands::Search {
            query,
            k,
            mode,
            json,
        } => cmd_search(&engine, &query, k, mode, json).await,
        Commands::Reindex { document } => {
            let report = engine.reindex(document).await?;
            println!(
                "✓ Reindexed {} of {} pending index writes",
                report.indexed, report.attempted
            );
            print_warnings(&report.warnings);
            Ok(())
        }
        Commands::Status { json } => {
            let status = engine.status()?;
            if json {
                return print_json(&status);
            }
            println!("CourseMate Status");
            println!("=================");
            println!("Documents:       {}", status.documents);
            println!("Chunks:          {}", status.chunks);
            println!("Dense entries:   {}", status.dense_entries);
            println!("Lexical entries: {}", status.lexical_entries);
            println!(
                "Index writes:    {} pending, {} failed",
                status.pending_writes, status.failed_writes
            );
            println!("Store size:      {}", status.store_size);
            println!(
                "Embeddings:      {} ({}D)",
                status.embedding_model, status.vector_dim
            );
            println!("Failure policy:  {:?}", status.failure_policy);
            Ok(())
        }
        Commands::Health => print_json(&engine.health()?),
        Commands::Config { .. } => Ok(()),
    }
}

async fn cmd_ingest(
    engine: &Engine,
    file: &Path,
    title: Option<String>,
    pdf: bool,
    json: bool,
) -> Result<()> {
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let title = title
        .or_else(|| {
            file.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "untitled".to_string());

    let is_pdf = pdf
        || file
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let read_err = |e: std::io::Error| CourseMateError::Io {
        source: e,
        context: format!("Failed to read {}", file.display()),
    };
    let source = if is_pdf {
        DocumentSource::Pdf {
            title,
            source: file_name,
            bytes: std::fs::read(file).map_err(read_err)?,
        }
    } else {
        DocumentSource::Text {
            title,
            source: file_name,
            text: std::fs::read_to_string(file).map_err(read_err)?,
        }
    };

    let report = engine.ingest(&source).await?;
    if json {
        return print_json(&report);
    }

    println!(
        "✓ Ingested document {} ({} chunks)",
        report.document_id, report.chunk_count
    );
    print_warnings(&report.warnings);
    Ok(())
}

async fn cmd_search(
    engine: &Engine,
    query: &str,
    k: Option<usize>,
    mode: SearchMode,
    json: bool,
) -> Result<()> {
    let response = engine.search(query, k, mode).await?;
    if json {
        return print_json(&response);
    }

    print_response(&response);
    Ok(())
}

fn print_response(response: &SearchResponse) {
    if response.is_degraded() {
        let names: Vec<&str> = response.degraded.iter().map(|b| b.as_str()).collect();
        println!("⚠ Degraded: {} index unavailable\n", names.join(", "));
    }
    if response.hits.is_empty() {
        println!("No results");
        return;
    }

    for (idx, hit) in response.hits.iter().enumerate() {
        let location = match (hit.page, hit.line_start, hit.line_end) {
            (Some(page), Some(start), Some(end)) => format!("p.{} l.{}-{}", page, start, end),
            _ => "text".to_string(),
        };
        println!(
            "{}. [doc {} chunk {} | {}] score {:.6}",
            idx + 1,
            hit.doc_id,
            hit.id,
            location,
            hit.score
        );
        if let Some(similarity) = hit.dense_similarity {
            println!("   similarity {:.4}", similarity);
        }
        for line in hit.text.lines() {
            println!("   {}", line);
        }
        println!();
    }

    if !response.missing_ids.is_empty() {
        println!(
            "Note: {} ranked chunk(s) had no stored row and were skipped",
            response.missing_ids.len()
        );
    }
}

fn print_warnings(warnings: &[IndexWriteFailure]) {
    if warnings.is_empty() {
        return;
    }
    println!("⚠ {} index write(s) failed:", warnings.len());
    for warning in warnings {
        println!("  {}", CourseMateError::from(warning.clone()));
    }
    println!("  Run `coursemate reindex` to retry them.");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CourseMateError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CourseMateError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'coursemate config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
