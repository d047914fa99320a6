use scriptrag::app::AppContext;
use scriptrag::cli::{Cli, Commands, ConfigAction};
use scriptrag::config::{Config, ConfigValidator};
use scriptrag::documents;
use scriptrag::error::{Result, ScriptRagError};
use scriptrag::storage::MetadataFilter;
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::PathBuf;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    let config_path = cli.config;
    let profile = cli.profile;

    // Handle commands
    match cli.command {
        Commands::Ingest { dir, force } => {
            cmd_ingest(load_config(config_path, profile)?, dir, force)?;
        }
        Commands::Chunk { dir, force } => {
            cmd_chunk(load_config(config_path, profile)?, dir, force)?;
        }
        Commands::Embed { force } => {
            cmd_embed(load_config(config_path, profile)?, force)?;
        }
        Commands::Ask {
            question,
            top_k,
            show_context,
        } => {
            cmd_ask(load_config(config_path, profile)?, &question, top_k, show_context)?;
        }
        Commands::Repl => {
            cmd_repl(load_config(config_path, profile)?)?;
        }
        Commands::Search { query, top_k, json } => {
            cmd_search(load_config(config_path, profile)?, &query, top_k, json)?;
        }
        Commands::Inspect {
            title,
            with_vectors,
        } => {
            cmd_inspect(load_config(config_path, profile)?, &title, with_vectors)?;
        }
        Commands::Serve { bind } => {
            cmd_serve(load_config(config_path, profile)?, bind)?;
        }
        Commands::Stats => {
            cmd_stats(load_config(config_path, profile)?)?;
        }
        Commands::Config { action } => {
            cmd_config(config_path, profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "scriptrag=debug"
    } else {
        "scriptrag=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Run an async command body on a fresh runtime
fn block_on<F: Future<Output = Result<T>>, T>(future: F) -> Result<T> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| ScriptRagError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    rt.block_on(future)
}

fn cmd_ingest(config: Config, dir: Option<PathBuf>, force: bool) -> Result<()> {
    let app = AppContext::open(&config)?;
    let dir = dir.unwrap_or_else(|| app.config().storage.extracted_dir());
    let docs = documents::load_dir(&dir)?;
    println!("Ingesting {} documents from {}", docs.len(), dir.display());

    let ingestor = app.ingestor(app.embedder()?)?;
    let report = block_on(ingestor.ingest_all(&docs, force))?;

    println!("✓ {}", report);
    Ok(())
}

fn cmd_chunk(config: Config, dir: Option<PathBuf>, force: bool) -> Result<()> {
    let app = AppContext::open(&config)?;
    let dir = dir.unwrap_or_else(|| app.config().storage.extracted_dir());
    let docs = documents::load_dir(&dir)?;

    let stage = app.chunking_stage()?;
    let report = stage.chunk_all(&docs, force)?;

    println!(
        "✓ Chunked {} of {} documents into {}",
        report.documents_chunked,
        docs.len(),
        stage.chunk_store().dir().display()
    );
    Ok(())
}

fn cmd_embed(config: Config, force: bool) -> Result<()> {
    let app = AppContext::open(&config)?;
    let ingestor = app.ingestor(app.embedder()?)?;
    let report = block_on(ingestor.embed_all(force))?;

    println!("✓ {}", report);
    Ok(())
}

fn cmd_ask(config: Config, question: &str, top_k: Option<usize>, show_context: bool) -> Result<()> {
    let app = AppContext::open(&config)?;
    let synthesizer = app.synthesizer(app.embedder()?, app.generator()?);
    let answer = block_on(synthesizer.synthesize_detailed(question, top_k))?;

    if show_context {
        for (i, passage) in answer.passages.iter().enumerate() {
            println!("── Passage {} ──\n{}\n", i + 1, passage);
        }
    }
    println!("{}", answer.text);
    Ok(())
}

fn cmd_repl(config: Config) -> Result<()> {
    let app = AppContext::open(&config)?;
    let synthesizer = app.synthesizer(app.embedder()?, app.generator()?);
    let rt = tokio::runtime::Runtime::new().map_err(|e| ScriptRagError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    println!("Ask a question about the scripts (or type 'exit' to quit).");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|e| ScriptRagError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })?;
        let query = line.trim();

        if query.eq_ignore_ascii_case("exit") {
            println!("Exiting...");
            break;
        }
        if query.is_empty() {
            continue;
        }

        // A failed question should not end the session
        match rt.block_on(synthesizer.synthesize(query)) {
            Ok(answer) => println!("\n{}", answer),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

fn cmd_search(config: Config, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let app = AppContext::open(&config)?;
    let retriever = app.retriever(app.embedder()?);
    let matches = block_on(retriever.retrieve_matches(query, top_k, None))?;

    if json {
        let results: Vec<serde_json::Value> = matches
            .iter()
            .enumerate()
            .map(|(rank, m)| {
                serde_json::json!({
                    "rank": rank + 1,
                    "id": m.id,
                    "title": m.metadata.title,
                    "distance": m.distance,
                    "document": m.document,
                })
            })
            .collect();
        let out = serde_json::to_string_pretty(&results).map_err(|e| ScriptRagError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No matching passages.");
        return Ok(());
    }

    for (rank, m) in matches.iter().enumerate() {
        println!("{}. {} (distance {:.4})", rank + 1, m.id, m.distance);
        println!("{}\n", m.document);
    }
    Ok(())
}

fn cmd_inspect(config: Config, title: &str, with_vectors: bool) -> Result<()> {
    let app = AppContext::open(&config)?;
    let records = app
        .index()
        .get(&MetadataFilter::title(title), with_vectors)?;

    if records.is_empty() {
        println!("No records for '{}'", title);
        return Ok(());
    }

    for record in &records {
        println!("{} ({} chars)", record.id, record.document.chars().count());
        if let Some(vector) = &record.vector {
            let preview: Vec<String> = vector.iter().take(8).map(|v| format!("{:.4}", v)).collect();
            println!("  vector[{}]: [{}, ...]", vector.len(), preview.join(", "));
        }
    }
    println!("{} records", records.len());
    Ok(())
}

fn cmd_serve(config: Config, bind: Option<String>) -> Result<()> {
    let app = AppContext::open(&config)?;
    let bind = bind.unwrap_or_else(|| app.config().server.bind.clone());
    let synthesizer = app.synthesizer(app.embedder()?, app.generator()?);
    let state = app.server_state(synthesizer);

    block_on(scriptrag::server::serve(state, &bind))
}

fn cmd_stats(config: Config) -> Result<()> {
    let app = AppContext::open(&config)?;
    let index = app.index();

    println!("Collection: {}", index.collection());
    println!("  Records:    {}", index.count()?);
    println!("  Documents:  {}", app.ledger().count()?);
    match index.dimension()? {
        Some(dimension) => println!("  Dimension:  {}", dimension),
        None => println!("  Dimension:  (empty index)"),
    }

    for (title, count) in index.titles()? {
        println!("    {:<40} {}", title, count);
    }
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

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ScriptRagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
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
            "Config file not found, using defaults. Run 'scriptrag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
