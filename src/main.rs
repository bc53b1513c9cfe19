use std::io::IsTerminal;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use mindmap_core::{IndexBackend, MindmapConfig, OutputFormat};
use mindmap_extract::pipeline::{MindMap, MindMapPipeline, QueryOutcome};
use mindmap_retrieval::docstore::{DocumentStore, SqliteDocumentStore};

const CONFIG_FILE: &str = ".mindmap.toml";
const DOC_PREVIEW_CHARS: usize = 500;

#[derive(Parser)]
#[command(
    name = "mindmap",
    version,
    about = "Turn your documents into question-driven knowledge mind maps",
    long_about = "Ingest documents into a vector index, then ask questions: the most relevant\n\
                  chunks are sent to a language model, which extracts a knowledge graph that\n\
                  is laid out and rendered as a mind map.\n\n\
                  Examples:\n  \
                    mindmap init                               Create a .mindmap.toml config file\n  \
                    mindmap ingest --title 'Notes' --file a.md  Index a document\n  \
                    mindmap query 'How does X relate to Y?'    Build a mind map\n  \
                    mindmap query 'X?' --format svg --out x.svg  Save the mind map as SVG\n  \
                    mindmap docs                               Browse ingested documents\n  \
                    mindmap doctor                             Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .mindmap.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text  Human-readable summaries (default)\n  \
                         json  Machine-readable JSON with camelCase keys\n  \
                         svg   Standalone SVG image (query subcommand only)"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and index a document
    #[command(long_about = "Chunk, embed and index a document.\n\n\
        Reads the document from a file or stdin, stores it, splits it into\n\
        overlapping chunks, embeds each chunk and upserts the vectors.\n\n\
        Examples:\n  mindmap ingest --file paper.txt\n  cat notes.md | mindmap ingest --title 'Notes'")]
    Ingest {
        /// Document title (default: the file name)
        #[arg(long)]
        title: Option<String>,

        /// Read the document from a file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Re-embed and re-index a stored document
    #[command(long_about = "Re-embed and re-index a stored document.\n\n\
        Chunk ids are deterministic, so this replaces the document's vectors\n\
        in place. Use it to repair a document whose ingest failed part way.")]
    Reindex {
        /// Document id as shown by `mindmap docs`
        document_id: i64,
    },
    /// Build a mind map that answers a question
    #[command(long_about = "Build a mind map that answers a question.\n\n\
        Retrieves the most relevant chunks, asks the language model for a\n\
        knowledge graph, lays it out and renders it.\n\n\
        Examples:\n  mindmap query 'What drives churn?'\n  mindmap query 'Who funds X?' --top-k 15 --max-nodes 25\n  mindmap query 'Overview' --format svg --out overview.svg")]
    Query {
        /// The question to answer
        question: String,

        /// Chunks to retrieve (5-20, default from config)
        #[arg(long)]
        top_k: Option<usize>,

        /// Maximum nodes in the mind map (10-30, default from config)
        #[arg(long)]
        max_nodes: Option<usize>,

        /// Write the result to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List ingested documents
    Docs,
    /// Create a default .mindmap.toml configuration file
    #[command(long_about = "Create a default .mindmap.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .mindmap.toml already exists.")]
    Init,
    /// Check your setup and environment
    #[command(long_about = "Check your setup and environment.\n\n\
        Runs diagnostics for the config file, API keys, vector index and\n\
        document store. Use --format json for machine-readable output.")]
    Doctor,
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("mindmap v{version}: knowledge mind maps from your documents\n");

    println!("Quick start:");
    println!("  mindmap init                         Create a .mindmap.toml config file");
    println!("  mindmap ingest --file notes.md       Index a document");
    println!("  mindmap query 'What is X?'           Build a mind map\n");

    println!("All commands:");
    println!("  ingest   Chunk, embed and index a document");
    println!("  reindex  Re-index a stored document");
    println!("  query    Build a mind map that answers a question");
    println!("  docs     List ingested documents");
    println!("  doctor   Check your setup and environment");
    println!("  init     Create default configuration\n");

    println!("Run 'mindmap <command> --help' for details.");
}

fn load_config(path: Option<&Path>) -> Result<MindmapConfig> {
    let mut config = match path {
        Some(path) => MindmapConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                MindmapConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err(format!("loading {CONFIG_FILE}"))?
            } else {
                MindmapConfig::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

fn read_document(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .into_diagnostic()
                .wrap_err("reading stdin")?;
            Ok(input)
        }
    }
}

fn spinner(message: &'static str) -> Result<Option<indicatif::ProgressBar>> {
    if !std::io::stderr().is_terminal() {
        return Ok(None);
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .into_diagnostic()?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(Some(pb))
}

fn finish(spinner: Option<indicatif::ProgressBar>, message: &'static str) {
    if let Some(pb) = spinner {
        pb.finish_with_message(message);
    }
}

fn write_output(out: Option<&Path>, content: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, content)
                .into_diagnostic()
                .wrap_err(format!("writing {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

fn mind_map_text(map: &MindMap) -> String {
    let mut text = format!("Mind map: {}\n\n", map.question);

    text.push_str(&format!("Nodes ({}):\n", map.graph.nodes().len()));
    for node in map.graph.nodes() {
        text.push_str(&format!("  [{}] {} ({})\n", node.node_type, node.label, node.id));
    }

    text.push_str(&format!("\nEdges ({}):\n", map.graph.edges().len()));
    for edge in map.graph.edges() {
        let label_of = |id: &str| {
            map.graph
                .node(id)
                .map(|n| n.label.clone())
                .unwrap_or_else(|| id.to_string())
        };
        let relation = if edge.label.is_empty() { "-" } else { edge.label.as_str() };
        text.push_str(&format!(
            "  {} --{relation}--> {}\n",
            label_of(&edge.source),
            label_of(&edge.target)
        ));
    }

    text.push_str(&format!("\nSources ({} chunks):\n", map.sources.len()));
    for hit in &map.hits {
        match &hit.metadata {
            Some(meta) => text.push_str(&format!(
                "  {} #{} (score {:.3})\n",
                meta.document_title, meta.chunk_index, hit.score
            )),
            None => text.push_str(&format!("  {} (score {:.3})\n", hit.id, hit.score)),
        }
    }
    text
}

async fn run_query(
    pipeline: &MindMapPipeline,
    config: &MindmapConfig,
    question: &str,
    top_k: Option<usize>,
    max_nodes: Option<usize>,
    out: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let max_nodes = max_nodes.unwrap_or(config.retrieval.max_nodes);

    let pb = spinner("Building mind map...")?;
    let outcome = pipeline
        .query_with(question, top_k, max_nodes)
        .await
        .inspect_err(|_| {
            if let Some(pb) = &pb {
                pb.finish_with_message("Failed");
            }
        })
        .into_diagnostic()?;
    finish(pb, "Done");

    match (outcome, format) {
        (QueryOutcome::NoHits, OutputFormat::Json) => {
            let json = serde_json::json!({ "status": "noHits" });
            write_output(out, &serde_json::to_string_pretty(&json).into_diagnostic()?)?;
        }
        (QueryOutcome::NoHits, _) => {
            eprintln!("warning: no relevant chunks found. Ingest documents with 'mindmap ingest' first.");
        }
        (QueryOutcome::NoGraph { failure, hits }, OutputFormat::Json) => {
            let json = serde_json::json!({
                "status": "noGraph",
                "reason": failure.to_string(),
                "serviceError": failure.is_service_error(),
                "hits": hits,
            });
            write_output(out, &serde_json::to_string_pretty(&json).into_diagnostic()?)?;
        }
        (QueryOutcome::NoGraph { failure, .. }, _) => {
            eprintln!("warning: no graph could be built: {failure}");
        }
        (QueryOutcome::MindMap(map), OutputFormat::Json) => {
            let mut json = serde_json::to_value(&map).into_diagnostic()?;
            json["status"] = serde_json::json!("mindMap");
            write_output(out, &serde_json::to_string_pretty(&json).into_diagnostic()?)?;
        }
        (QueryOutcome::MindMap(map), OutputFormat::Svg) => {
            write_output(out, &map.scene.to_svg())?;
        }
        (QueryOutcome::MindMap(map), OutputFormat::Text) => {
            if map.graph.is_empty() {
                eprintln!("warning: the model returned an empty graph");
            }
            write_output(out, mind_map_text(&map).trim_end())?;
        }
    }
    Ok(())
}

fn run_docs(config: &MindmapConfig, format: OutputFormat) -> Result<()> {
    let store = SqliteDocumentStore::open(&config.store.path).into_diagnostic()?;
    let docs = store.list().into_diagnostic()?;

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = docs
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "title": d.title,
                        "createdAt": d.created_at,
                        "chars": d.content.chars().count(),
                        "preview": d.preview(DOC_PREVIEW_CHARS),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Svg => {
            miette::bail!(help = "use --format text or --format json", "svg output is only available for 'mindmap query'");
        }
        OutputFormat::Text => {
            if docs.is_empty() {
                println!("No documents. Add one with 'mindmap ingest'.");
                return Ok(());
            }
            for doc in &docs {
                println!(
                    "[{}] {} ({})",
                    doc.id,
                    doc.title,
                    doc.created_at.format("%Y-%m-%d %H:%M")
                );
                println!("{}\n", doc.preview(DOC_PREVIEW_CHARS));
            }
            println!("{} documents", docs.len());
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> String {
        let (sym, color) = match self.status {
            "pass" => ("\u{2713}", "32"),
            "fail" => ("\u{2717}", "31"),
            _ => ("~", "33"),
        };
        if use_color {
            format!("\x1b[{color}m{sym}\x1b[0m")
        } else {
            sym.to_string()
        }
    }
}

fn run_doctor(
    config: &MindmapConfig,
    config_path: &Path,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{} not found", config_path.display()),
            "run 'mindmap init' to create a default config",
        ));
    }

    match config.validate() {
        Ok(()) => checks.push(CheckResult::pass(
            "tunables",
            format!(
                "top_k {}, max_nodes {}, chunk_size {}, overlap {}",
                config.retrieval.top_k,
                config.retrieval.max_nodes,
                config.chunking.chunk_size,
                config.chunking.overlap
            ),
        )),
        Err(e) => checks.push(CheckResult::fail("tunables", e.to_string(), "fix the value in the config file")),
    }

    if config.llm.api_key.is_some() {
        checks.push(CheckResult::pass(
            "llm_api_key",
            format!("set (model: {})", config.llm.model),
        ));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            "OPENAI_API_KEY not set",
            format!("export OPENAI_API_KEY=... or set api_key in {CONFIG_FILE} [llm]"),
        ));
    }

    if config.embedding.api_key.is_some() {
        checks.push(CheckResult::pass(
            "embedding_api_key",
            format!(
                "set (model: {}, {} dims)",
                config.embedding.model, config.embedding.dimensions
            ),
        ));
    } else {
        checks.push(CheckResult::fail(
            "embedding_api_key",
            "OPENAI_API_KEY not set",
            format!("export OPENAI_API_KEY=... or set api_key in {CONFIG_FILE} [embedding]"),
        ));
    }

    match config.index.backend {
        IndexBackend::Upstash => {
            if config.index.url.is_some() && config.index.token.is_some() {
                checks.push(CheckResult::pass("vector_index", "upstash (url and token set)"));
            } else {
                checks.push(CheckResult::fail(
                    "vector_index",
                    "upstash url or token missing",
                    "export UPSTASH_VECTOR_URL and UPSTASH_VECTOR_TOKEN, or set backend = \"local\"",
                ));
            }
        }
        IndexBackend::Local => {
            if config.index.path.exists() {
                let detail = match mindmap_retrieval::local::LocalIndex::open(&config.index.path)
                    .and_then(|index| index.count())
                {
                    Ok(count) => format!("local ({count} vectors)"),
                    Err(_) => "local (unreadable)".into(),
                };
                checks.push(CheckResult::pass("vector_index", detail));
            } else {
                checks.push(CheckResult::info(
                    "vector_index",
                    format!("local, {} will be created on first ingest", config.index.path.display()),
                ));
            }
        }
    }

    if config.store.path.exists() {
        let detail = match SqliteDocumentStore::open(&config.store.path).and_then(|s| s.list()) {
            Ok(docs) => format!("{} ({} documents)", config.store.path.display(), docs.len()),
            Err(_) => format!("{} (unreadable)", config.store.path.display()),
        };
        checks.push(CheckResult::pass("document_store", detail));
    } else {
        checks.push(CheckResult::info(
            "document_store",
            format!("{} will be created on first ingest", config.store.path.display()),
        ));
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("mindmap v{version} environment check\n");

            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<20} {}", check.symbol(use_color), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# mindmap configuration
# Credentials may also come from the environment (or a .env file):
# OPENAI_API_KEY, OPENAI_BASE_URL, UPSTASH_VECTOR_URL, UPSTASH_VECTOR_TOKEN, MINDMAP_DB

[llm]
# model = "gpt-4o"
# base_url = "https://api.openai.com"
# temperature = 0.3
# max_tokens = 2000
# context_char_budget = 8000
# json_mode = false
# timeout_secs = 120

[embedding]
# model = "text-embedding-3-small"
# dimensions = 1536

[index]
# backend = "upstash"   # or "local"
# path = ".mindmap/index.db"

[retrieval]
# top_k = 10       # 5-20
# max_nodes = 15   # 10-30

[chunking]
# chunk_size = 1000
# overlap = 200

[ingest]
# embed_concurrency = 4

[store]
# path = "mindmap_rag.db"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("warn,mindmap={level}"))),
        )
        .with_writer(std::io::stderr)
        .init();

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None => print_welcome(),
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            let path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            run_doctor(&config, &path, cli.format, use_color)?;
        }
        Some(Command::Docs) => run_docs(&config, cli.format)?,
        Some(Command::Ingest { title, file }) => {
            let title = match (title, &file) {
                (Some(title), _) => title,
                (None, Some(path)) => path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
                (None, None) => miette::bail!(
                    help = "pass --title when reading from stdin",
                    "document title is required"
                ),
            };
            let content = read_document(file.as_deref())?;
            let pipeline = MindMapPipeline::from_config(&config).into_diagnostic()?;

            let pb = spinner("Embedding and indexing chunks...")?;
            let report = pipeline.ingest(&title, &content).await.inspect_err(|_| {
                if let Some(pb) = &pb {
                    pb.finish_with_message("Failed");
                }
            })
            .into_diagnostic()?;
            finish(pb, "Done");

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                _ => println!(
                    "Ingested '{}' as document {} ({} chunks)",
                    report.title, report.document_id, report.chunks
                ),
            }
        }
        Some(Command::Reindex { document_id }) => {
            let pipeline = MindMapPipeline::from_config(&config).into_diagnostic()?;

            let pb = spinner("Re-indexing chunks...")?;
            let report = pipeline
                .retriever()
                .reindex_document(document_id)
                .await
                .inspect_err(|_| {
                    if let Some(pb) = &pb {
                        pb.finish_with_message("Failed");
                    }
                })
                .into_diagnostic()?;
            finish(pb, "Done");

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                _ => println!(
                    "Re-indexed '{}' ({} chunks)",
                    report.title, report.chunks
                ),
            }
        }
        Some(Command::Query {
            question,
            top_k,
            max_nodes,
            out,
        }) => {
            let pipeline = MindMapPipeline::from_config(&config).into_diagnostic()?;
            run_query(
                &pipeline,
                &config,
                &question,
                top_k,
                max_nodes,
                out.as_deref(),
                cli.format,
            )
            .await?;
        }
    }

    Ok(())
}
