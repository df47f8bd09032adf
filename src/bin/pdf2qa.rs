//! CLI binary for pdf2qa.
//!
//! A thin shim over the library crate: maps subcommand flags to
//! `ConversionConfig` / `GenerationConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2qa::{
    load_corpus, CompletionClient, CompletionSettings, ConversionConfig,
    ConversionProgressCallback, DatasetWriter, DomainAnalyzer, GenerationConfig,
    GenerationProgressCallback, LanguageMode, Pdf2QaError, PdfDocumentProcessor, QaGenerator,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn progress_bar(total: usize, unit: &str, prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(&format!(
        "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  ⏱ {{elapsed_precise}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS);
    bar.set_style(style);
    bar.set_prefix(prefix);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Truncate long error messages to keep output tidy.
fn short(error: &str) -> String {
    if error.chars().count() > 80 {
        let head: String = error.chars().take(79).collect();
        format!("{head}\u{2026}")
    } else {
        error.to_string()
    }
}

// ── Progress callbacks ───────────────────────────────────────────────────────

/// One bar tick per finished PDF, with a log line per document.
struct ConvertProgress {
    bar: ProgressBar,
}

impl ConversionProgressCallback for ConvertProgress {
    fn on_document_start(&self, source: &str, total_chunks: usize) {
        self.bar
            .set_message(format!("{source} ({total_chunks} chunks)"));
    }

    fn on_chunk_complete(&self, source: &str, chunk_index: usize, total_chunks: usize, fallback: bool) {
        if fallback {
            self.bar.println(format!(
                "  {} {} chunk {}/{} cleaned locally",
                cyan("⚠"),
                source,
                chunk_index + 1,
                total_chunks
            ));
        }
    }

    fn on_document_complete(&self, source: &str, chars: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            source,
            dim(&format!("{chars:>7} chars"))
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, source: &str, error: &str) {
        self.bar
            .println(format!("  {} {:<40}  {}", red("✗"), source, red(&short(error))));
        self.bar.inc(1);
    }
}

/// Bar over documents, then a spinner message for the cross-document pass.
struct GenerateProgress {
    bar: ProgressBar,
    started: Instant,
}

impl GenerationProgressCallback for GenerateProgress {
    fn on_run_start(&self, total_files: usize, requested_total: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Generating {requested_total} QA pairs from {total_files} documents…"
            ))
        ));
    }

    fn on_pool_start(&self, workers: usize, per_document: usize) {
        self.bar.set_message(format!(
            "{workers} workers, {per_document} questions per document"
        ));
    }

    fn on_document_complete(&self, source: &str, records: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            source,
            dim(&format!("{records:>3} pairs"))
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, source: &str, error: &str) {
        self.bar
            .println(format!("  {} {:<40}  {}", red("✗"), source, red(&short(error))));
        self.bar.inc(1);
    }

    fn on_cross_synthesis_start(&self, requested: usize) {
        self.bar
            .set_message(format!("cross-document synthesis ({requested} pairs)"));
    }

    fn on_run_complete(&self, records: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} QA pairs in {:.1}s",
            green("✔"),
            bold(&records.to_string()),
            self.started.elapsed().as_secs_f64()
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert PDFs to cleaned text files named after each paper's title
  pdf2qa convert papers/*.pdf -o txt/

  # Convert without the model (heuristic sanitising only)
  pdf2qa convert --no-ai paper.pdf -o txt/

  # Show what a corpus is about
  pdf2qa analyze txt/

  # Generate 50 bilingual QA pairs with 3 workers
  pdf2qa generate txt/ -o qa.jsonl --questions 50 --workers 3

  # English only, custom instruction
  pdf2qa generate txt/ -o qa_en.jsonl --language english \
      --instruction "You are an environmental economist."

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override the log filter (e.g. pdf2qa=debug)

The pdfium shared library must be loadable (system library path or next to
the binary) for `convert`.
"#;

/// Turn PDF papers into cleaned text and question/answer datasets.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2qa",
    version,
    about = "Turn PDF papers into cleaned text and question/answer datasets using LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2QA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2QA_QUIET")]
    quiet: bool,

    /// Disable progress bars.
    #[arg(long, global = true, env = "PDF2QA_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert PDFs to cleaned text files.
    Convert(ConvertArgs),
    /// Print the domain profile of a folder of text files.
    Analyze(AnalyzeArgs),
    /// Generate a JSONL QA dataset from a folder of text files.
    Generate(GenerateArgs),
}

/// Model connection flags shared by `convert` and `generate`.
#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Retries per call after the first attempt.
    #[arg(long, env = "PDF2QA_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "PDF2QA_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

impl ModelArgs {
    fn apply(&self, mut settings: CompletionSettings) -> CompletionSettings {
        settings.model = self.model.clone();
        settings.provider_name = self.provider.clone();
        settings.max_retries = self.max_retries;
        settings.api_timeout_secs = self.api_timeout;
        settings
    }
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// PDF files to convert.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output folder for the `.txt` files.
    #[arg(short, long, env = "PDF2QA_TXT_DIR", default_value = "txt")]
    output: PathBuf,

    /// Skip model cleaning; write the sanitised text as-is.
    #[arg(long, env = "PDF2QA_NO_AI")]
    no_ai: bool,

    /// Name output files after the PDF file instead of the extracted title.
    #[arg(long, env = "PDF2QA_NO_TITLE")]
    no_title: bool,

    /// PDFs converted at once.
    #[arg(short, long, env = "PDF2QA_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Concurrent cleaning calls within one PDF.
    #[arg(long, env = "PDF2QA_CHUNK_CONCURRENCY", default_value_t = 1)]
    chunk_concurrency: usize,

    /// Maximum characters per cleaning chunk.
    #[arg(long, env = "PDF2QA_MAX_CHUNK_SIZE", default_value_t = 8000)]
    max_chunk_size: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2QA_PASSWORD")]
    password: Option<String>,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Folder of `.txt` files.
    folder: PathBuf,

    /// Print the profile as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Folder of `.txt` files.
    folder: PathBuf,

    /// Output JSONL file.
    #[arg(short, long, env = "PDF2QA_OUTPUT", default_value = "qa.jsonl")]
    output: PathBuf,

    /// Instruction written into every dataset line.
    #[arg(long, env = "PDF2QA_INSTRUCTION", default_value = "You are a professional researcher.")]
    instruction: String,

    /// english, chinese or bilingual (aliases: en, zh, both).
    #[arg(short, long, env = "PDF2QA_LANGUAGE", default_value = "bilingual")]
    language: LanguageMode,

    /// Number of QA pairs to generate.
    #[arg(short = 'n', long, env = "PDF2QA_QUESTIONS", default_value_t = 20)]
    questions: usize,

    /// Documents processed at once. Must not exceed the number of documents.
    #[arg(short, long, env = "PDF2QA_WORKERS", default_value_t = 3)]
    workers: usize,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are hidden while a progress bar is active.
    let analyze = matches!(cli.command, Command::Analyze(_));
    let show_progress = !cli.quiet && !cli.no_progress && !analyze;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Convert(ref args) => run_convert(args, cli.quiet, show_progress).await,
        Command::Analyze(ref args) => run_analyze(args),
        Command::Generate(ref args) => run_generate(args, cli.quiet, show_progress).await,
    }
}

async fn run_convert(args: &ConvertArgs, quiet: bool, show_progress: bool) -> Result<()> {
    for input in &args.inputs {
        if !input.is_file() {
            return Err(Pdf2QaError::FileNotFound {
                path: input.clone(),
            }
            .into());
        }
    }

    let config = ConversionConfig::builder()
        .max_chunk_size(args.max_chunk_size)
        .concurrency(args.concurrency)
        .chunk_concurrency(args.chunk_concurrency)
        .ai_cleaning(!args.no_ai)
        .extract_title(!args.no_title)
        .completion(args.model.apply(CompletionSettings::for_cleaning()));
    let config = match args.password {
        Some(ref pwd) => config.password(pwd.clone()),
        None => config,
    }
    .build()
    .context("Invalid configuration")?;

    let mut processor = PdfDocumentProcessor::new(config).context("Failed to set up the model")?;
    let progress = show_progress.then(|| {
        Arc::new(ConvertProgress {
            bar: progress_bar(args.inputs.len(), "PDFs", "Converting"),
        })
    });
    if let Some(ref cb) = progress {
        processor = processor.with_callback(Arc::clone(cb) as Arc<dyn ConversionProgressCallback>);
    }

    let start = Instant::now();
    let outcomes = processor.convert_batch(&args.inputs, &args.output).await;
    if let Some(ref cb) = progress {
        cb.bar.finish_and_clear();
    }

    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    if !quiet {
        for outcome in &outcomes {
            match (&outcome.result, &outcome.output) {
                (Ok(doc), Some(path)) => eprintln!(
                    "  {} → {}  {}",
                    outcome.input.display(),
                    bold(&path.display().to_string()),
                    dim(&format!(
                        "{} chars, {} words, {} formulas",
                        doc.stats.chars, doc.stats.words, doc.stats.math_expressions
                    ))
                ),
                (Err(e), _) if !show_progress => {
                    eprintln!("  {} {}", red("✗"), short(&e.to_string()))
                }
                _ => {}
            }
        }
        eprintln!(
            "{}  {}/{} PDFs  {:.1}s",
            if ok == outcomes.len() { green("✔") } else { cyan("⚠") },
            ok,
            outcomes.len(),
            start.elapsed().as_secs_f64()
        );
    }

    if ok == 0 {
        anyhow::bail!("No PDF could be converted");
    }
    Ok(())
}

fn run_analyze(args: &AnalyzeArgs) -> Result<()> {
    let corpus = load_corpus(&args.folder).context("Failed to load corpus")?;
    let profile = DomainAnalyzer::default().analyze(&corpus);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&profile).context("Failed to serialize profile")?
        );
    } else {
        println!("Documents:  {}", profile.document_count);
        println!("Domains:    {}", profile.primary_domains.join(", "));
        println!("Themes:     {}", profile.primary_themes.join(", "));
        println!("Keywords:   {}", profile.top_keywords.join(", "));
    }
    Ok(())
}

async fn run_generate(args: &GenerateArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let corpus = load_corpus(&args.folder).context("Failed to load corpus")?;
    if corpus.is_empty() {
        anyhow::bail!("No .txt files in {}", args.folder.display());
    }

    let config = GenerationConfig::builder()
        .completion(args.model.apply(CompletionSettings::for_generation()))
        .build()
        .context("Invalid configuration")?;
    let client =
        CompletionClient::from_settings(config.completion.clone()).context("Failed to set up the model")?;

    let mut generator = QaGenerator::new(client, config);
    if show_progress {
        let cb = Arc::new(GenerateProgress {
            bar: progress_bar(corpus.len(), "documents", "Generating"),
            started: Instant::now(),
        });
        generator = generator.with_callback(cb as Arc<dyn GenerationProgressCallback>);
    }

    let output = generator
        .generate_dataset(&corpus, args.questions, args.language, args.workers)
        .await
        .context("Generation failed")?;

    let writer = DatasetWriter::new(args.instruction.clone(), args.language);
    let lines = writer
        .write_file(&output.records, &args.output)
        .context("Failed to write dataset")?;

    if !quiet {
        eprintln!(
            "{}  {} records  →  {} lines in {}",
            green("✔"),
            output.records.len(),
            lines,
            bold(&args.output.display().to_string())
        );
        eprintln!(
            "   {} {}",
            dim("domains:"),
            output.profile.primary_domains.join(", ")
        );
    }
    Ok(())
}
