//! CLI binary for pdf2audio.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2audio::{
    cancel_pair, convert_to_file_cancellable, extract_text, inspect, AwsCredentials, BackendKind,
    ConcatStrategy, ConversionConfig, ConversionOutput, ConversionProgressCallback, OcrMode,
    PageSelection, PollyEngine, ProgressCallback, Stage,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while reading pages, then a chunk bar during synthesis.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Synthesizing");
        self.bar.reset_eta();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage_change(&self, _from: Stage, to: Stage) {
        match to {
            Stage::Extracting => self.bar.set_prefix("Extracting"),
            Stage::Chunking => self.bar.set_prefix("Chunking"),
            Stage::Assembling => {
                self.bar.set_prefix("Assembling");
                self.bar.set_message("joining segments…");
            }
            Stage::Done | Stage::Failed | Stage::Cancelled => self.bar.finish_and_clear(),
            _ => {}
        }
    }

    fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize, via_ocr: bool) {
        let source = if via_ocr { "OCR" } else { "text" };
        self.bar
            .set_message(format!("page {page_num}/{total_pages} ({chars} chars, {source})"));
    }

    fn on_chunks_ready(&self, chunk_count: usize, total_chars: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{total_chars} characters in {chunk_count} chunks"
            ))
        ));
        self.activate_bar(chunk_count);
    }

    fn on_chunk_start(&self, index: usize, total: usize) {
        self.bar.set_message(format!("chunk {}/{}", index + 1, total));
    }

    fn on_chunk_complete(&self, _index: usize, _total: usize, _audio_bytes: usize) {
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local engine (espeak-ng, WAV output)
  pdf2audio document.pdf -o document.wav

  # Amazon Polly, neural voice
  pdf2audio --backend polly --voice Joanna paper.pdf -o paper.mp3

  # Specific pages, slower speech
  pdf2audio --pages 3-15 --rate 0.85 book.pdf -o chapter.wav

  # Scanned document: force OCR in German
  pdf2audio --ocr always --ocr-lang deu scan.pdf -o scan.wav

  # Show the chunk plan without synthesizing
  pdf2audio --dry-run --backend polly paper.pdf

  # Print the cleaned text that would be spoken
  pdf2audio --print-text paper.pdf

  # Inspect PDF metadata
  pdf2audio --inspect-only document.pdf

BACKENDS:
  Backend  Output  Request limit  Requirements
  ───────  ──────  ─────────────  ─────────────────────────────────
  local    WAV     none           espeak-ng, ffmpeg (to join segments)
  polly    MP3     3000 chars     AWS credentials, network access

ENVIRONMENT VARIABLES:
  AWS_ACCESS_KEY_ID       AWS access key (Polly)
  AWS_SECRET_ACCESS_KEY   AWS secret key (Polly)
  AWS_REGION              AWS region (Polly), default us-east-1
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override log filter, e.g. pdf2audio=debug
"#;

/// Convert PDF files and URLs to narrated audio.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2audio",
    version,
    about = "Convert PDF files and URLs to narrated audio",
    long_about = "Convert PDF documents (local files or URLs) into a single audio file. \
Text is read from the PDF's text layer, or recovered with OCR for scanned pages, then \
synthesized with a local espeak-ng engine or Amazon Polly.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Destination audio file.
    #[arg(short, long, env = "PDF2AUDIO_OUTPUT")]
    output: Option<PathBuf>,

    /// Speech backend.
    #[arg(long, env = "PDF2AUDIO_BACKEND", value_enum, default_value = "local")]
    backend: BackendArg,

    /// Voice id (espeak-ng: en-us, en-gb…; Polly: Joanna, Matthew…).
    #[arg(long, env = "PDF2AUDIO_VOICE")]
    voice: Option<String>,

    /// Speaking-rate multiplier (0.2–2.0).
    #[arg(long, env = "PDF2AUDIO_RATE", default_value_t = 1.0)]
    rate: f32,

    /// Volume multiplier (0.0–2.0).
    #[arg(long, env = "PDF2AUDIO_VOLUME", default_value_t = 1.0)]
    volume: f32,

    /// Maximum characters per chunk (capped at the backend's safe limit).
    #[arg(long, env = "PDF2AUDIO_MAX_CHUNK_CHARS")]
    max_chunk_chars: Option<usize>,

    /// Minimum pause between remote requests in milliseconds.
    #[arg(long, env = "PDF2AUDIO_REQUEST_INTERVAL_MS", default_value_t = 500)]
    request_interval_ms: u64,

    /// Per-request timeout in seconds for the remote backend.
    #[arg(long, env = "PDF2AUDIO_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// AWS region for Polly.
    #[arg(long, env = "PDF2AUDIO_REGION")]
    region: Option<String>,

    /// Polly engine.
    #[arg(long, env = "PDF2AUDIO_ENGINE", value_enum, default_value = "neural")]
    engine: EngineArg,

    /// When to use OCR.
    #[arg(long, env = "PDF2AUDIO_OCR", value_enum, default_value = "auto")]
    ocr: OcrArg,

    /// Tesseract language code(s), e.g. eng or eng+deu.
    #[arg(long, env = "PDF2AUDIO_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Page render width in pixels for OCR (300–6000).
    #[arg(long, env = "PDF2AUDIO_OCR_WIDTH", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(300..=6000))]
    ocr_width: u32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2AUDIO_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2AUDIO_PASSWORD")]
    password: Option<String>,

    /// Directory for the job's temporary files.
    #[arg(long, env = "PDF2AUDIO_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// How to join segments (default: bytes for MP3, ffmpeg for WAV).
    #[arg(long, env = "PDF2AUDIO_CONCAT", value_enum)]
    concat: Option<ConcatArg>,

    /// espeak-ng executable.
    #[arg(long, env = "PDF2AUDIO_ESPEAK", default_value = "espeak-ng")]
    espeak_path: PathBuf,

    /// tesseract executable.
    #[arg(long, env = "PDF2AUDIO_TESSERACT", default_value = "tesseract")]
    tesseract_path: PathBuf,

    /// ffmpeg executable.
    #[arg(long, env = "PDF2AUDIO_FFMPEG", default_value = "ffmpeg")]
    ffmpeg_path: PathBuf,

    /// Extract and chunk only; print the chunk plan, write no audio.
    #[arg(long, env = "PDF2AUDIO_DRY_RUN")]
    dry_run: bool,

    /// Print the cleaned document text to stdout and exit.
    #[arg(long)]
    print_text: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Output structured JSON instead of human-readable text.
    #[arg(long, env = "PDF2AUDIO_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2AUDIO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2AUDIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2AUDIO_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2AUDIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Local,
    Polly,
}

impl From<BackendArg> for BackendKind {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Polly => BackendKind::Polly,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Standard,
    Neural,
    LongForm,
    Generative,
}

impl From<EngineArg> for PollyEngine {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Standard => PollyEngine::Standard,
            EngineArg::Neural => PollyEngine::Neural,
            EngineArg::LongForm => PollyEngine::LongForm,
            EngineArg::Generative => PollyEngine::Generative,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Auto,
    Always,
    Never,
}

impl From<OcrArg> for OcrMode {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Auto => OcrMode::Auto,
            OcrArg::Always => OcrMode::Always,
            OcrArg::Never => OcrMode::Never,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ConcatArg {
    Bytes,
    Ffmpeg,
}

impl From<ConcatArg> for ConcatStrategy {
    fn from(v: ConcatArg) -> Self {
        match v {
            ConcatArg::Bytes => ConcatStrategy::Bytes,
            ConcatArg::Ffmpeg => ConcatStrategy::Ffmpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose mode always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.print_text;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let meta = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {t}");
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {a}");
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {s}");
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            println!("Text layer:   {} chars", meta.text_layer_chars);
            if meta.needs_ocr() {
                println!("              {}", cyan("no text layer: OCR will be used"));
            }
            if let Some(ref p) = meta.producer {
                println!("Producer:     {p}");
            }
        }
        return Ok(());
    }

    // ── Print-text mode ──────────────────────────────────────────────────
    if cli.print_text {
        let config = build_config(&cli, None)?;
        let text = extract_text(&cli.input, &config)
            .await
            .context("Failed to extract text")?;
        println!("{text}");
        return Ok(());
    }

    let output_path = match (&cli.output, cli.dry_run) {
        (Some(p), _) => p.clone(),
        (None, true) => PathBuf::from("dry-run.out"),
        (None, false) => anyhow::bail!("--output is required (or use --dry-run / --inspect-only)"),
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Ctrl-C → cancel ──────────────────────────────────────────────────
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} cancelling, cleaning up…", cyan("⚠"));
            handle.cancel();
        }
    });

    // ── Run conversion ───────────────────────────────────────────────────
    let result = convert_to_file_cancellable(&cli.input, &output_path, &config, token).await;
    let output = match result {
        Ok(output) => output,
        Err(e) if e.is_cancelled() => {
            eprintln!("{} {}", red("✘"), e);
            std::process::exit(130);
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.dry_run {
        print_plan(&output);
    } else if !cli.quiet {
        eprintln!(
            "{}  {} chunks  {}  {}ms  →  {}",
            green("✔"),
            output.stats.chunks,
            dim(&format!("{} bytes", output.stats.audio_bytes)),
            output.stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        if output.stats.ocr_used {
            eprintln!("   {}", dim("text recovered with OCR"));
        }
    }

    Ok(())
}

/// Print the chunk plan produced by a dry run.
fn print_plan(output: &ConversionOutput) {
    println!(
        "{} pages, {} characters, {} chunks{}",
        output.stats.pages,
        output.stats.characters,
        output.stats.chunks,
        if output.stats.ocr_used { " (OCR)" } else { "" }
    );
    for chunk in &output.chunks {
        let preview: String = chunk.text.chars().take(60).collect();
        println!(
            "  {:>4}  {:>5} chars  {}{}",
            chunk.index + 1,
            chunk.char_count(),
            preview,
            if chunk.char_count() > 60 { "…" } else { "" }
        );
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = ConversionConfig::builder()
        .backend(cli.backend.into())
        .speaking_rate(cli.rate)
        .volume(cli.volume)
        .request_interval_ms(cli.request_interval_ms)
        .request_timeout_secs(cli.request_timeout)
        .polly_engine(cli.engine.into())
        .ocr_mode(cli.ocr.into())
        .ocr_language(cli.ocr_lang.clone())
        .ocr_render_width(cli.ocr_width)
        .pages(pages)
        .espeak_path(cli.espeak_path.clone())
        .tesseract_path(cli.tesseract_path.clone())
        .ffmpeg_path(cli.ffmpeg_path.clone())
        .dry_run(cli.dry_run)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref voice) = cli.voice {
        builder = builder.voice(voice.clone());
    }
    if let Some(n) = cli.max_chunk_chars {
        builder = builder.max_chunk_chars(n);
    }
    if let Some(ref region) = cli.region {
        builder = builder.region(region.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir.clone());
    }
    if let Some(concat) = cli.concat {
        builder = builder.concat(concat.into());
    }
    if let (Ok(id), Ok(secret)) = (
        std::env::var("PDF2AUDIO_AWS_ACCESS_KEY_ID"),
        std::env::var("PDF2AUDIO_AWS_SECRET_ACCESS_KEY"),
    ) {
        builder = builder.credentials(AwsCredentials::new(id, secret));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {start})");
        }
        if start > end {
            anyhow::bail!("Invalid page range '{start}-{end}': start must be <= end");
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {p})");
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {page})");
    }
    Ok(PageSelection::Single(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pages() {
        assert!(matches!(parse_pages("all").unwrap(), PageSelection::All));
        assert!(matches!(parse_pages("5").unwrap(), PageSelection::Single(5)));
        assert!(matches!(parse_pages("3-15").unwrap(), PageSelection::Range(3, 15)));
        assert!(matches!(
            parse_pages("1, 3,5").unwrap(),
            PageSelection::Set(ref v) if v == &vec![1, 3, 5]
        ));
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("9-2").is_err());
        assert!(parse_pages("x").is_err());
    }

    #[test]
    fn test_json_output_shape() {
        let output = ConversionOutput {
            output_path: Some(PathBuf::from("book.mp3")),
            chunks: Vec::new(),
            stats: Default::default(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string_pretty(&output).unwrap()).unwrap();
        assert_eq!(json["output_path"], "book.mp3");
        assert_eq!(json["stats"]["chunks"], 0);
        assert_eq!(json["stats"]["ocr_used"], false);
    }

    #[test]
    fn test_cli_maps_onto_config() {
        let cli = Cli::try_parse_from([
            "pdf2audio",
            "book.pdf",
            "-o",
            "book.mp3",
            "--backend",
            "polly",
            "--max-chunk-chars",
            "5000",
            "--engine",
            "long-form",
        ])
        .unwrap();
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.backend, BackendKind::Polly);
        assert_eq!(config.polly_engine, PollyEngine::LongForm);
        assert_eq!(config.chunk_budget(), 2800);
    }
}
