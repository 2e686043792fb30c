//! CLI binary for latex2edx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use latex2edx::{
    convert, convert_to_file, filter_markup, write_atomic, CommandAnswerBox, CommandEngine,
    ConversionConfig, ConversionOutput, ConversionProgressCallback, DocumentSource, ExtraFilter,
    ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that names the running filter rule and logs one line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    missing: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading source…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            missing: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, source: &str) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message(source.to_string());
    }

    fn on_rule_applied(&self, rule: &str, matches: usize) {
        self.bar.set_prefix("Filtering");
        self.bar.set_message(format!("{rule} ({matches})"));
    }

    fn on_image_resolved(&self, base: &str, fragments: usize) {
        if fragments == 0 {
            self.missing.fetch_add(1, Ordering::SeqCst);
            self.bar
                .println(format!("  {} {}  {}", yellow("?"), base, dim("not found")));
        } else {
            self.bar.println(format!(
                "  {} {}  {}",
                green("✓"),
                base,
                dim(&format!("{fragments} image(s)"))
            ));
        }
    }

    fn on_conversion_complete(&self, lines: usize) {
        self.bar.finish_and_clear();
        let missing = self.missing.load(Ordering::SeqCst);
        if missing == 0 {
            eprintln!("{} {} lines of XML", green("✔"), bold(&lines.to_string()));
        } else {
            eprintln!(
                "{} {} lines of XML  ({} image(s) not found)",
                yellow("⚠"),
                bold(&lines.to_string()),
                missing
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert lecture1.tex → lecture1.xhtml, images into static/images
  latex2edx --engine plastex-xhtml lecture1.tex

  # Body fragment, custom asset directory and URL segment
  latex2edx --engine plastex-xhtml --add-wrap --imdir course/static/img --imurl img part.tex

  # Filter markup the engine already produced, print to stdout
  latex2edx --from-markup --stdout lecture1.html

  # Extra rule appended to the chain
  latex2edx --engine plastex-xhtml --filter '<tt>(.*?)</tt>=><code>$1</code>' notes.tex

  # JSON output (XML, published images, diagnostics, stats)
  latex2edx --engine plastex-xhtml --json --no-output-file lecture1.tex > out.json

EXTERNAL TOOLS:
  --engine     reads LaTeX on stdin, writes XHTML markup on stdout
  --abox-cmd   reads an answer-box body on stdin, writes problem XML on stdout
  pdfinfo      page count of PDF figures
  convert      ImageMagick, rasterises PDF figures to PNG

ENVIRONMENT VARIABLES:
  LATEX2EDX_ENGINE        Default for --engine
  LATEX2EDX_ABOX_CMD      Default for --abox-cmd
  RUST_LOG                Override log filter (e.g. latex2edx=debug)
"#;

/// Convert LaTeX course material to edX XML.
#[derive(Parser, Debug)]
#[command(
    name = "latex2edx",
    version,
    about = "Convert LaTeX course material to edX XML",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// LaTeX source file (or engine markup with --from-markup).
    input: PathBuf,

    /// Write XML to this file instead of <input>.xhtml.
    #[arg(short, long, env = "LATEX2EDX_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory that published images are copied into.
    #[arg(long, env = "LATEX2EDX_IMDIR", default_value = "static/images")]
    imdir: PathBuf,

    /// URL segment after /static/ in emitted image references.
    #[arg(long, env = "LATEX2EDX_IMURL", default_value = "")]
    imurl: String,

    /// Treat the input as a body fragment and add a minimal preamble.
    #[arg(long, env = "LATEX2EDX_ADD_WRAP")]
    add_wrap: bool,

    /// TeX engine command (program and arguments).
    #[arg(long, env = "LATEX2EDX_ENGINE")]
    engine: Option<String>,

    /// Answer-box parser command (program and arguments).
    #[arg(long, env = "LATEX2EDX_ABOX_CMD")]
    abox_cmd: Option<String>,

    /// Directory that relative image paths are resolved against.
    #[arg(long, env = "LATEX2EDX_GRAPHICS_ROOT")]
    graphics_root: Option<PathBuf>,

    /// Template directory passed to the engine.
    #[arg(long, env = "LATEX2EDX_TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,

    /// Plugin directory passed to the engine.
    #[arg(long, env = "LATEX2EDX_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,

    /// Extra rule 'PATTERN=>REPLACEMENT' ($1 expands to a capture). Repeatable.
    #[arg(long = "filter", value_name = "PATTERN=>REPLACEMENT")]
    filters: Vec<String>,

    /// Raster density for PDF figures.
    #[arg(long, env = "LATEX2EDX_DENSITY", default_value_t = 800,
          value_parser = clap::value_parser!(u32).range(1..))]
    density: u32,

    /// Input is already-rendered engine markup; run only the filters.
    #[arg(long)]
    from_markup: bool,

    /// Print the XML to stdout.
    #[arg(long)]
    stdout: bool,

    /// Output structured JSON (ConversionOutput) on stdout.
    #[arg(long, env = "LATEX2EDX_JSON")]
    json: bool,

    /// Do not write an output file.
    #[arg(long)]
    no_output_file: bool,

    /// Disable progress spinner.
    #[arg(long, env = "LATEX2EDX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs and engine logging.
    #[arg(short, long, env = "LATEX2EDX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "LATEX2EDX_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.verbose;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let mut output = if cli.from_markup {
        let markup = std::fs::read_to_string(&cli.input)
            .with_context(|| format!("Failed to read markup from {:?}", cli.input))?;
        filter_markup(&markup, &config).context("Filtering failed")?
    } else if let Some(ref output_path) = cli.output {
        convert_to_file(DocumentSource::new(&cli.input), output_path, &config)
            .context("Conversion failed")?
    } else {
        convert(DocumentSource::new(&cli.input), &config).context("Conversion failed")?
    };

    if cli.from_markup {
        if let Some(ref output_path) = cli.output {
            write_atomic(output_path, &output.xml)
                .with_context(|| format!("Failed to write {:?}", output_path))?;
            output.output_path = Some(output_path.clone());
        }
    }

    emit(&cli, &output)?;

    if !cli.quiet && !show_progress && !cli.json {
        for diag in &output.diagnostics {
            eprintln!("{} {}", yellow("warning:"), diag);
        }
        if let Some(ref path) = output.output_path {
            eprintln!(
                "{}  {} lines  {} image(s)  {}ms  →  {}",
                green("✔"),
                output.stats.xml_lines,
                output.stats.images_published,
                output.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
    }

    Ok(())
}

fn emit(cli: &Cli, output: &ConversionOutput) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if cli.json {
        let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    } else if cli.stdout || (cli.from_markup && cli.output.is_none()) {
        handle
            .write_all(output.xml.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.xml.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .imdir(&cli.imdir)
        .imurl(&cli.imurl)
        .add_wrap(cli.add_wrap)
        .verbose(cli.verbose)
        .raster_density(cli.density)
        .write_output(!cli.no_output_file && cli.output.is_none());

    if let Some(ref cmd) = cli.engine {
        let (program, args) = split_command(cmd)?;
        builder = builder.engine(Arc::new(CommandEngine::new(program).args(args)));
    } else if !cli.from_markup {
        anyhow::bail!("No TeX engine given; pass --engine <CMD> or set LATEX2EDX_ENGINE (or use --from-markup)");
    }
    if let Some(ref cmd) = cli.abox_cmd {
        let (program, args) = split_command(cmd)?;
        let mut parser = CommandAnswerBox::new(program);
        for arg in args {
            parser = parser.arg(arg);
        }
        builder = builder.answer_box(Arc::new(parser));
    }
    if let Some(ref dir) = cli.graphics_root {
        builder = builder.graphics_root(dir);
    }
    if let Some(ref dir) = cli.template_dir {
        builder = builder.template_dir(dir);
    }
    if let Some(ref dir) = cli.plugin_dir {
        builder = builder.plugin_dir(dir);
    }
    for spec in &cli.filters {
        builder = builder.extra_filter(parse_filter(spec)?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--filter 'PATTERN=>REPLACEMENT'`.
fn parse_filter(spec: &str) -> Result<ExtraFilter> {
    let (pattern, replacement) = spec
        .split_once("=>")
        .with_context(|| format!("Invalid --filter '{spec}': expected PATTERN=>REPLACEMENT"))?;
    if pattern.is_empty() {
        anyhow::bail!("Invalid --filter '{spec}': empty pattern");
    }
    Ok(ExtraFilter::replace(pattern, replacement))
}

/// Split a command string on whitespace into program and arguments.
fn split_command(cmd: &str) -> Result<(String, Vec<String>)> {
    let mut parts = cmd.split_whitespace().map(str::to_string);
    let program = parts.next().context("Empty command")?;
    Ok((program, parts.collect()))
}
