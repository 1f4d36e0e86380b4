mod error;
mod html;
mod parse;
mod render;
mod serve;
mod slides;
mod web_assets;

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use error::InitError;
use serve::AppConfig;
use slides::Slide;

/// Default port, as in a plain `mdslides` run.
const DEFAULT_PORT: u16 = 3000;

/// Files that make up a deck.
#[derive(Args, Debug, Clone)]
struct DeckArgs {
    /// Markdown document holding the slides
    #[arg(long, env = "MDSLIDES_CONTENT", default_value = "content.md", global = true)]
    content: PathBuf,
    /// HTML template with $placeholder tokens
    #[arg(long, env = "MDSLIDES_TEMPLATE", default_value = "template.html", global = true)]
    template: PathBuf,
    /// Directory of static files served at the site root
    #[arg(long, env = "MDSLIDES_PUBLIC", default_value = "public", global = true)]
    public: PathBuf,
}

impl DeckArgs {
    fn to_config(&self) -> AppConfig {
        AppConfig {
            content_file: self.content.clone(),
            template_file: self.template.clone(),
            public_dir: self.public.clone(),
        }
    }
}

/// Explicit subcommands; without one the deck is served.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the slides parsed from the content file
    List {
        /// Print a JSON array instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write a starter content.md, template.html and public/ directory
    Init {
        /// Directory to create the deck in
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Overwrite files that already exist
        #[arg(long)]
        force: bool,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "mdslides",
    version,
    about = "Serve a markdown document as a deck of live-coding HTML slides",
    after_help = "INVOCATION FORMS:\n  mdslides [OPTIONS]               Serve the deck over HTTP\n  mdslides list [--json]           Print the parsed slides\n  mdslides init [DIR] [--force]    Write a starter deck"
)]
struct Cli {
    #[command(flatten)]
    deck: DeckArgs,
    /// Interface address to bind to
    #[arg(long, env = "MDSLIDES_BIND", default_value = "127.0.0.1")]
    bind: String,
    /// Starting port number for the HTTP server
    #[arg(long, env = "MDSLIDES_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Initialize the tracing subscriber; logs go to stderr so stdout stays
/// usable for listings.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mdslides=debug,tower_http=debug"
    } else {
        "mdslides=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => run_server(cli.deck.to_config(), cli.bind, cli.port),
        Some(Commands::List { json }) => run_list(&cli.deck.content, json),
        Some(Commands::Init { dir, force }) => run_init(&dir, force).map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_server(config: AppConfig, bind: String, port: u16) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    rt.block_on(serve::run_serve(config, bind, port))
        .context("slide server failed")
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn slide_json(index: usize, slide: &Slide) -> serde_json::Value {
    serde_json::json!({
        "index": index,
        "level": slide.level,
        "line": slide.line,
        "title": slide.title,
        "notes": slide.notes,
        "displayCss": slide.display_css,
        "exampleCss": slide.example_css,
        "exampleHtml": slide.example_html,
    })
}

fn flag(present: bool, label: &'static str) -> &'static str {
    if present {
        label
    } else {
        "-"
    }
}

/// Render the slide table printed by `mdslides list`.
fn format_listing(deck: &[Slide]) -> String {
    let mut out = String::new();
    for (index, slide) in deck.iter().enumerate() {
        let indent = if slide.level == 3 { "  " } else { "" };
        out.push_str(&format!(
            "{index:>3}  h{level}  line {line:<5} {css} {example}  {indent}{title}\n",
            level = slide.level,
            line = slide.line,
            css = flag(slide.display_css.is_some(), "css"),
            example = flag(slide.example_html.is_some() || slide.example_css.is_some(), "example"),
            title = slide.title,
        ));
    }
    out
}

fn run_list(content: &Path, json: bool) -> anyhow::Result<()> {
    let deck = slides::load_slides(content)?;
    info!(path = %content.display(), slides = deck.len(), "loaded deck");

    let mut stdout = io::stdout().lock();
    if json {
        let values: Vec<_> = deck
            .iter()
            .enumerate()
            .map(|(i, s)| slide_json(i, s))
            .collect();
        serde_json::to_writer_pretty(&mut stdout, &values).context("failed to write JSON")?;
        writeln!(stdout)?;
    } else if deck.is_empty() {
        warn!(path = %content.display(), "no level 2 or 3 headings found");
    } else {
        stdout.write_all(format_listing(&deck).as_bytes())?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn write_starter_file(path: &Path, contents: &str, force: bool) -> Result<(), InitError> {
    if path.exists() && !force {
        warn!(path = %path.display(), "keeping existing file");
        return Ok(());
    }
    fs::write(path, contents).map_err(|source| InitError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "wrote starter file");
    Ok(())
}

/// Create a starter deck in `dir`.
fn run_init(dir: &Path, force: bool) -> Result<(), InitError> {
    let public = dir.join("public");
    fs::create_dir_all(&public).map_err(|source| InitError::CreateDir {
        path: public.clone(),
        source,
    })?;
    write_starter_file(&dir.join("content.md"), web_assets::STARTER_CONTENT, force)?;
    write_starter_file(&dir.join("template.html"), web_assets::STARTER_TEMPLATE, force)?;
    println!(
        "Created a deck in {}; run mdslides there and open http://localhost:{DEFAULT_PORT}",
        dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_plain_invocation() {
        let cli = Cli::try_parse_from(["mdslides"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.deck.content, PathBuf::from("content.md"));
        assert_eq!(cli.deck.template, PathBuf::from("template.html"));
        assert_eq!(cli.deck.public, PathBuf::from("public"));
        assert_eq!(cli.port, 3000);
    }

    #[test]
    fn cli_list_accepts_deck_flags() {
        let cli = Cli::try_parse_from(["mdslides", "list", "--json", "--content", "deck.md"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::List { json: true })));
        assert_eq!(cli.deck.content, PathBuf::from("deck.md"));
    }

    #[test]
    fn listing_marks_levels_and_sections() {
        let deck = slides::parse_slides(
            "## Intro\n\n```css\na {}\n```\n\n### Step\n\n## Plain\n",
        );
        let listing = format_listing(&deck);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("h2") && lines[0].contains("css") && lines[0].ends_with("Intro"));
        assert!(lines[1].contains("example") && lines[1].ends_with("  Step"));
        assert!(lines[2].contains("- -") && lines[2].ends_with("Plain"));
    }

    #[test]
    fn slide_json_uses_camel_case_fields() {
        let deck = slides::parse_slides("## A\n\n```css\nb {}\n```\n");
        let value = slide_json(0, &deck[0]);
        assert_eq!(value["displayCss"], "b {}");
        assert!(value["exampleHtml"].is_null());
        assert_eq!(value["level"], 2);
    }

    #[test]
    fn init_writes_starter_deck_and_keeps_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("deck");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("content.md"), "## Mine\n").unwrap();

        run_init(&dir, false).unwrap();
        assert_eq!(fs::read_to_string(dir.join("content.md")).unwrap(), "## Mine\n");
        assert_eq!(
            fs::read_to_string(dir.join("template.html")).unwrap(),
            web_assets::STARTER_TEMPLATE
        );
        assert!(dir.join("public").is_dir());

        run_init(&dir, true).unwrap();
        assert_eq!(
            fs::read_to_string(dir.join("content.md")).unwrap(),
            web_assets::STARTER_CONTENT
        );
    }
}
