use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mathdown::{AppendOutcome, Config, FixedMetrics, MarkdownView, SvgPainter};

#[derive(Parser)]
#[command(name = "mathdown")]
#[command(about = "Lay out Markdown with LaTeX math into a display list")]
struct Cli {
    /// Input Markdown file
    input: PathBuf,

    /// Available width in pixels
    #[arg(short, long, default_value_t = 800.0)]
    width: f64,

    /// Base font size in pixels (overrides the config)
    #[arg(long)]
    font_size: Option<u32>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the parsed document tree
    #[arg(long)]
    tree: bool,

    /// Paint the display list into an SVG file
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Feed the input word by word, as a stream would arrive
    #[arg(long)]
    stream: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> mathdown::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::compiled_default(),
    };
    if let Some(size) = cli.font_size {
        config.font.size = size;
    }

    let markdown = fs::read_to_string(&cli.input)?;

    let mut view = MarkdownView::new(
        config.clone(),
        mathdown::default_renderer(),
        Box::new(FixedMetrics::default()),
    )
    .with_width(cli.width);

    if cli.stream {
        let mut chunks = 0;
        let mut deferred = 0;
        for chunk in markdown.split_inclusive(' ') {
            chunks += 1;
            if view.append_text(chunk)? == AppendOutcome::Deferred {
                deferred += 1;
            }
        }
        eprintln!("Streamed {chunks} chunks, {deferred} deferred");
    } else {
        view.set_text(&markdown)?;
    }

    if cli.tree {
        if let Some(document) = view.document() {
            print!("{}", document.dump_tree());
        }
    }

    for fragment in view.display_list() {
        println!("{fragment}");
    }
    println!("height {:.1}", view.height());

    if let Some(output) = &cli.svg {
        let mut painter = SvgPainter::new(
            cli.width,
            view.height(),
            &config.font.sans,
            &config.font.mono,
        );
        painter.background(view.palette().window);
        view.paint(&mut painter);
        fs::write(output, painter.finish())?;
        println!("Created {}", output.display());
    }

    Ok(())
}
