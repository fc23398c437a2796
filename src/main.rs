#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use picpdf::ingest::DEFAULT_DECODE_TIMEOUT;
use picpdf::{
    ingest_files, parse, plan_document, render_pdf, ImageList, IngestOptions, Margin, Metadata,
    Orientation, PageSize, PdfOptions, PreviewRegistry,
};

#[derive(Parser)]
#[command(name = "picpdf", version, about = "Lay images out on PDF pages")]
struct Cli {
    /// num parallel threads (default number of CPUs)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// print per-image details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LayoutArgs {
    /// input image files, dirs or glob patterns (jpg, png, webp, bmp, gif, tiff)
    images: Vec<PathBuf>,

    /// JSON options file; flags given on the command line take precedence
    #[arg(long)]
    options: Option<PathBuf>,

    /// page size, "fit" sizes each page to its image
    #[arg(short, long)]
    size: Option<PageSize>,

    /// margin, as a fraction of each image's width
    #[arg(short, long)]
    margin: Option<Margin>,

    /// page orientation (ignored with --size fit)
    #[arg(long)]
    orientation: Option<Orientation>,

    /// keep and reorder images by position (e.g. "3,1-2")
    #[arg(long)]
    order: Option<String>,

    /// seconds to wait for each image to decode
    #[arg(
        long,
        default_value_t = DEFAULT_DECODE_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    decode_timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// combine images into a PDF, one page per image
    Convert {
        #[command(flatten)]
        layout: LayoutArgs,

        /// output PDF path, "-" for stdout (default <filename>.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// output file name without extension (default "file")
        #[arg(short, long)]
        filename: Option<String>,

        /// compress image and content streams harder
        #[arg(short, long, overrides_with = "no_compress")]
        compress: bool,

        /// turn compression off, even if the options file enables it
        #[arg(long, overrides_with = "compress")]
        no_compress: bool,

        /// PDF title metadata
        #[arg(long)]
        title: Option<String>,

        /// PDF author metadata
        #[arg(long)]
        author: Option<String>,
    },
    /// print the page layout as JSON without writing a PDF
    Plan {
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// generate shell completions
    Completions {
        /// shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// resolve options, ingest the inputs and apply --order
fn load(
    args: &LayoutArgs,
    threads: Option<usize>,
    previews: &PreviewRegistry,
) -> Result<(ImageList, PdfOptions)> {
    let mut options = match &args.options {
        Some(path) => PdfOptions::load(path)
            .with_context(|| format!("Invalid options file {}", path.display()))?,
        None => PdfOptions::default(),
    };
    if let Some(size) = args.size {
        options.size = size;
    }
    if let Some(margin) = args.margin {
        options.margin = margin;
    }
    if let Some(orientation) = args.orientation {
        options.orientation = orientation;
    }

    let paths = parse::expand_image_paths(&args.images)?;
    let ingest = IngestOptions {
        decode_timeout: Duration::from_secs(args.decode_timeout),
        threads,
        ..Default::default()
    };
    let records = ingest_files(&paths, &ingest, previews)?;

    let mut images = ImageList::new();
    images.extend(records)?;
    if let Some(order) = &args.order {
        let positions = parse::parse_order(order, images.len())?;
        images.select_order(&positions)?;
    }
    Ok((images, options))
}

/// write next to the target and rename, so a failed run leaves nothing behind
fn write_output(output: &Path, bytes: &[u8]) -> Result<()> {
    if output == Path::new("-") {
        let stdout = std::io::stdout();
        let mut out = std::io::BufWriter::new(stdout.lock());
        out.write_all(bytes)
            .and_then(|_| out.flush())
            .context("Failed to write PDF to stdout")?;
        return Ok(());
    }
    let mut partial = output.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    let result = std::fs::write(&partial, bytes)
        .and_then(|_| std::fs::rename(&partial, output));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e).with_context(|| format!("Failed to save {}", output.display()));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Convert {
            layout,
            output,
            filename,
            compress,
            no_compress,
            title,
            author,
        } => {
            let start = std::time::Instant::now();
            let previews = PreviewRegistry::new();
            let (mut images, mut options) = load(&layout, cli.threads, &previews)?;
            if let Some(name) = filename {
                options = options.with_filename(&name);
            }
            if compress {
                options.compress = true;
            } else if no_compress {
                options.compress = false;
            }

            let output = output.unwrap_or_else(|| PathBuf::from(options.output_file_name()));
            log::info!("Converting {} image(s) -> {}", images.len(), output.display());

            let bytes = render_pdf(&images, &options, Metadata { title, author })?;
            write_output(&output, &bytes)?;
            let pages = images.len();
            images.reset();

            log::info!(
                "Done. {} page(s) saved in {:.2}s",
                pages,
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Plan { layout } => {
            let previews = PreviewRegistry::new();
            let (images, options) = load(&layout, cli.threads, &previews)?;
            let plans = plan_document(&images, &options)?;
            let json = serde_json::to_string_pretty(&plans).context("Failed to encode plan")?;
            println!("{}", json);
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "picpdf",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
