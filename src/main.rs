mod compare;
mod crawl_log;
mod crawler;
mod error;
mod links;
mod parser;
mod record;
mod settings;
mod table;
mod throttle;
mod workbook;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use compare::classify::Label;
use compare::reference::ColumnSpec;
use compare::{CompareOptions, CompareOutput};
use crawler::{CrawlOutput, Crawler};
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "autocheck",
    about = "Crawl receipt links read from QR codes and reconcile them against the reimbursement sheet"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CrawlArgs {
    /// CSV with the scanned links (default: lidos.csv)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Minimum seconds between requests to the same host (default: 0.55)
    #[arg(short, long)]
    delay: Option<f64>,
    /// Per-request timeout in seconds (default: 10)
    #[arg(short, long)]
    timeout: Option<u64>,
    /// Directory for numbered outputs (default: outputs)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
}

#[derive(Args)]
struct CompareArgs {
    /// Reference spreadsheet exported as CSV
    #[arg(short, long)]
    reference: PathBuf,
    /// Document number column in the reference (default: auto-detect)
    #[arg(long)]
    key_column: Option<String>,
    /// Description column used for keyword rules (default: auto-detect)
    #[arg(long)]
    desc_column: Option<String>,
    /// Reference amount column (default: auto-detect)
    #[arg(long)]
    amount_column: Option<String>,
    /// Accept the nearest document number within this distance (0 = exact only)
    #[arg(long, default_value = "0")]
    max_diff: u64,
    /// Also write a formatted resultados-N.xlsx
    #[arg(long)]
    xlsx: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every link and extract numero, emissao and valor_pagar
    Crawl(CrawlArgs),
    /// Classify reference rows against an extracted table
    Compare {
        #[command(flatten)]
        args: CompareArgs,
        /// Extracted table (default: newest extraidos-N.csv in the output dir)
        #[arg(short, long)]
        extracted: Option<PathBuf>,
        /// Directory for numbered outputs (default: outputs)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Write a formatted .xlsx copy of a results table
    Format {
        /// Results table (default: newest resultados-N.csv in the output dir)
        results: Option<PathBuf>,
        /// Workbook path (default: the results path with .xlsx)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Directory for numbered outputs (default: outputs)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Crawl, then compare against the table just produced
    Run {
        #[command(flatten)]
        crawl: CrawlArgs,
        #[command(flatten)]
        compare: CompareArgs,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    info!(settings = ?settings, "Starting autocheck");

    let result = match cli.command {
        Commands::Crawl(args) => {
            apply_crawl_args(&mut settings, &args);
            run_crawl(&settings).map(|_| ())
        }
        Commands::Compare {
            args,
            extracted,
            out_dir,
        } => {
            if let Some(dir) = out_dir {
                settings.output_dir = dir;
            }
            run_compare(&settings, &args, extracted).map(|_| ())
        }
        Commands::Format {
            results,
            out,
            out_dir,
        } => {
            if let Some(dir) = out_dir {
                settings.output_dir = dir;
            }
            run_format(&settings, results, out)
        }
        Commands::Run { crawl, compare: cmp } => {
            apply_crawl_args(&mut settings, &crawl);
            let crawled = run_crawl(&settings)?;
            run_compare(&settings, &cmp, Some(crawled.extracted)).map(|_| ())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn apply_crawl_args(settings: &mut Settings, args: &CrawlArgs) {
    if let Some(p) = &args.input {
        settings.links = p.clone();
    }
    if let Some(d) = args.delay {
        settings.delay = d;
    }
    if let Some(t) = args.timeout {
        settings.timeout = t;
    }
    if let Some(dir) = &args.out_dir {
        settings.output_dir = dir.clone();
    }
}

fn run_crawl(settings: &Settings) -> anyhow::Result<CrawlOutput> {
    let delay = settings.delay()?;
    let urls = links::load_links(&settings.links)?;
    if urls.is_empty() {
        println!("No links found in {}", settings.links.display());
    } else {
        println!(
            "Crawling {} links (delay {:.2}s per host, timeout {}s)...",
            urls.len(),
            delay.as_secs_f64(),
            settings.timeout
        );
    }

    let mut crawler = Crawler::new(settings)?;
    let out = crawler
        .crawl(&urls, &settings.output_dir)
        .context("Crawl aborted")?;

    println!(
        "Done: {} processed ({} ok, {} failed).",
        out.stats.total, out.stats.ok, out.stats.errors
    );
    println!("Extracted table: {}", out.extracted.display());
    println!("Log:             {}", out.log.display());
    if out.stats.errors > 0 {
        println!("Failed links are listed in the log; raise --timeout or --delay and re-run if needed.");
    }
    Ok(out)
}

fn run_compare(
    settings: &Settings,
    args: &CompareArgs,
    extracted: Option<PathBuf>,
) -> anyhow::Result<CompareOutput> {
    let opts = CompareOptions {
        reference: args.reference.clone(),
        extracted,
        out_dir: settings.output_dir.clone(),
        columns: ColumnSpec {
            key: args.key_column.clone(),
            desc: args.desc_column.clone(),
            amount: args.amount_column.clone(),
        },
        max_diff: args.max_diff,
    };
    let out = compare::run(&opts).context("Compare aborted")?;

    println!(
        "Compared {} reference rows against {}",
        out.results.len(),
        out.extracted.display()
    );
    for label in Label::ALL {
        if let Some(n) = out.counts.get(&label) {
            println!("  {:<15} {:>5}", label.as_str(), n);
        }
    }
    println!("Results: {}", out.path.display());
    if args.xlsx {
        let xlsx = workbook::write_workbook(&out.path, &workbook::default_path(&out.path))
            .context("Formatting aborted")?;
        println!("Workbook: {}", xlsx.display());
    }
    Ok(out)
}

fn run_format(settings: &Settings, results: Option<PathBuf>, out: Option<PathBuf>) -> anyhow::Result<()> {
    let results = match results {
        Some(p) => p,
        None => table::latest_results(&settings.output_dir)?,
    };
    let out = out.unwrap_or_else(|| workbook::default_path(&results));
    let written = workbook::write_workbook(&results, &out).context("Formatting aborted")?;
    println!("Wrote {}", written.display());
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
