use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, ValueEnum};

use idxgrep::config;
use idxgrep::exits;
use idxgrep::index::RegexpIndex;
use idxgrep::store::Client;

#[derive(Parser)]
#[command(name = "idxadd", about = "Index a file tree for regexp search")]
struct Cli {
    /// Log each indexed and filtered file
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Index schema to use
    #[arg(short = 'i', value_enum, default_value = "regexp")]
    index_type: IndexType,

    /// Root directory to index
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IndexType {
    Regexp,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(exits::USAGE);
        }
    };
    idxgrep::init_logging(cli.verbose);

    let result = match cli.index_type {
        IndexType::Regexp => run(&cli),
    };
    if let Err(err) = result {
        log::error!("{:#}", err);
        process::exit(exits::code_for(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = config::load_file(&config::default_path())?;
    let client = Client::new(
        &cfg.global.server,
        &cfg.regexp_index.index,
        Duration::from_secs(cfg.global.timeout),
    )?;
    let index = RegexpIndex {
        client,
        max_filesize: cfg.regexp_index.max_filesize,
    };

    let start = Instant::now();
    index.create_index()?;
    let stats = index.add_tree(&cli.root)?;
    eprintln!(
        "Indexed {} and skipped {} files in {:.2?}",
        stats.indexed,
        stats.skipped,
        start.elapsed()
    );
    Ok(())
}
