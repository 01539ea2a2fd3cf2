use std::io;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use idxgrep::config;
use idxgrep::exits;
use idxgrep::grep::SyncWriter;
use idxgrep::index::RegexpIndex;
use idxgrep::search::{self, SearchOptions};
use idxgrep::store::Client;

#[derive(Parser)]
#[command(name = "idxgrep", about = "Search indexed files with a regular expression")]
struct Cli {
    /// Query mode
    #[arg(short = 'q', value_enum, default_value = "regexp")]
    mode: QueryMode,

    /// Case insensitive matching
    #[arg(long = "q.i")]
    case_insensitive: bool,

    /// List matching files only
    #[arg(long = "q.l")]
    list_only: bool,

    /// Show line numbers
    #[arg(long = "q.n")]
    line_numbers: bool,

    /// Omit file names
    #[arg(long = "q.h")]
    omit_names: bool,

    /// Max number of results
    #[arg(short = 'n', default_value_t = 10)]
    count: usize,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// The pattern to search for
    pattern: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QueryMode {
    Regexp,
}

fn main() {
    // clap exits with 2 on usage errors, which is what grep-likes use.
    let cli = Cli::parse();
    idxgrep::init_logging(cli.verbose);

    let result = match cli.mode {
        QueryMode::Regexp => run(&cli),
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

    let options = SearchOptions {
        case_insensitive: cli.case_insensitive,
        list_only: cli.list_only,
        line_numbers: cli.line_numbers,
        omit_names: cli.omit_names,
        limit: cli.count,
    };

    // Grep does not treat "no match" as an error.
    search::run(&index, &cli.pattern, &options, SyncWriter::new(io::stdout()))?;
    Ok(())
}
