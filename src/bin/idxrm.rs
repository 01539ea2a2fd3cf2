use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use idxgrep::config;
use idxgrep::exits;
use idxgrep::index::RegexpIndex;
use idxgrep::store::Client;

#[derive(Parser)]
#[command(name = "idxrm", about = "Delete index entries for a path")]
struct Cli {
    /// Directory whose index entries to delete
    path: PathBuf,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(exits::USAGE);
        }
    };
    idxgrep::init_logging(false);

    if let Err(err) = run(&cli) {
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

    let target = std::path::absolute(&cli.path)?;
    let resp = index.delete(&target.to_string_lossy())?;
    println!(
        "deleted {} of {} matching entries ({} noops)",
        resp.deleted, resp.total, resp.noops
    );
    Ok(())
}
