use std::env;
use anyhow::Context;
use db_puke::config::{parse_args, PASSWORD_ENV};
use db_puke::{new_operator, DbExportProcessor, Error};

fn main() {
    if let Err(e) = run() {
        match e.downcast_ref::<Error>() {
            Some(Error::Usage(msg)) => eprintln!("{}", msg.trim_end()),
            _ => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = parse_args(&args, env::var(PASSWORD_ENV).ok())?;

    let operator = new_operator(&config);
    let mut processor = DbExportProcessor::new(config, operator)
        .context("Failed to prepare export")?;

    let summary = processor.process().context("Export aborted")?;

    let exported = summary.exported().count();
    let failed = summary.failures().count();
    println!(
        "Exported {} tables to {}{}",
        exported,
        processor.config().export.out_dir.display(),
        if failed > 0 {
            format!(", {} failed", failed)
        } else {
            String::new()
        }
    );
    Ok(())
}
