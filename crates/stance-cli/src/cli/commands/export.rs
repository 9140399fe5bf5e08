use super::rows::write_jsonl;
use super::{open_results, report};
use crate::cli::args::ExportArgs;
use crate::exit_codes;
use tracing::warn;

pub fn run(args: ExportArgs) -> anyhow::Result<i32> {
    if !args.db.exists() {
        eprintln!("error: result store {} does not exist", args.db.display());
        return Ok(exit_codes::STORE_ERROR);
    }
    let results = match open_results(&args.db) {
        Ok(r) => r,
        Err(e) => return Ok(report(&e)),
    };
    let table = match results
        .open_batch(&args.batch)
        .and_then(|b| b.read(args.link))
    {
        Ok(t) => t,
        Err(e) => return Ok(report(&e)),
    };
    if table.is_empty() {
        warn!(batch_id = %args.batch, link = args.link, "no table for this link");
    }
    let values = table
        .rows
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    write_jsonl(args.output.as_deref(), values)?;
    Ok(exit_codes::SUCCESS)
}
