use super::{open_results, report};
use crate::cli::args::BatchesArgs;
use crate::exit_codes;

pub fn run(args: BatchesArgs) -> anyhow::Result<i32> {
    if !args.db.exists() {
        eprintln!("error: result store {} does not exist", args.db.display());
        return Ok(exit_codes::STORE_ERROR);
    }
    let results = match open_results(&args.db) {
        Ok(r) => r,
        Err(e) => return Ok(report(&e)),
    };
    let batches = match results.batches() {
        Ok(b) => b,
        Err(e) => return Ok(report(&e)),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&batches)?);
        return Ok(exit_codes::SUCCESS);
    }
    for b in &batches {
        println!(
            "{}  {:<9}  {}  {:>6} records  input {}  {}",
            b.id,
            b.status.as_str(),
            b.created_at,
            b.record_count,
            b.input_digest.get(..12).unwrap_or(&b.input_digest),
            b.models.join(" -> ")
        );
        if let Some(err) = &b.error {
            println!("    {}", err);
        }
    }
    Ok(exit_codes::SUCCESS)
}
