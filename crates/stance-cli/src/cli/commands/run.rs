use super::rows::{annotate, read_rows, write_jsonl};
use super::{open_results, report};
use crate::cli::args::RunArgs;
use crate::exit_codes;
use stance_core::config::{load_config, validate_filters};
use stance_core::engine::ChainOrchestrator;
use stance_core::model::Record;
use stance_core::providers::ModelCache;
use tracing::info;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let cfg = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => return Ok(report(&e)),
    };
    let filters = if args.filters.is_empty() {
        cfg.filters.clone()
    } else {
        args.filters.clone()
    };
    if let Err(e) = validate_filters(&filters, cfg.links.len()) {
        return Ok(report(&e));
    }

    let rows = match read_rows(&args.input) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Ok(exit_codes::INPUT_ERROR);
        }
    };
    let records: Vec<Record> = rows.iter().map(|r| r.record.clone()).collect();

    let chain = match ChainOrchestrator::from_config(&cfg, ModelCache::global()).await {
        Ok(c) => c,
        Err(e) => return Ok(report(&e)),
    };
    let results = match open_results(&args.db) {
        Ok(r) => r,
        Err(e) => return Ok(report(&e)),
    };

    let output = match chain.run(&records, &results).await {
        Ok(o) => o,
        Err(e) => return Ok(report(&e)),
    };
    let batch_id = output.batch_id.clone();
    let kept = output.into_filtered(&filters);

    let annotated = kept
        .iter()
        .map(|row| annotate(&rows[row.index], row))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let written = write_jsonl(Some(&args.output), annotated)?;
    info!(
        batch_id = %batch_id,
        records = records.len(),
        written,
        dropped = records.len() - written,
        output = %args.output.display(),
        "run finished"
    );
    println!("{}", batch_id);
    Ok(exit_codes::SUCCESS)
}
