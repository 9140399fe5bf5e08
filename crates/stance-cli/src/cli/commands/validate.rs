use super::report;
use crate::cli::args::ValidateArgs;
use crate::exit_codes;
use stance_core::config::load_config;
use stance_core::engine::ChainOrchestrator;
use stance_core::providers::ModelCache;

pub async fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let cfg = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => return Ok(report(&e)),
    };
    // Construction checks credentials; the endpoint only with --probe.
    let chain = match ChainOrchestrator::from_config_with(&cfg, &ModelCache::new(), args.probe).await
    {
        Ok(c) => c,
        Err(e) => return Ok(report(&e)),
    };

    println!(
        "ok: {} link(s), labels [{}]",
        chain.links().len(),
        chain.labels().iter().collect::<Vec<_>>().join(", ")
    );
    for (k, link) in chain.links().iter().enumerate() {
        let threshold = match link.threshold {
            Some(t) if k + 1 < chain.links().len() => format!("{}", t),
            _ => "-".to_string(),
        };
        println!(
            "  [{}] {} ({}) threshold {}",
            k,
            link.link.model_id(),
            link.link.strategy().as_str(),
            threshold
        );
    }
    Ok(exit_codes::SUCCESS)
}
