use super::args::*;
use crate::exit_codes;
use stance_core::ChainError;

pub mod batches;
pub mod export;
pub mod rows;
pub mod run;
pub mod validate;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Export(args) => export::run(args),
        Command::Batches(args) => batches::run(args),
        Command::Validate(args) => validate::run(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Print a chain error and map it to its exit code.
pub(crate) fn report(err: &ChainError) -> i32 {
    eprintln!("error: {err}");
    match err {
        ChainError::Configuration { .. } => exit_codes::CONFIG_ERROR,
        ChainError::LinkInference { unresolved, .. } => {
            let shown: Vec<String> = unresolved.iter().take(20).map(|i| i.to_string()).collect();
            let more = if unresolved.len() > shown.len() { ", ..." } else { "" };
            eprintln!("unresolved records: [{}{}]", shown.join(", "), more);
            exit_codes::LINK_FAILED
        }
        ChainError::Store { .. } => exit_codes::STORE_ERROR,
    }
}

pub(crate) fn open_results(db: &std::path::Path) -> Result<stance_core::storage::ResultStore, ChainError> {
    let store = stance_core::storage::Store::open(db).map_err(ChainError::store)?;
    store.init_schema().map_err(ChainError::store)?;
    Ok(stance_core::storage::ResultStore::new(store))
}
