use crate::cli::{CidsArgs, Cli, Commands, FetchArgs, SmilesArgs};
use chemfetch::batch::{BatchResult, BatchRunner};
use chemfetch::config::Config;
use chemfetch::fetch::{FetchRequest, JsonExtractor, TextExtractor};
use chemfetch::pubchem::{PubChem, PubChemUrls};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(cli: Cli) -> Result<(), AnyError> {
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Config => print!("{}", config.to_toml()?),
        Commands::SmilesToCids(args) => smiles_to_cids(&config, args).await?,
        Commands::CidsToRecords(args) => cids_to_records(&config, args).await?,
        Commands::Fetch(args) => fetch(&config, args).await?,
    }

    Ok(())
}

fn pubchem(config: &Config, runner: BatchRunner, chunk_size: usize) -> Result<PubChem, AnyError> {
    let urls = PubChemUrls::new(&config.api.base_url)?;
    Ok(PubChem::new(runner, urls, chunk_size))
}

async fn smiles_to_cids(config: &Config, args: SmilesArgs) -> Result<(), AnyError> {
    let runner = BatchRunner::from_config(config)?;
    let client = pubchem(config, runner, config.batch.chunk_size)?;

    let result = client.smiles_to_cids(args.smiles).await;
    print_json(&report(&result))?;
    log_usage(client.runner());
    Ok(())
}

async fn cids_to_records(config: &Config, args: CidsArgs) -> Result<(), AnyError> {
    let runner = BatchRunner::from_config(config)?;
    let chunk_size = args.chunk_size.unwrap_or(config.batch.chunk_size);
    let client = pubchem(config, runner, chunk_size)?;

    let result = client.cids_to_records(args.cids).await;
    let mut output = report(&result);
    output["failed_cids"] = json!(result.failed_ids());
    print_json(&output)?;
    log_usage(client.runner());
    Ok(())
}

async fn fetch(config: &Config, args: FetchArgs) -> Result<(), AnyError> {
    let runner = BatchRunner::from_config(config)?;
    let build = |url: &String| FetchRequest {
        url: url.clone(),
        params: args.params.clone(),
        max_attempts: args.attempts,
    };

    let output = if args.json {
        let result = runner
            .run(args.urls.clone(), build, Arc::new(JsonExtractor::<Value>::new()))
            .await;
        report(&result)
    } else {
        let result = runner
            .run(args.urls.clone(), build, Arc::new(TextExtractor::new()))
            .await;
        report(&result)
    };

    print_json(&output)?;
    log_usage(&runner);
    Ok(())
}

fn report<W: Serialize, T: Serialize>(result: &BatchResult<W, T>) -> Value {
    let succeeded: Vec<Value> = result
        .succeeded
        .iter()
        .map(|s| json!({ "item": &s.item, "payload": &s.payload }))
        .collect();

    let failed: Vec<Value> = result
        .failed
        .iter()
        .map(|f| {
            json!({
                "item": &f.item,
                "status": f.status_code,
                "error": f.error.as_ref().map(ToString::to_string),
            })
        })
        .collect();

    json!({ "succeeded": succeeded, "failed": failed })
}

fn print_json(value: &Value) -> Result<(), AnyError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_usage(runner: &BatchRunner) {
    let fetcher = runner.fetcher();
    for (proxy, uses) in fetcher.usage().snapshot() {
        info!(%proxy, uses, "Proxy usage");
    }
    let metrics = fetcher.metrics().snapshot();
    info!(
        attempts = metrics.attempts,
        successes = metrics.successes,
        exhausted = metrics.exhausted,
        no_proxy = metrics.no_proxy,
        transport_errors = metrics.transport_errors,
        http_errors = metrics.http_errors,
        extraction_errors = metrics.extraction_errors,
        "Fetch metrics"
    );
}
