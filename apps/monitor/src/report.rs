use anyhow::{Context, Result};
use endpoint_monitor::results::{render_table, service_label, summarize};
use endpoint_monitor::{Layout, Registry, ResultLog};

use crate::cli::ReportArgs;

pub async fn run(args: ReportArgs) -> Result<()> {
    let endpoints = Registry::load(&args.endpoints, Layout::Reliability)
        .with_context(|| format!("failed to load endpoint list {}", args.endpoints.display()))?
        .into_endpoints();
    let records = ResultLog::new(&args.results)
        .read_all()
        .await
        .context("failed to read availability results")?;

    let summaries = summarize(&records, &endpoints);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    print!("{}", render_table(&summaries));

    let mut services: Vec<&str> =
        summaries.iter().filter_map(|summary| summary.service_type.as_deref()).collect();
    services.sort_unstable();
    services.dedup();
    if !services.is_empty() {
        println!();
    }
    for service in services {
        println!("{service}: {}", service_label(service).unwrap_or("unknown service type"));
    }
    Ok(())
}
