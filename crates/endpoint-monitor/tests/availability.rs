use std::sync::Arc;
use std::time::Duration;

use endpoint_monitor::checks::{FetchError, FetchedResponse};
use endpoint_monitor::results::{render_table, summarize};
use endpoint_monitor::testing::ScriptedFetcher;
use endpoint_monitor::{AvailabilityMonitor, CheckExecutor, Layout, Registry, ResultLog, Scheduler};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

const LIST: &str = "\
DE\tGSDS\thttps://example.de/download/sites.gml
# paused until the server moves
FR\tGSDS\tnot a url
AT\tDSDS\thttps://example.at/atom.xml
";

#[tokio::test]
async fn test_availability_end_to_end() {
    let dir = tempdir().unwrap();
    let list_path = dir.path().join("endpoints.tsv");
    std::fs::write(&list_path, LIST).unwrap();

    // Only the URL column matters for probing; ids follow the data rows of the list
    let registry = Registry::load(&list_path, Layout::Availability { url_column: 2 }).unwrap();
    assert_eq!(registry.rejected().len(), 1);
    let ids: Vec<usize> = registry.endpoints().iter().map(|e| e.id()).collect();
    assert_eq!(ids, vec![0, 2]);

    let fetcher = ScriptedFetcher::new([
        Ok(FetchedResponse {
            status: 200,
            content_type: Some("application/gml+xml".into()),
            elapsed: Duration::from_millis(120),
            ..Default::default()
        }),
        Err(FetchError::Timeout(Duration::from_millis(500))),
    ]);
    let executor = Arc::new(CheckExecutor::new(Arc::new(fetcher), Duration::from_millis(500)));
    let log = Arc::new(ResultLog::new(dir.path().join("results.tsv")));

    let monitor = AvailabilityMonitor::new(
        registry.into_endpoints(),
        Arc::clone(&log),
        executor,
        Duration::from_secs(3_600),
    );
    let mut scheduler = Scheduler::new(Duration::from_millis(10)).unwrap().run_all_first(true);
    monitor.schedule(&mut scheduler).unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    let tracker = handle.await.unwrap();
    tracker.wait().await;

    let records = log.read_all().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.status_code == Some(200) && !r.timeout));
    assert!(records.iter().any(|r| r.status_code.is_none() && r.timeout));

    // The report reads the same list with its country and service columns
    let endpoints = Registry::load(&list_path, Layout::Reliability).unwrap().into_endpoints();
    let summaries = summarize(&records, &endpoints);
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].endpoint_id, 0);
    assert_eq!(summaries[1].endpoint_id, 2);
    assert_eq!(summaries[0].country_code.as_deref(), Some("DE"));
    assert_eq!(summaries[1].service_type.as_deref(), Some("DSDS"));

    let available: f64 = summaries.iter().map(|s| s.available).sum();
    let timeouts: f64 = summaries.iter().map(|s| s.timeouts).sum();
    assert_eq!((available, timeouts), (1.0, 1.0));
    assert_eq!(render_table(&summaries).lines().count(), 3);
}
