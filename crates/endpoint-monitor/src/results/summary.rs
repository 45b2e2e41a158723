use std::collections::BTreeMap;

use serde::Serialize;

use super::log::AvailabilityRecord;
use crate::registry::Endpoint;

/// Long names of the INSPIRE download service operations.
pub fn service_label(service_type: &str) -> Option<&'static str> {
    match service_type {
        "GDSM" => Some("Get Download Service Metadata"),
        "DSDS" => Some("Describe Spatial Data Set"),
        "GSDS" => Some("Get Spatial Data Set"),
        _ => None,
    }
}

/// Availability statistics of one endpoint over the whole result log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilitySummary {
    pub endpoint_id: usize,
    pub country_code: Option<String>,
    pub service_type: Option<String>,
    /// `None` when the log mentions an id the endpoint list does not have
    pub url: Option<String>,
    pub checks: usize,
    /// Share of checks answered with HTTP 200
    pub available: f64,
    pub timeouts: f64,
    pub connection_errors: f64,
}

/// Group result rows by endpoint id, in ascending id order.
pub fn summarize(records: &[AvailabilityRecord], endpoints: &[Endpoint]) -> Vec<AvailabilitySummary> {
    let mut by_id: BTreeMap<usize, Vec<&AvailabilityRecord>> = BTreeMap::new();
    for record in records {
        by_id.entry(record.endpoint_id).or_default().push(record);
    }

    by_id
        .into_iter()
        .map(|(endpoint_id, rows)| {
            let endpoint = endpoints.iter().find(|endpoint| endpoint.id() == endpoint_id);
            let share = |matches: fn(&AvailabilityRecord) -> bool| {
                rows.iter().filter(|row| matches(row)).count() as f64 / rows.len() as f64
            };

            AvailabilitySummary {
                endpoint_id,
                country_code: endpoint.and_then(|e| e.country_code()).map(str::to_owned),
                service_type: endpoint.and_then(|e| e.service_type()).map(str::to_owned),
                url: endpoint.map(|e| e.url().to_string()),
                checks: rows.len(),
                available: share(|row| row.status_code == Some(200)),
                timeouts: share(|row| row.timeout),
                connection_errors: share(|row| row.connection_error),
            }
        })
        .collect()
}

/// Aligned plain-text table, one line per endpoint.
pub fn render_table(summaries: &[AvailabilitySummary]) -> String {
    let rows: Vec<[String; 8]> = summaries
        .iter()
        .map(|summary| {
            [
                summary.endpoint_id.to_string(),
                summary.country_code.clone().unwrap_or_else(|| "-".into()),
                summary.service_type.clone().unwrap_or_else(|| "-".into()),
                summary.checks.to_string(),
                percent(summary.available),
                percent(summary.timeouts),
                percent(summary.connection_errors),
                summary.url.clone().unwrap_or_else(|| "(unknown endpoint)".into()),
            ]
        })
        .collect();

    let header = ["ID", "COUNTRY", "SERVICE", "CHECKS", "AVAILABLE", "TIMEOUT", "CONN ERROR", "URL"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut line = |cells: [&str; 8]| {
        let text: Vec<String> = cells
            .iter()
            .zip(widths)
            .enumerate()
            .map(|(index, (cell, width))| match index {
                // numeric columns
                0 | 3..=6 => format!("{cell:>width$}"),
                _ => format!("{cell:<width$}"),
            })
            .collect();
        out.push_str(text.join("  ").trim_end());
        out.push('\n');
    };

    line(header);
    for row in &rows {
        line(row.each_ref().map(String::as_str));
    }
    out
}

fn percent(share: f64) -> String {
    format!("{:.1}%", share * 100.0)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::registry::{Layout, Registry};

    fn record(
        endpoint_id: usize,
        status_code: Option<u16>,
        timeout: bool,
        connection_error: bool,
    ) -> AvailabilityRecord {
        AvailabilityRecord {
            timestamp: Utc::now(),
            endpoint_id,
            status_code,
            content_length: None,
            content_type: None,
            duration: None,
            last_modified: None,
            timeout,
            connection_error,
        }
    }

    fn endpoints() -> Vec<Endpoint> {
        let list = "DE\tGSDS\thttps://example.de/sites.gml\nFR\tDSDS\thttps://example.fr/atom\n";
        Registry::parse(list, Layout::Reliability, "test").unwrap().into_endpoints()
    }

    #[test]
    fn test_shares_per_endpoint() {
        let records = [
            record(1, Some(200), false, false),
            record(0, Some(200), false, false),
            record(0, Some(503), false, false),
            record(0, None, true, false),
            record(0, None, false, true),
        ];

        let summaries = summarize(&records, &endpoints());

        assert_eq!(summaries.len(), 2);
        let first = &summaries[0];
        assert_eq!(first.endpoint_id, 0);
        assert_eq!(first.checks, 4);
        assert_eq!(first.available, 0.25);
        assert_eq!(first.timeouts, 0.25);
        assert_eq!(first.connection_errors, 0.25);
        assert_eq!(first.country_code.as_deref(), Some("DE"));
        assert_eq!(summaries[1].available, 1.0);
        assert_eq!(summaries[1].service_type.as_deref(), Some("DSDS"));
    }

    #[test]
    fn test_unknown_ids_are_still_reported() {
        let summaries = summarize(&[record(9, Some(200), false, false)], &endpoints());

        assert_eq!(summaries[0].url, None);
        assert!(render_table(&summaries).contains("(unknown endpoint)"));
    }

    #[test]
    fn test_table_is_aligned() {
        let records = [record(0, Some(200), false, false), record(1, None, true, false)];
        let table = render_table(&summarize(&records, &endpoints()));
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID  COUNTRY  SERVICE"));
        assert!(lines[1].contains("100.0%"));
        assert!(lines[2].contains("https://example.fr/atom"));
        let url_column = lines[0].find("URL").unwrap();
        assert_eq!(lines[1].find("https://"), Some(url_column));
    }

    #[test]
    fn test_service_labels() {
        assert_eq!(service_label("GSDS"), Some("Get Spatial Data Set"));
        assert_eq!(service_label("WMS"), None);
    }
}
