//! Results reporting and formatting.

use crate::metrics::TestReport;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats test reports for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(report: &TestReport) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", report.scenario_name)]);

        table.add_row(vec!["Duration:", &format!("{:.1}s", report.elapsed_secs)]);
        table.add_row(vec![
            "VUs:",
            &format!("{} ({} stopped)", report.vus, report.stopped_vus),
        ]);
        table.add_row(vec!["Iterations:", &format!("{}", report.total_iterations)]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", report.requests_per_second),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Checks", "pass / fail"]);
        for (name, counts) in &report.checks {
            table.add_row(vec![
                format!("  {}", name),
                format!(
                    "{} / {} ({:.1}%)",
                    counts.pass,
                    counts.fail,
                    counts.pass_rate()
                ),
            ]);
        }

        table.add_row(vec!["", ""]);
        table.add_row(vec![
            "Call Failures:",
            &format!("{}", report.total_call_failures),
        ]);
        for (kind, count) in &report.call_failures_by_kind {
            table.add_row(vec![format!("  {}", kind), count.to_string()]);
        }

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                report.latency_p50,
                report.latency_p90,
                report.latency_p95,
                report.latency_p99,
                report.latency_max
            ),
        ]);
        table.add_row(vec![
            "Received:",
            &format!("{:.1} KB", report.bytes_received as f64 / 1000.0),
        ]);

        table.to_string()
    }

    /// Format results as JSON.
    pub fn format_json(report: &TestReport) -> serde_json::Result<String> {
        serde_json::to_string_pretty(report)
    }

    /// Format results as one CSV row matching [`ResultsReport::csv_header`].
    pub fn format_csv(report: &TestReport) -> csv::Result<String> {
        let (checks_passed, checks_failed) = report
            .checks
            .values()
            .fold((0, 0), |(p, f), c| (p + c.pass, f + c.fail));

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            report.timestamp.clone(),
            report.scenario_name.clone(),
            report.vus.to_string(),
            format!("{:.1}", report.elapsed_secs),
            report.total_iterations.to_string(),
            checks_passed.to_string(),
            checks_failed.to_string(),
            report.total_call_failures.to_string(),
            format!("{:.1}", report.requests_per_second),
            format!("{:.1}", report.latency_p50),
            format!("{:.1}", report.latency_p90),
            format!("{:.1}", report.latency_p99),
        ])?;
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        let row = String::from_utf8_lossy(&bytes);
        Ok(row.trim_end_matches(['\r', '\n']).to_string())
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,vus,duration,iterations,checks_passed,checks_failed,call_failures,rps,p50,p90,p99"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckCounts;
    use crate::metrics::MetricsCollector;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn report() -> TestReport {
        let mut metrics = MetricsCollector::new();
        metrics.record_response(Duration::from_millis(12), 10);
        metrics.record_call_failure("timeout");
        metrics.record_iteration();
        metrics.record_iteration();
        let mut checks = BTreeMap::new();
        checks.insert("login succeeded".to_string(), CheckCounts { pass: 1, fail: 0 });
        metrics.report("says".to_string(), 2, 2, Duration::from_secs(2), checks)
    }

    #[test]
    fn test_table_shows_checks_and_call_failures() {
        let table = ResultsReport::format_table(&report());
        assert!(table.contains("Load Test Results: says"));
        assert!(table.contains("login succeeded"));
        assert!(table.contains("1 / 0"));
        assert!(table.contains("Call Failures:"));
        assert!(table.contains("timeout"));
    }

    #[test]
    fn test_json_roundtrips_counts() {
        let json = ResultsReport::format_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["checks"]["login succeeded"]["pass"], 1);
        assert_eq!(value["total_call_failures"], 1);
        assert_eq!(value["total_iterations"], 2);
    }

    #[test]
    fn test_csv_matches_header() {
        let row = ResultsReport::format_csv(&report()).unwrap();
        assert_eq!(
            row.split(',').count(),
            ResultsReport::csv_header().split(',').count()
        );
        assert!(!row.ends_with('\n'));
    }

    #[test]
    fn test_csv_quotes_scenario_name() {
        let mut report = report();
        report.scenario_name = "a,b \"quoted\"".to_string();
        let output = format!(
            "{}\n{}\n",
            ResultsReport::csv_header(),
            ResultsReport::format_csv(&report).unwrap()
        );

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(output.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), rows[1].len());
        assert_eq!(&rows[1][1], "a,b \"quoted\"");
        assert_eq!(&rows[1][2], "2");
    }
}
