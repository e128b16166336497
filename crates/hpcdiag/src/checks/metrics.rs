//! Cluster metric checks and the metric history export

use async_trait::async_trait;
use chrono::{Local, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{CheckContext, CheckModule, Tip};
use crate::adapters::{MetricSample, MetricValue};
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::{format_timestamp, CheckResult};
use crate::timeout::TimeoutClass;

pub const METRIC_CSV_HEADER: &str = "Time,Counter,Instance,Node,Value";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Comma-delimited export with a header row
pub fn render_metric_csv(samples: &[MetricSample]) -> String {
    let mut out = String::with_capacity(64 * (samples.len() + 1));
    out.push_str(METRIC_CSV_HEADER);
    out.push('\n');
    for s in samples {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            s.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            csv_field(&s.counter),
            csv_field(&s.instance),
            csv_field(&s.node),
            s.value
        ));
    }
    out
}

/// Write the export, creating parent directories. Returns the absolute path.
pub async fn write_metric_csv(path: &Path, samples: &[MetricSample]) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    if let Some(parent) = absolute.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&absolute, render_metric_csv(samples)).await?;
    Ok(absolute)
}

fn summarize(values: &[MetricValue]) -> String {
    if values.is_empty() {
        return "no current values".to_string();
    }
    let avg = values.iter().map(|v| v.value).sum::<f64>() / values.len() as f64;
    let max = values.iter().map(|v| v.value).fold(f64::MIN, f64::max);
    format!("{} values, avg {:.2}, max {:.2}", values.len(), avg, max)
}

pub struct ClusterMetricsCheck;

#[async_trait]
impl CheckModule for ClusterMetricsCheck {
    fn mode(&self) -> RunMode {
        RunMode::ClusterMetrics
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcMetric", "Metrics collected by the cluster"),
            Tip::new("Get-HpcMetricValue -Name HPCCpuUsage", "Current value of one metric on every node"),
            Tip::new("Get-HpcMetricValueHistory -StartDate <date> -EndDate <date>", "Stored metric history"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let cluster = &ctx.adapters.cluster;
        let metrics = ctx
            .try_probe(TimeoutClass::ClusterApi, cluster.list_metrics())
            .await?;
        ctx.emit(CheckResult::ok("Metrics", format!("{} defined", metrics.len())));

        for metric in &metrics {
            let Some(values) = ctx
                .probe(&metric.name, TimeoutClass::ClusterApi, cluster.get_metric_value(&metric.name))
                .await
            else {
                continue;
            };
            ctx.emit(CheckResult::ok(&metric.name, summarize(&values)));
            if let Some(description) = &metric.description {
                ctx.verbose_note(description);
            }
            let unit = metric.unit.as_deref().unwrap_or("");
            let rows: Vec<Vec<String>> = values
                .iter()
                .map(|v| {
                    vec![
                        v.node.clone().unwrap_or_else(|| "-".to_string()),
                        v.instance.clone().unwrap_or_else(|| "-".to_string()),
                        format!("{:.2} {}", v.value, unit).trim_end().to_string(),
                        format_timestamp(v.time),
                    ]
                })
                .collect();
            ctx.verbose_table(&["Node", "Instance", "Value", "Time"], &rows);
        }
        Ok(())
    }
}

pub struct MetricValueHistoryCheck;

#[async_trait]
impl CheckModule for MetricValueHistoryCheck {
    fn mode(&self) -> RunMode {
        RunMode::MetricValueHistory
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new(
                "Get-HpcMetricValueHistory -StartDate (Get-Date).AddDays(-7) -EndDate (Get-Date)",
                "Metric history for the last week",
            ),
            Tip::new(
                "Get-HpcMetricValueHistory ... | Export-Csv MetricValueHistory.csv -NoTypeInformation",
                "Save the history as CSV",
            ),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let window = ctx.target.metric_window(Local::now())?;
        ctx.note(format!(
            "Window: {} to {}",
            window.start.format("%Y-%m-%d %H:%M"),
            window.end.format("%Y-%m-%d %H:%M")
        ));

        let samples = ctx
            .try_probe(
                TimeoutClass::ClusterApi,
                ctx.adapters.cluster.get_metric_value_history(
                    window.start.with_timezone(&Utc),
                    window.end.with_timezone(&Utc),
                ),
            )
            .await?;

        let destination = write_metric_csv(&ctx.target.metric_output_path, &samples).await?;
        info!("metric history written to {}", destination.display());
        ctx.emit(CheckResult::ok(
            "Metric history",
            format!("{} rows written to {}", samples.len(), destination.display()),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{FakeCluster, Harness, FAKE_NOW};
    use super::super::ModuleOutcome;
    use super::*;
    use crate::target::{ProbeTarget, VerbosityMode};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn sample(counter: &str, node: &str, value: f64, hours_ago: i64) -> MetricSample {
        MetricSample {
            time: *FAKE_NOW - ChronoDuration::hours(hours_ago),
            counter: counter.to_string(),
            instance: "_Total".to_string(),
            node: node.to_string(),
            value,
        }
    }

    #[test]
    fn test_csv_layout_and_escaping() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let samples = vec![MetricSample {
            time,
            counter: "Memory, Available".to_string(),
            instance: String::new(),
            node: "CN01".to_string(),
            value: 2048.5,
        }];
        assert_eq!(
            render_metric_csv(&samples),
            "Time,Counter,Instance,Node,Value\n2024-03-01T12:00:00Z,\"Memory, Available\",,CN01,2048.5\n"
        );
    }

    #[tokio::test]
    async fn test_history_export_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("out").join("history.csv");
        let cluster = FakeCluster {
            samples: vec![
                sample("HPCCpuUsage", "CN01", 12.0, 2),
                sample("HPCCpuUsage", "CN02", 80.0, 1),
                sample("HPCCpuUsage", "CN01", 5.0, 24 * 30),
            ],
            ..Default::default()
        };
        let harness = Harness::new(VerbosityMode::Concise)
            .with_target(ProbeTarget::new("head01").with_metric_output(&output));
        let adapters = harness.adapters.clone().with_cluster(Arc::new(cluster));
        let harness = harness.with_adapters(adapters);

        assert_eq!(harness.run_module(&MetricValueHistoryCheck).await, ModuleOutcome::Completed);
        let written = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], METRIC_CSV_HEADER);
        assert!(harness
            .output()
            .contains(&format!("2 rows written to {}", output.display())));
    }

    #[tokio::test]
    async fn test_history_rejects_inverted_window() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("history.csv");
        let start = Local.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let end = Local.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let target = ProbeTarget::new("head01")
            .with_metric_window(Some(start), Some(end))
            .with_metric_output(&output);
        let harness = Harness::new(VerbosityMode::Concise).with_target(target);

        let outcome = harness.run_module(&MetricValueHistoryCheck).await;
        assert!(matches!(outcome, ModuleOutcome::Invalid(_)));
        assert!(harness.output().contains("[ERROR] MetricValueHistory: Validation error"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_cluster_metrics_summary() {
        let harness = Harness::new(VerbosityMode::Concise);
        harness.run_module(&ClusterMetricsCheck).await;
        let out = harness.output();
        assert!(out.contains("[OK] Metrics: 1 defined"));
        assert!(out.contains("[OK] HPCCpuUsage: 1 values, avg 42.00, max 42.00"));
        assert!(!out.contains("Instance"));

        let verbose = Harness::new(VerbosityMode::Verbose);
        verbose.run_module(&ClusterMetricsCheck).await;
        assert!(verbose.output().contains("42.00 %"));
    }
}
