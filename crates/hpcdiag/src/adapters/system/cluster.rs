//! Cluster management REST client

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::adapters::{
    ClusterApi, ClusterNode, ClusterOverview, ClusterProperty, JobQuery, JobSummary, JobTask, MetricInfo,
    MetricSample, MetricValue, NodeGroup, NodeStateChange, NodeTemplate, ProbeResult,
};
use crate::error::ProbeError;
use crate::settings::ClusterApiSettings;

/// JSON-over-HTTPS client for the head node's management endpoint
#[derive(Debug, Clone)]
pub struct RestClusterApi {
    client: Client,
    base_url: String,
}

/// `scheme://host/base` with exactly one slash between host and path
pub fn base_url(scheduler: &str, settings: &ClusterApiSettings) -> String {
    let path = settings.base_path.trim_matches('/');
    if path.is_empty() {
        format!("{}://{}", settings.scheme, scheduler)
    } else {
        format!("{}://{}/{}", settings.scheme, scheduler, path)
    }
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl RestClusterApi {
    pub fn new(scheduler: &str, settings: &ClusterApiSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .user_agent(concat!("hpcdiag/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url(scheduler, settings),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ProbeResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self.client.get(&url).query(query).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json::<T>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProbeError::failed(format!(
                "{}: access denied (HTTP {})",
                path,
                response.status().as_u16()
            ))),
            status => Err(ProbeError::failed(format!("{}: HTTP {}", path, status.as_u16()))),
        }
    }
}

#[async_trait]
impl ClusterApi for RestClusterApi {
    async fn list_nodes(&self) -> ProbeResult<Vec<ClusterNode>> {
        self.get("nodes", &[]).await
    }

    async fn list_jobs(&self, query: JobQuery) -> ProbeResult<Vec<JobSummary>> {
        self.get(
            "jobs",
            &[
                ("submittedSince", rfc3339(query.submitted_since)),
                ("limit", query.limit.to_string()),
            ],
        )
        .await
    }

    async fn get_job(&self, job_id: u32) -> ProbeResult<JobSummary> {
        self.get(&format!("jobs/{}", job_id), &[]).await
    }

    async fn list_tasks(&self, job_id: u32) -> ProbeResult<Vec<JobTask>> {
        self.get(&format!("jobs/{}/tasks", job_id), &[]).await
    }

    async fn list_metrics(&self) -> ProbeResult<Vec<MetricInfo>> {
        self.get("metrics", &[]).await
    }

    async fn get_metric_value(&self, metric: &str) -> ProbeResult<Vec<MetricValue>> {
        self.get("metrics/values", &[("name", metric.to_string())]).await
    }

    async fn get_metric_value_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProbeResult<Vec<MetricSample>> {
        self.get("metrics/history", &[("start", rfc3339(start)), ("end", rfc3339(end))])
            .await
    }

    async fn get_cluster_overview(&self) -> ProbeResult<ClusterOverview> {
        self.get("cluster", &[]).await
    }

    async fn get_cluster_properties(&self) -> ProbeResult<Vec<ClusterProperty>> {
        self.get("cluster/properties", &[]).await
    }

    async fn get_node_templates(&self) -> ProbeResult<Vec<NodeTemplate>> {
        self.get("nodetemplates", &[]).await
    }

    async fn get_groups(&self) -> ProbeResult<Vec<NodeGroup>> {
        self.get("groups", &[]).await
    }

    async fn get_node_state_history(
        &self,
        node: Option<&str>,
        since: DateTime<Utc>,
    ) -> ProbeResult<Vec<NodeStateChange>> {
        let mut query = vec![("since", rfc3339(since))];
        if let Some(node) = node {
            query.push(("node", node.to_string()));
        }
        self.get("nodes/history", &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let settings = ClusterApiSettings::default();
        assert_eq!(base_url("head01", &settings), "https://head01/hpc");

        let settings = ClusterApiSettings {
            scheme: "http".to_string(),
            base_path: "/".to_string(),
            accept_invalid_certs: true,
        };
        assert_eq!(base_url("head01:8080", &settings), "http://head01:8080");
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = ClusterApiSettings {
            scheme: "http".to_string(),
            ..Default::default()
        };
        let api = RestClusterApi::new(&format!("127.0.0.1:{}", port), &settings).unwrap();
        let err = api.list_nodes().await.unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable(_)), "{:?}", err);
    }
}
