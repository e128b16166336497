//! HTTPS requests with a per-request trust policy
//!
//! A fresh client is built for every request, so an identity or a relaxed
//! certificate check never outlives the call that asked for it.

use async_trait::async_trait;
use reqwest::{Client, Identity};
use tracing::debug;

use crate::adapters::{ClientCredential, HttpsProbe, HttpsResponse, ProbeResult, TrustPolicy};
use crate::error::ProbeError;

pub fn build_client(credential: Option<&ClientCredential>, trust: TrustPolicy) -> ProbeResult<Client> {
    let mut builder = Client::builder()
        .use_rustls_tls()
        .danger_accept_invalid_certs(trust == TrustPolicy::AcceptInvalidCerts);
    if let Some(credential) = credential {
        let identity = Identity::from_pem(&credential.pem)
            .map_err(|e| ProbeError::failed(format!("client certificate {}: {}", credential.info.thumbprint, e)))?;
        builder = builder.identity(identity);
    }
    Ok(builder.build()?)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestHttps;

#[async_trait]
impl HttpsProbe for ReqwestHttps {
    async fn get(
        &self,
        url: &str,
        credential: Option<&ClientCredential>,
        trust: TrustPolicy,
    ) -> ProbeResult<HttpsResponse> {
        debug!(
            "GET {} (client certificate: {}, trust: {:?})",
            url,
            credential.is_some(),
            trust
        );
        let client = build_client(credential, trust)?;
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpsResponse { status, body })
    }
}
