//! Directory-backed certificate stores
//!
//! Each store is a directory of PEM files. Certificate fields are read with
//! the `openssl` command line tool; the private key is either inside the same
//! PEM file or in a sibling `.key` file.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::{command_failure, exec};
use crate::adapters::{
    normalize_thumbprint, CertStoreLocation, CertificateInfo, CertificateStore, ClientCredential, ProbeResult,
};
use crate::error::ProbeError;
use crate::settings::CertificateSettings;

const CERT_EXTENSIONS: &[&str] = &["pem", "crt", "cer"];

const PFX_PASSWORD_ENV: &str = "HPCDIAG_PFX_PASSWORD";

/// Fields printed by `openssl x509 -noout -subject -enddate -fingerprint -sha1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Text {
    pub subject: String,
    pub not_after: DateTime<Utc>,
    pub thumbprint: String,
}

/// `CN = HPC, O = Contoso` -> `CN=HPC, O=Contoso`
fn normalize_subject(raw: &str) -> String {
    raw.trim().replace(" = ", "=")
}

pub fn parse_x509_text(text: &str) -> Option<X509Text> {
    let mut subject = None;
    let mut not_after = None;
    let mut thumbprint = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "subject" => subject = Some(normalize_subject(value)),
            "notAfter" => {
                let compact = value.split_whitespace().collect::<Vec<_>>().join(" ");
                not_after = NaiveDateTime::parse_from_str(&compact, "%b %d %H:%M:%S %Y GMT")
                    .ok()
                    .map(|t| t.and_utc());
            }
            k if k.ends_with("Fingerprint") => thumbprint = Some(normalize_thumbprint(value)),
            _ => {}
        }
    }
    Some(X509Text {
        subject: subject?,
        not_after: not_after?,
        thumbprint: thumbprint?,
    })
}

fn has_key_block(pem: &str) -> bool {
    pem.contains("PRIVATE KEY-----")
}

fn sibling_key(path: &Path) -> PathBuf {
    path.with_extension("key")
}

async fn describe_pem(pem: &[u8]) -> ProbeResult<X509Text> {
    let program = which::which("openssl").map_err(|_| ProbeError::unavailable("openssl not found on PATH"))?;
    let mut cmd = Command::new(program);
    cmd.args(["x509", "-noout", "-subject", "-enddate", "-fingerprint", "-sha1"]);
    let output = exec(cmd, Some(pem)).await?;
    if !output.success() {
        return Err(command_failure("openssl x509", &output));
    }
    parse_x509_text(&output.stdout).ok_or_else(|| ProbeError::failed("unrecognized openssl x509 output"))
}

/// `LocalMachine\My` and `CurrentUser\My`, each backed by a directory
#[derive(Debug, Clone)]
pub struct FileCertificateStore {
    machine_dir: PathBuf,
    user_dir: PathBuf,
}

impl FileCertificateStore {
    pub fn new(machine_dir: PathBuf, user_dir: PathBuf) -> Self {
        Self { machine_dir, user_dir }
    }

    pub fn from_settings(settings: &CertificateSettings) -> Self {
        Self::new(settings.machine_store_dir.clone(), settings.user_store_dir.clone())
    }

    fn dir(&self, store: CertStoreLocation) -> &Path {
        match store {
            CertStoreLocation::LocalMachine => &self.machine_dir,
            CertStoreLocation::CurrentUser => &self.user_dir,
        }
    }

    async fn certificates(&self, store: CertStoreLocation) -> ProbeResult<Vec<CertificateInfo>> {
        let dir = self.dir(store);
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("certificate store {} has no directory {}", store, dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_cert = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| CERT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_cert {
                continue;
            }
            let pem = tokio::fs::read_to_string(&path).await?;
            let text = match describe_pem(pem.as_bytes()).await {
                Ok(text) => text,
                Err(e) if e.is_degraded() => return Err(e),
                Err(e) => {
                    debug!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let has_private_key = has_key_block(&pem) || sibling_key(&path).exists();
            found.push(CertificateInfo {
                subject: text.subject,
                thumbprint: text.thumbprint,
                not_after: text.not_after,
                has_private_key,
                store: Some(store),
                source: path,
            });
        }
        found.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(found)
    }
}

#[async_trait]
impl CertificateStore for FileCertificateStore {
    async fn find_by_subject_substring(
        &self,
        store: CertStoreLocation,
        pattern: &str,
    ) -> ProbeResult<Vec<CertificateInfo>> {
        let needle = pattern.to_lowercase();
        Ok(self
            .certificates(store)
            .await?
            .into_iter()
            .filter(|c| c.subject.to_lowercase().contains(&needle))
            .collect())
    }

    async fn find_by_thumbprint(
        &self,
        store: CertStoreLocation,
        thumbprint: &str,
    ) -> ProbeResult<Option<CertificateInfo>> {
        let wanted = normalize_thumbprint(thumbprint);
        Ok(self
            .certificates(store)
            .await?
            .into_iter()
            .find(|c| c.thumbprint == wanted))
    }

    async fn load_pfx(&self, path: &Path, password: Option<&str>) -> ProbeResult<ClientCredential> {
        if !path.exists() {
            return Err(ProbeError::failed(format!("PFX file {} not found", path.display())));
        }
        let program = which::which("openssl").map_err(|_| ProbeError::unavailable("openssl not found on PATH"))?;
        let mut cmd = Command::new(program);
        cmd.arg("pkcs12")
            .arg("-in")
            .arg(path)
            .args(["-nodes", "-passin"])
            .arg(format!("env:{}", PFX_PASSWORD_ENV))
            .env(PFX_PASSWORD_ENV, password.unwrap_or(""));
        let output = exec(cmd, None).await?;
        if !output.success() {
            return Err(command_failure("openssl pkcs12", &output));
        }
        let pem = output.stdout.into_bytes();
        let text = describe_pem(&pem).await?;
        let has_private_key = has_key_block(&String::from_utf8_lossy(&pem));
        Ok(ClientCredential {
            info: CertificateInfo {
                subject: text.subject,
                thumbprint: text.thumbprint,
                not_after: text.not_after,
                has_private_key,
                store: None,
                source: path.to_path_buf(),
            },
            pem,
        })
    }

    async fn export_credential(&self, cert: &CertificateInfo) -> ProbeResult<ClientCredential> {
        let mut pem = tokio::fs::read(&cert.source).await?;
        if !has_key_block(&String::from_utf8_lossy(&pem)) {
            let key_path = sibling_key(&cert.source);
            let key = tokio::fs::read(&key_path).await.map_err(|_| {
                ProbeError::failed(format!("no private key for {}", cert.source.display()))
            })?;
            pem.push(b'\n');
            pem.extend_from_slice(&key);
        }
        Ok(ClientCredential {
            info: cert.clone(),
            pem,
        })
    }
}
