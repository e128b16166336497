//! Certificate, local configuration and node communication checks

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::sql::mask_connection_string;
use super::{CheckContext, CheckModule, Tip};
use crate::adapters::{CertStoreLocation, CertificateInfo, ClientCredential, TrustPolicy};
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::{truncate, CheckResult};
use crate::timeout::TimeoutClass;

/// Scheduler endpoint of the cluster naming service
pub fn naming_endpoint(scheduler: &str) -> String {
    format!(
        "https://{}/HpcNaming/api/fabric/resolve/singleton/SchedulerStatefulService",
        scheduler
    )
}

/// Certificate found for this node
#[derive(Debug, Clone)]
pub enum LocatedCertificate {
    /// Loaded from a PFX file, key material included
    Loaded(ClientCredential),
    InStore(CertificateInfo),
}

impl LocatedCertificate {
    pub fn info(&self) -> &CertificateInfo {
        match self {
            LocatedCertificate::Loaded(credential) => &credential.info,
            LocatedCertificate::InStore(info) => info,
        }
    }
}

/// Pick the certificate to present: explicit PFX, then explicit thumbprint,
/// then a subject match from the first store, in search order, that has one.
pub async fn locate_certificate(ctx: &CheckContext<'_>) -> Option<LocatedCertificate> {
    let certs = &ctx.adapters.certificates;
    let overrides = &ctx.target.client_cert;

    if let Some(path) = &overrides.pfx_path {
        return ctx
            .probe(
                "Client certificate",
                TimeoutClass::Command,
                certs.load_pfx(path, overrides.pfx_password.as_deref()),
            )
            .await
            .map(LocatedCertificate::Loaded);
    }

    if let Some(thumbprint) = &overrides.thumbprint {
        for store in CertStoreLocation::SEARCH_ORDER {
            let label = format!("Certificate store {}", store);
            if let Some(Some(found)) = ctx
                .probe(&label, TimeoutClass::Command, certs.find_by_thumbprint(store, thumbprint))
                .await
            {
                return Some(LocatedCertificate::InStore(found));
            }
        }
        ctx.emit(CheckResult::error(
            "Client certificate",
            format!("thumbprint {} not found", thumbprint),
        ));
        return None;
    }

    let pattern = &ctx.settings.certificates.subject_pattern;
    for store in CertStoreLocation::SEARCH_ORDER {
        let label = format!("Certificate store {}", store);
        let found = ctx
            .probe(&label, TimeoutClass::Command, certs.find_by_subject_substring(store, pattern))
            .await
            .unwrap_or_default();
        if let Some(best) = best_match(found, Utc::now()) {
            return Some(LocatedCertificate::InStore(best));
        }
    }
    None
}

/// Prefer a private key, then not expired, then the latest expiry. Earlier
/// entries win ties.
pub fn best_match(candidates: Vec<CertificateInfo>, now: DateTime<Utc>) -> Option<CertificateInfo> {
    candidates
        .into_iter()
        .rev()
        .max_by_key(|c| (c.has_private_key, !c.is_expired(now), c.not_after))
}

/// A located certificate with its private key, or `None` with the reason rendered
pub async fn resolve_client_credential(ctx: &CheckContext<'_>) -> Option<ClientCredential> {
    let located = match locate_certificate(ctx).await {
        Some(located) => located,
        // an explicit override already rendered why it failed
        None if ctx.target.client_cert.is_set() => return None,
        None => {
            ctx.emit(CheckResult::warn(
                "Client certificate",
                format!("none found matching '{}'", ctx.settings.certificates.subject_pattern),
            ));
            return None;
        }
    };
    let info = located.info();
    if !info.has_private_key {
        ctx.emit(CheckResult::warn(
            "Client certificate",
            format!("{} has no private key", info.subject),
        ));
        return None;
    }
    ctx.emit(CheckResult::ok("Client certificate", describe(info)));

    match located {
        LocatedCertificate::Loaded(credential) => Some(credential),
        LocatedCertificate::InStore(info) => {
            ctx.probe(
                "Client certificate export",
                TimeoutClass::Command,
                ctx.adapters.certificates.export_credential(&info),
            )
            .await
        }
    }
}

fn describe(info: &CertificateInfo) -> String {
    match info.store {
        Some(store) => format!("{} ({}) in {}", info.subject, info.thumbprint, store),
        None => format!("{} ({}) from {}", info.subject, info.thumbprint, info.source.display()),
    }
}

/// ERROR when expired, WARN inside the warning window, OK otherwise
pub fn expiry_result(info: &CertificateInfo, now: chrono::DateTime<Utc>, warning_days: i64) -> CheckResult {
    let date = info.not_after.format("%Y-%m-%d");
    if info.is_expired(now) {
        CheckResult::error("Certificate expiry", format!("expired on {}", date))
    } else {
        let days = info.days_until_expiry(now);
        let result = if days < warning_days {
            CheckResult::warn("Certificate expiry", format!("expires on {} ({} days left)", date, days))
        } else {
            CheckResult::ok("Certificate expiry", format!("valid until {}", date))
        };
        result.with_metric(days as f64)
    }
}

// ============================================================================

pub struct DiagnosticTestsCheck;

impl DiagnosticTestsCheck {
    async fn self_test(&self, ctx: &CheckContext<'_>) {
        let diagnostics = &ctx.settings.diagnostics;
        let process = &ctx.adapters.process;
        let Some(binary) = process.locate(&diagnostics.self_test_binary).await else {
            ctx.emit(CheckResult::warn(
                "Self-test",
                format!("{} not found", diagnostics.self_test_binary),
            ));
            return;
        };
        ctx.verbose_note(format!("Running {}", binary.display()));

        if let Some(output) = ctx
            .probe(
                "Self-test",
                TimeoutClass::Command,
                process.run(&binary, &diagnostics.self_test_args),
            )
            .await
        {
            if output.success() {
                ctx.emit(CheckResult::ok("Self-test", "passed"));
            } else {
                let code = output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                ctx.emit(CheckResult::error("Self-test", format!("failed (exit {})", code)));
                for line in output.stderr.lines().filter(|l| !l.trim().is_empty()).take(3) {
                    ctx.note(line.trim());
                }
            }
            for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
                ctx.verbose_note(line.trim());
            }
        }
    }
}

#[async_trait]
impl CheckModule for DiagnosticTestsCheck {
    fn mode(&self) -> RunMode {
        RunMode::DiagnosticTests
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("HpcDiagnosticHost.exe -CertificateTest", "Built-in certificate self-test"),
            Tip::new(
                "Get-ChildItem Cert:\\LocalMachine\\My | Where Subject -like '*HPC*' | Format-List Subject,Thumbprint,NotAfter,HasPrivateKey",
                "HPC certificates in the machine store",
            ),
            Tip::new("certutil -verifystore My <thumbprint>", "Chain and private key check for one certificate"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        self.self_test(ctx).await;

        let Some(located) = locate_certificate(ctx).await else {
            ctx.emit(CheckResult::warn(
                "Client certificate",
                format!("none found matching '{}'", ctx.settings.certificates.subject_pattern),
            ));
            return Ok(());
        };
        let info = located.info();
        ctx.emit(CheckResult::ok("Client certificate", &info.subject));
        ctx.note(format!("Thumbprint: {}", info.thumbprint));
        ctx.emit(expiry_result(info, Utc::now(), ctx.settings.certificates.expiry_warning_days));
        if info.has_private_key {
            ctx.emit(CheckResult::ok("Private key", "present"));
        } else {
            ctx.emit(CheckResult::error("Private key", "missing"));
        }
        ctx.verbose_note(format!("Source: {}", info.source.display()));
        Ok(())
    }
}

// ============================================================================

pub struct NodeConfigCheck;

#[async_trait]
impl CheckModule for NodeConfigCheck {
    fn mode(&self) -> RunMode {
        RunMode::NodeConfig
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-ItemProperty HKLM:\\SOFTWARE\\Microsoft\\HPC", "Cluster settings of this node"),
            Tip::new("Get-ItemProperty HKLM:\\SOFTWARE\\Microsoft\\HPC -Name SSLThumbprint", "Configured certificate"),
            Tip::new("Get-ChildItem Cert:\\LocalMachine\\My\\<thumbprint>", "Confirm the certificate is installed"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let config = ctx
            .try_probe(TimeoutClass::Command, ctx.adapters.config.read_cluster_config())
            .await?;

        match &config.installed_role {
            Some(role) => ctx.emit(CheckResult::ok("Installed role", role)),
            None => ctx.emit(CheckResult::warn("Installed role", "not set")),
        }
        match &config.connection_string {
            Some(conn) => ctx.emit(CheckResult::ok("Connection string", mask_connection_string(conn))),
            None => ctx.emit(CheckResult::warn("Connection string", "not set")),
        }
        let Some(thumbprint) = &config.cert_thumbprint else {
            ctx.emit(CheckResult::warn("Certificate thumbprint", "not set"));
            return Ok(());
        };
        ctx.emit(CheckResult::ok("Certificate thumbprint", thumbprint));

        for store in CertStoreLocation::SEARCH_ORDER {
            let label = format!("Certificate store {}", store);
            let Some(found) = ctx
                .probe(
                    &label,
                    TimeoutClass::Command,
                    ctx.adapters.certificates.find_by_thumbprint(store, thumbprint),
                )
                .await
            else {
                continue;
            };
            if let Some(info) = found {
                ctx.emit(CheckResult::ok("Certificate installed", format!("found in {}", store)));
                ctx.verbose_note(format!("Subject: {}", info.subject));
                ctx.verbose_note(format!("Expires: {}", info.not_after.format("%Y-%m-%d")));
                return Ok(());
            }
        }
        ctx.emit(CheckResult::error(
            "Certificate installed",
            format!(
                "{} not found in {} or {}",
                thumbprint,
                CertStoreLocation::LocalMachine,
                CertStoreLocation::CurrentUser
            ),
        ));
        Ok(())
    }
}

// ============================================================================

pub struct CommunicationTestCheck;

#[async_trait]
impl CheckModule for CommunicationTestCheck {
    fn mode(&self) -> RunMode {
        RunMode::CommunicationTest
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new(
                "Invoke-WebRequest https://<head node>/HpcNaming/api/fabric/resolve/singleton/SchedulerStatefulService -Certificate <cert>",
                "Call the naming service with the node certificate",
            ),
            Tip::new("Test-NetConnection <head node> -Port 443", "HTTPS port on the head node"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let credential = resolve_client_credential(ctx).await;
        if credential.is_none() {
            ctx.emit(CheckResult::warn("Client certificate", "proceeding without client certificate"));
        }

        let url = naming_endpoint(&ctx.target.scheduler);
        ctx.verbose_note(format!("GET {}", url));
        // Relaxed trust applies to this one request only
        if let Some(response) = ctx
            .probe(
                "Naming service",
                TimeoutClass::ClusterApi,
                ctx.adapters
                    .https
                    .get(&url, credential.as_ref(), TrustPolicy::AcceptInvalidCerts),
            )
            .await
        {
            if response.is_success() {
                ctx.emit(CheckResult::ok("Naming service", format!("HTTP {}", response.status)));
            } else {
                ctx.emit(CheckResult::error("Naming service", format!("HTTP {}", response.status)));
            }
            ctx.verbose_note(truncate(response.body.trim(), 200));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{
        assert_concise_subset_of_verbose, cert, CallCounter, FakeCerts, FakeHttps, FakeProcess, Harness,
    };
    use super::*;
    use crate::adapters::Adapters;
    use crate::target::{ClientCertOverride, ProbeTarget, VerbosityMode};
    use chrono::Duration as ChronoDuration;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn harness_with(
        verbosity: VerbosityMode,
        certs: FakeCerts,
        https: Arc<FakeHttps>,
    ) -> Harness {
        let harness = Harness::new(verbosity);
        let adapters = harness
            .adapters
            .clone()
            .with_certificates(Arc::new(certs))
            .with_https(https);
        harness.with_adapters(adapters)
    }

    #[test]
    fn test_naming_endpoint() {
        assert_eq!(
            naming_endpoint("head01"),
            "https://head01/HpcNaming/api/fabric/resolve/singleton/SchedulerStatefulService"
        );
    }

    #[test]
    fn test_expiry_result_thresholds() {
        let now = Utc::now();
        let expired = CertificateInfo {
            not_after: now - ChronoDuration::days(1),
            ..cert("CN=HPC", "AA", true, 0)
        };
        assert_eq!(expiry_result(&expired, now, 30).status, crate::report::CheckStatus::Error);
        let soon = CertificateInfo {
            not_after: now + ChronoDuration::days(10) + ChronoDuration::hours(1),
            ..expired.clone()
        };
        let result = expiry_result(&soon, now, 30);
        assert_eq!(result.status, crate::report::CheckStatus::Warn);
        assert!(result.detail.contains("10 days left"));
        let later = CertificateInfo {
            not_after: now + ChronoDuration::days(90),
            ..expired
        };
        assert_eq!(expiry_result(&later, now, 30).status, crate::report::CheckStatus::Ok);
    }

    #[tokio::test]
    async fn test_communication_with_discovered_certificate() {
        let https = Arc::new(FakeHttps::default());
        let certs = FakeCerts {
            machine: vec![cert("CN=HPC Pack Node Communication", "AB12", true, 200)],
            ..Default::default()
        };
        let harness = harness_with(VerbosityMode::Concise, certs, https.clone());
        harness.run_module(&CommunicationTestCheck).await;

        let requests = https.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].1);
        assert_eq!(requests[0].2, TrustPolicy::AcceptInvalidCerts);
        let out = harness.output();
        assert!(out.contains("[OK] Client certificate: CN=HPC Pack Node Communication (AB12) in LocalMachine\\My"));
        assert!(out.contains("[OK] Naming service: HTTP 200"));
    }

    #[tokio::test]
    async fn test_communication_without_private_key_still_requests() {
        let https = Arc::new(FakeHttps::default());
        let certs = FakeCerts {
            machine: vec![cert("CN=HPC Pack Node Communication", "AB12", false, 200)],
            ..Default::default()
        };
        let harness = harness_with(VerbosityMode::Concise, certs, https.clone());
        harness.run_module(&CommunicationTestCheck).await;

        let requests = https.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].1);
        let out = harness.output();
        assert!(out.contains("has no private key"));
        assert!(out.contains("proceeding without client certificate"));
    }

    #[tokio::test]
    async fn test_user_store_is_searched_after_machine_store() {
        let https = Arc::new(FakeHttps::default());
        let certs = FakeCerts {
            machine: Vec::new(),
            user: vec![cert("CN=HPC User", "CD34", true, 100)],
            ..Default::default()
        };
        let harness = harness_with(VerbosityMode::Concise, certs, https);
        harness.run_module(&CommunicationTestCheck).await;
        assert!(harness.output().contains("(CD34) in CurrentUser\\My"));
    }

    #[tokio::test]
    async fn test_machine_store_match_beats_longer_lived_user_match() {
        let https = Arc::new(FakeHttps::default());
        let certs = FakeCerts {
            machine: vec![cert("CN=HPC Machine", "MACH", true, 100)],
            user: vec![cert("CN=HPC User", "USER", true, 400)],
            ..Default::default()
        };
        let harness = harness_with(VerbosityMode::Concise, certs, https);
        harness.run_module(&CommunicationTestCheck).await;
        let out = harness.output();
        assert!(out.contains("[OK] Client certificate: CN=HPC Machine (MACH) in LocalMachine\\My"));
        assert!(!out.contains("USER"));
    }

    #[test]
    fn test_best_match_within_one_store() {
        let now = Utc::now();
        let pick = |certs: Vec<CertificateInfo>| best_match(certs, now).map(|c| c.thumbprint);
        assert_eq!(
            pick(vec![cert("CN=HPC", "NOKEY", false, 900), cert("CN=HPC", "KEY", true, 10)]),
            Some("KEY".to_string())
        );
        assert_eq!(
            pick(vec![cert("CN=HPC", "OLD", true, -5), cert("CN=HPC", "NEW", true, 5)]),
            Some("NEW".to_string())
        );
        assert_eq!(
            pick(vec![cert("CN=HPC", "FIRST", true, 50), cert("CN=HPC", "SECOND", true, 50)]),
            Some("FIRST".to_string())
        );
        assert_eq!(pick(Vec::new()), None);
    }

    #[tokio::test]
    async fn test_pfx_override_wins() {
        let https = Arc::new(FakeHttps::default());
        let target = ProbeTarget::new("head01").with_client_cert(ClientCertOverride {
            pfx_path: Some(PathBuf::from("client.pfx")),
            pfx_password: Some("secret".to_string()),
            thumbprint: None,
        });
        let harness = harness_with(VerbosityMode::Concise, FakeCerts::default(), https.clone()).with_target(target);
        harness.run_module(&CommunicationTestCheck).await;
        assert!(harness.output().contains("CN=PfxClient (FFEE) from client.pfx"));
        assert!(https.requests.lock()[0].1);
    }

    #[tokio::test]
    async fn test_thumbprint_override_not_found() {
        let https = Arc::new(FakeHttps::default());
        let target = ProbeTarget::new("head01").with_client_cert(ClientCertOverride {
            thumbprint: Some("99:99".to_string()),
            ..Default::default()
        });
        let harness = harness_with(VerbosityMode::Concise, FakeCerts::default(), https.clone()).with_target(target);
        harness.run_module(&CommunicationTestCheck).await;
        let out = harness.output();
        assert!(out.contains("[ERROR] Client certificate: thumbprint 99:99 not found"));
        assert!(!out.contains("none found matching"));
        assert!(out.contains("proceeding without client certificate"));
        assert_eq!(https.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_diagnostic_tests_reports_certificate() {
        let harness = Harness::new(VerbosityMode::Concise);
        harness.run_module(&DiagnosticTestsCheck).await;
        let out = harness.output();
        assert!(out.contains("[OK] Self-test: passed"));
        assert!(out.contains("[OK] Client certificate: CN=HPC Pack Node Communication"));
        assert!(out.contains("Thumbprint: AB12"));
        assert!(out.contains("[OK] Certificate expiry: valid until"));
        assert!(out.contains("[OK] Private key: present"));
    }

    #[tokio::test]
    async fn test_diagnostic_tests_without_binary() {
        let harness = Harness::new(VerbosityMode::Concise);
        let adapters = harness.adapters.clone().with_process(Arc::new(FakeProcess {
            calls: CallCounter::default(),
            present: false,
        }));
        let harness = harness.with_adapters(adapters);
        harness.run_module(&DiagnosticTestsCheck).await;
        assert!(harness.output().contains("[WARN] Self-test: HpcDiagnosticHost not found"));
    }

    #[tokio::test]
    async fn test_node_config_finds_thumbprint() {
        let harness = Harness::new(VerbosityMode::Concise);
        harness.run_module(&NodeConfigCheck).await;
        let out = harness.output();
        assert!(out.contains("[OK] Installed role: HN"));
        assert!(out.contains("[OK] Certificate thumbprint: AB12"));
        assert!(out.contains("[OK] Certificate installed: found in LocalMachine\\My"));
    }

    #[tokio::test]
    async fn test_node_config_missing_certificate() {
        let harness = Harness::new(VerbosityMode::Concise);
        let adapters = Adapters::unavailable()
            .with_config(harness.adapters.config.clone())
            .with_certificates(Arc::new(FakeCerts::default()));
        let harness = harness.with_adapters(adapters);
        harness.run_module(&NodeConfigCheck).await;
        assert!(harness
            .output()
            .contains("[ERROR] Certificate installed: AB12 not found in LocalMachine\\My or CurrentUser\\My"));
    }

    #[tokio::test]
    async fn test_concise_lines_also_verbose() {
        assert_concise_subset_of_verbose(&DiagnosticTestsCheck, Harness::new).await;
        assert_concise_subset_of_verbose(&NodeConfigCheck, Harness::new).await;
        assert_concise_subset_of_verbose(&CommunicationTestCheck, Harness::new).await;
    }
}
