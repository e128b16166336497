//! SQL connectivity check for the cluster databases

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{CheckContext, CheckModule, Tip};
use crate::adapters::TrustPolicy;
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::CheckResult;
use crate::timeout::TimeoutClass;

const VERSION_QUERY: &str = "SELECT SERVERPROPERTY('Edition'), SERVERPROPERTY('ProductVersion')";

static INSTANCE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|;)\s*(?:data\s+source|server|address|addr|network\s+address)\s*=\s*([^;]+)")
        .expect("valid instance pattern")
});

static SECRET_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)((?:^|;)\s*(?:password|pwd)\s*=\s*)[^;]*").expect("valid secret pattern")
});

/// SQL instance named by a connection string
pub fn extract_sql_instance(connection_string: &str) -> Option<String> {
    INSTANCE_KEY
        .captures(connection_string)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_start_matches("tcp:").to_string())
        .filter(|s| !s.is_empty())
}

/// Replace password values with `****`
pub fn mask_connection_string(connection_string: &str) -> String {
    SECRET_KEY.replace_all(connection_string, "${1}****").into_owned()
}

pub struct SqlTraceCheck;

#[async_trait]
impl CheckModule for SqlTraceCheck {
    fn mode(&self) -> RunMode {
        RunMode::SqlTrace
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new(
                "sqlcmd -S <instance> -E -C -Q \"SELECT @@VERSION\"",
                "Connect with Windows authentication and print the server version",
            ),
            Tip::new(
                "Get-ItemProperty HKLM:\\SOFTWARE\\Microsoft\\HPC\\Security | Select *ConnectionString",
                "Connection strings used by the HPC services",
            ),
            Tip::new(
                "sqlcmd -S <instance> -E -C -Q \"SELECT name, state_desc FROM sys.databases\"",
                "Database state on the instance",
            ),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let config = ctx
            .try_probe(TimeoutClass::Command, ctx.adapters.config.read_cluster_config())
            .await?;
        let Some(connection_string) = config.connection_string else {
            ctx.emit(CheckResult::warn("Connection string", "not configured on this host"));
            return Ok(());
        };
        ctx.verbose_note(format!("Connection string: {}", mask_connection_string(&connection_string)));

        let Some(instance) = extract_sql_instance(&connection_string) else {
            ctx.emit(CheckResult::error("SQL instance", "no Data Source, Server or Address key"));
            return Ok(());
        };
        ctx.emit(CheckResult::ok("SQL instance", &instance));

        // The cluster databases commonly use self-signed certificates
        let sql = &ctx.adapters.sql;
        if let Some(conn) = ctx
            .probe(
                "SQL connect",
                TimeoutClass::Sql,
                sql.connect(&connection_string, TrustPolicy::AcceptInvalidCerts),
            )
            .await
        {
            ctx.emit(CheckResult::ok("SQL connect", format!("connected to {}", conn.instance)));
            if let Some((edition, version)) = ctx
                .probe("SQL version", TimeoutClass::Sql, sql.query_scalar_pair(&conn, VERSION_QUERY))
                .await
            {
                ctx.emit(CheckResult::ok("SQL server", format!("{} {}", edition, version)));
            }
        }

        ctx.note("For a full statement trace run the SQL trace collector against this instance,");
        ctx.note("reproduce the problem, then open the trace with the trace analyzer.");
        Ok(())
    }
}
