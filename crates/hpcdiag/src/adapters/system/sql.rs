//! SQL Server probe through `sqlcmd`

use async_trait::async_trait;
use tokio::process::Command;

use super::{command_failure, exec};
use crate::adapters::{ProbeResult, SqlConnection, SqlProbe, TrustPolicy};
use crate::checks::extract_sql_instance;
use crate::error::ProbeError;

const SQLCMD_PASSWORD_ENV: &str = "SQLCMDPASSWORD";

/// Authentication named by a connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlAuth {
    Integrated,
    Login { user: String, password: String },
}

fn connection_value<'a>(connection_string: &'a str, keys: &[&str]) -> Option<&'a str> {
    connection_string.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        keys.contains(&key.as_str()).then(|| value.trim())
    })
}

pub fn parse_auth(connection_string: &str) -> SqlAuth {
    let integrated = connection_value(connection_string, &["integrated security", "trusted_connection"])
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "sspi"))
        .unwrap_or(false);
    match connection_value(connection_string, &["user id", "uid", "user"]) {
        Some(user) if !integrated => SqlAuth::Login {
            user: user.to_string(),
            password: connection_value(connection_string, &["password", "pwd"])
                .unwrap_or("")
                .to_string(),
        },
        _ => SqlAuth::Integrated,
    }
}

/// First data row of `sqlcmd -h -1 -W -s "|"` output
pub fn parse_pair(output: &str) -> Option<(String, String)> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('('))
        .and_then(|l| l.split_once('|'))
        .map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlcmdProbe;

impl SqlcmdProbe {
    fn command(&self, conn: &SqlConnection, query: &str) -> ProbeResult<Command> {
        let program = which::which("sqlcmd").map_err(|_| ProbeError::unavailable("sqlcmd not found on PATH"))?;
        let mut cmd = Command::new(program);
        cmd.args(["-S", &conn.instance, "-b", "-h", "-1", "-W", "-s", "|", "-Q", query]);
        match parse_auth(&conn.connection_string) {
            SqlAuth::Integrated => {
                cmd.arg("-E");
            }
            SqlAuth::Login { user, password } => {
                cmd.args(["-U", &user]).env(SQLCMD_PASSWORD_ENV, password);
            }
        }
        if conn.trust == TrustPolicy::AcceptInvalidCerts {
            cmd.arg("-C");
        }
        Ok(cmd)
    }

    async fn run(&self, conn: &SqlConnection, query: &str) -> ProbeResult<String> {
        let output = exec(self.command(conn, query)?, None).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(command_failure("sqlcmd", &output))
        }
    }
}

#[async_trait]
impl SqlProbe for SqlcmdProbe {
    async fn connect(&self, connection_string: &str, trust: TrustPolicy) -> ProbeResult<SqlConnection> {
        let instance = extract_sql_instance(connection_string)
            .ok_or_else(|| ProbeError::validation("connection string names no server"))?;
        let conn = SqlConnection {
            instance,
            connection_string: connection_string.to_string(),
            trust,
        };
        self.run(&conn, "SET NOCOUNT ON; SELECT 1").await?;
        Ok(conn)
    }

    async fn query_scalar_pair(&self, conn: &SqlConnection, query: &str) -> ProbeResult<(String, String)> {
        let script = format!("SET NOCOUNT ON; {}", query);
        let out = self.run(conn, &script).await?;
        parse_pair(&out).ok_or_else(|| ProbeError::failed("query returned no rows"))
    }
}
