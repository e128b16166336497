//! Job and node history checks

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;

use super::{CheckContext, CheckModule, Tip};
use crate::adapters::{JobQuery, JobState, JobSummary, JobTask};
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::{format_timestamp, truncate, CheckResult};
use crate::timeout::TimeoutClass;

/// Most recent jobs considered by the history check
pub const JOB_HISTORY_LIMIT: usize = 100;

/// Task table column limits
pub const COMMAND_COLUMN_WIDTH: usize = 40;
pub const ERROR_COLUMN_WIDTH: usize = 50;

/// `"Failed 2, Finished 5"`, ordered by state
fn state_histogram<'a>(states: impl Iterator<Item = &'a JobState>) -> String {
    let mut counts: BTreeMap<JobState, usize> = BTreeMap::new();
    for state in states {
        *counts.entry(*state).or_default() += 1;
    }
    counts
        .iter()
        .map(|(state, n)| format!("{} {}", state, n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn average(values: impl Iterator<Item = i64>) -> Option<i64> {
    let (sum, count) = values.fold((0i64, 0i64), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count)
}

fn optional_time(time: Option<chrono::DateTime<Utc>>) -> String {
    time.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}

/// Latest `limit` jobs, newest first
pub fn recent_jobs(mut jobs: Vec<JobSummary>, limit: usize) -> Vec<JobSummary> {
    jobs.sort_by(|a, b| b.submit_time.cmp(&a.submit_time).then(b.id.cmp(&a.id)));
    jobs.truncate(limit);
    jobs
}

pub struct JobHistoryCheck;

#[async_trait]
impl CheckModule for JobHistoryCheck {
    fn mode(&self) -> RunMode {
        RunMode::JobHistory
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcJob -State All -Count 100", "Most recent jobs"),
            Tip::new("Get-HpcJob -State Failed", "Failed jobs"),
            Tip::new("Get-HpcJobHistory -StartDate (Get-Date).AddDays(-7)", "Job history for the last week"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let days = ctx.target.days_back;
        let query = JobQuery {
            submitted_since: ctx.target.days_back_since(Utc::now())?,
            limit: JOB_HISTORY_LIMIT,
        };
        let jobs = ctx
            .try_probe(TimeoutClass::ClusterApi, ctx.adapters.cluster.list_jobs(query))
            .await?;
        let jobs = recent_jobs(jobs, JOB_HISTORY_LIMIT);

        if jobs.is_empty() {
            ctx.emit(CheckResult::ok("Jobs", format!("none in the last {} days", days)));
            return Ok(());
        }

        ctx.emit(CheckResult::ok("Jobs", format!("{} in the last {} days", jobs.len(), days)));
        ctx.note(format!("By state: {}", state_histogram(jobs.iter().map(|j| &j.state))));
        let failed = jobs.iter().filter(|j| j.state == JobState::Failed).count();
        if failed > 0 {
            ctx.emit(CheckResult::warn("Failed jobs", failed.to_string()));
        }

        let rows: Vec<Vec<String>> = jobs
            .iter()
            .map(|j| {
                vec![
                    j.id.to_string(),
                    j.name.clone(),
                    j.owner.clone(),
                    j.state.to_string(),
                    format_timestamp(j.submit_time),
                ]
            })
            .collect();
        ctx.sample_table(&["Id", "Name", "Owner", "State", "Submitted"], &rows);

        if let Some(wait) = average(jobs.iter().filter_map(JobSummary::wait_secs)) {
            ctx.verbose_note(format!("Average wait: {}s", wait));
        }
        if let Some(run) = average(jobs.iter().filter_map(JobSummary::run_secs)) {
            ctx.verbose_note(format!("Average run time: {}s", run));
        }
        Ok(())
    }
}

// ============================================================================

fn task_rows(tasks: &[JobTask]) -> Vec<Vec<String>> {
    tasks
        .iter()
        .map(|t| {
            vec![
                t.task_id.to_string(),
                t.state.to_string(),
                t.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                t.node.clone().unwrap_or_else(|| "-".to_string()),
                truncate(&t.command_line, COMMAND_COLUMN_WIDTH),
                truncate(t.error_message.as_deref().unwrap_or(""), ERROR_COLUMN_WIDTH),
            ]
        })
        .collect()
}

pub struct JobDetailsCheck;

#[async_trait]
impl CheckModule for JobDetailsCheck {
    fn mode(&self) -> RunMode {
        RunMode::JobDetails
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcJob -Id <id> | Format-List *", "Every property of one job"),
            Tip::new("Get-HpcTask -JobId <id> | Format-Table TaskId,State,ExitCode,CommandLine", "Tasks of a job"),
            Tip::new("Get-HpcTask -JobId <id> -State Failed | Select ErrorMessage,Output", "Why tasks failed"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let job_id = ctx
            .target
            .job_id
            .ok_or_else(|| ProbeError::validation("JobDetails requires -JobId"))?;
        let cluster = &ctx.adapters.cluster;
        let job = ctx
            .try_probe(TimeoutClass::ClusterApi, cluster.get_job(job_id))
            .await?;

        ctx.emit(CheckResult::ok(
            format!("Job {}", job.id),
            format!("{} by {}: {}", job.name, job.owner, job.state),
        ));
        ctx.note(format!(
            "Submitted {}, started {}, ended {}",
            format_timestamp(job.submit_time),
            optional_time(job.start_time),
            optional_time(job.end_time)
        ));
        ctx.verbose_note(format!("Priority: {}", job.priority));

        let Some(tasks) = ctx
            .probe("Tasks", TimeoutClass::ClusterApi, cluster.list_tasks(job_id))
            .await
        else {
            return Ok(());
        };
        if tasks.is_empty() {
            ctx.emit(CheckResult::ok("Tasks", "none"));
            return Ok(());
        }
        ctx.emit(CheckResult::ok(
            "Tasks",
            format!("{}: {}", tasks.len(), state_histogram(tasks.iter().map(|t| &t.state))),
        ));
        let failed = tasks.iter().filter(|t| t.state == JobState::Failed).count();
        if failed > 0 {
            ctx.emit(CheckResult::warn("Failed tasks", failed.to_string()));
        }
        ctx.sample_table(&["Task", "State", "Exit", "Node", "Command", "Error"], &task_rows(&tasks));
        Ok(())
    }
}

// ============================================================================

pub struct NodeHistoryCheck;

#[async_trait]
impl CheckModule for NodeHistoryCheck {
    fn mode(&self) -> RunMode {
        RunMode::NodeHistory
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcNodeStateHistory -StartDate (Get-Date).AddDays(-7)", "State changes across the cluster"),
            Tip::new("Get-HpcNodeStateHistory -Name <node>", "State changes of one node"),
            Tip::new("Get-HpcNode -Name <node> | Format-List *", "Current node properties"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let days = ctx.target.days_back;
        let since = ctx.target.days_back_since(Utc::now())?;
        let node = ctx.target.node_name.as_deref();
        let mut changes = ctx
            .try_probe(
                TimeoutClass::ClusterApi,
                ctx.adapters.cluster.get_node_state_history(node, since),
            )
            .await?;
        changes.sort_by(|a, b| b.time.cmp(&a.time));

        let scope = match node {
            Some(name) => format!("for {} ", name),
            None => String::new(),
        };
        if changes.is_empty() {
            ctx.emit(CheckResult::ok(
                "Node history",
                format!("no state changes {}in the last {} days", scope, days),
            ));
            return Ok(());
        }
        ctx.emit(CheckResult::ok(
            "Node history",
            format!("{} state changes {}in the last {} days", changes.len(), scope, days),
        ));

        let mut transitions: BTreeMap<String, usize> = BTreeMap::new();
        for change in &changes {
            *transitions
                .entry(format!("{:?} -> {:?}", change.from_state, change.to_state))
                .or_default() += 1;
        }
        for (transition, count) in &transitions {
            ctx.note(format!("{}: {}", transition, count));
        }

        let rows: Vec<Vec<String>> = changes
            .iter()
            .map(|c| {
                vec![
                    format_timestamp(c.time),
                    c.node.clone(),
                    format!("{:?}", c.from_state),
                    format!("{:?}", c.to_state),
                    c.reason.clone().unwrap_or_default(),
                ]
            })
            .collect();
        ctx.verbose_table(&["Time", "Node", "From", "To", "Reason"], &rows);
        Ok(())
    }
}
