use anyhow::{Context, Result};
use tracing::{error, info};

use super::{ImportError, ImportSummary, Importer};
use crate::db::JobStatus;

/// Runs a recorded import job and keeps its status and summary current.
///
/// On failure the job is marked `Failed` with the full error report and the
/// error is returned to the caller.
pub async fn run_import_job(
    importer: &Importer,
    job_id: &str,
    operator: Option<&str>,
) -> Result<ImportSummary> {
    let jobs = importer.database().job_store();
    let job = jobs
        .get_job(job_id)
        .await?
        .ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))?;

    jobs.set_job_status(&job.id, JobStatus::Running, "").await?;
    info!(job = %job.id, file = %job.source_file, "import job running");

    match importer
        .import(&job.source_file, Some(&job.workspace_name), operator)
        .await
    {
        Ok(summary) => {
            let rendered =
                serde_json::to_string_pretty(&summary).context("failed to render summary")?;
            jobs.set_job_status(&job.id, JobStatus::Completed, &rendered)
                .await?;
            info!(job = %job.id, "import job completed");
            Ok(summary)
        }
        Err(e) => {
            let err = anyhow::Error::new(e);
            // `{:?}` on anyhow renders the cause chain and, when enabled, the backtrace.
            let report = format!("{:?}", err);
            if let Err(status_err) = jobs.set_job_status(&job.id, JobStatus::Failed, &report).await
            {
                error!(job = %job.id, error = %status_err, "failed to record job failure");
            }
            error!(job = %job.id, error = %err, "import job failed");
            Err(err)
        }
    }
}
