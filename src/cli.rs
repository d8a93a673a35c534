use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::db::ImportJob;
use crate::importer::{ImportError, Importer, run_import_job};

#[derive(Parser, Debug)]
#[command(name = "slack-import")]
#[command(about = "Import Slack export archives into a Raven chat store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Import a Slack export ZIP")]
    Import {
        #[arg(short, long, help = "file:// URL, /private/files/<name>, /files/<name> or a bare name")]
        file: String,

        #[arg(short, long, help = "Target workspace name")]
        workspace: Option<String>,

        #[arg(short, long, help = "Operator identity id or email")]
        operator: Option<String>,
    },

    #[command(about = "Add the operator to a workspace and all of its channels")]
    JoinWorkspace {
        #[arg(short, long)]
        workspace: Option<String>,

        #[arg(short, long)]
        operator: Option<String>,
    },

    #[command(about = "Create or re-enable an operator identity")]
    RegisterOperator {
        #[arg(short, long)]
        email: String,

        #[arg(long)]
        full_name: Option<String>,
    },

    #[command(about = "List recent import jobs")]
    Jobs {
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    #[command(about = "Show one import job")]
    Job { id: String },

    #[command(about = "Validate the configuration file")]
    ValidateConfig,
}

/// Runs a command against the store and returns what should be printed.
pub async fn execute(command: Commands, importer: &Importer) -> Result<String> {
    match command {
        Commands::Import {
            file,
            workspace,
            operator,
        } => {
            let job = importer.create_job(&file, workspace.as_deref()).await?;
            let summary = run_import_job(importer, &job.id, operator.as_deref()).await?;
            Ok(serde_json::to_string_pretty(&summary)?)
        }
        Commands::JoinWorkspace {
            workspace,
            operator,
        } => {
            let summary = importer
                .add_operator_to_workspace(workspace.as_deref(), operator.as_deref())
                .await?;
            Ok(serde_json::to_string_pretty(&summary)?)
        }
        Commands::RegisterOperator { email, full_name } => {
            let id = importer
                .register_operator(&email, full_name.as_deref())
                .await?;
            Ok(format!("operator ready: {}", id))
        }
        Commands::Jobs { limit } => {
            let jobs = importer.database().job_store().list_jobs(limit).await?;
            Ok(render_jobs(&jobs))
        }
        Commands::Job { id } => {
            let job = importer
                .database()
                .job_store()
                .get_job(&id)
                .await?
                .ok_or_else(|| ImportError::JobNotFound(id.clone()))?;
            serde_json::to_string_pretty(&job).context("failed to render job")
        }
        Commands::ValidateConfig => Ok("configuration is valid".to_string()),
    }
}

pub fn render_jobs(jobs: &[ImportJob]) -> String {
    if jobs.is_empty() {
        return "no import jobs".to_string();
    }
    jobs.iter()
        .map(|job| {
            format!(
                "{}  {:<11}  {:<12}  {}  {}",
                job.id,
                job.status.as_str(),
                job.workspace_name,
                job.created_at.format("%Y-%m-%d %H:%M:%S"),
                job.source_file
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clap::CommandFactory;

    use super::*;
    use crate::config::ImportConfig;
    use crate::db::{DatabaseManager, HookRegistry, JobStatus};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_import_command() {
        let cli = Cli::try_parse_from([
            "slack-import",
            "--config",
            "/etc/slack-import.yaml",
            "import",
            "--file",
            "slack.zip",
            "--workspace",
            "Acme",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/slack-import.yaml"));
        match cli.command {
            Commands::Import {
                file, workspace, ..
            } => {
                assert_eq!(file, "slack.zip");
                assert_eq!(workspace.as_deref(), Some("Acme"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn render_jobs_lists_status() {
        let mut job = ImportJob::new("slack.zip", "Slack");
        job.status = JobStatus::Failed;
        let rendered = render_jobs(&[job]);
        assert!(rendered.contains("Failed"));
        assert!(rendered.contains("slack.zip"));
        assert_eq!(render_jobs(&[]), "no import jobs");
    }

    #[test]
    fn unknown_job_is_an_error() {
        tokio_test::block_on(async {
            let db = DatabaseManager::new_in_memory(Arc::new(HookRegistry::default())).unwrap();
            db.migrate().await.unwrap();
            let importer = Importer::new(db, ImportConfig::default());

            let listed = execute(Commands::Jobs { limit: 5 }, &importer).await.unwrap();
            assert_eq!(listed, "no import jobs");

            let err = execute(
                Commands::Job {
                    id: "missing".to_string(),
                },
                &importer,
            )
            .await
            .unwrap_err();
            assert!(err.to_string().contains("missing"));
        });
    }
}
