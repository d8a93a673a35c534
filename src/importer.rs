use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ImportConfig;
use crate::db::{DatabaseError, DatabaseManager, ImportJob, WriteContext};
use crate::slack::{ArchiveError, ExportArchive};

pub mod channels;
pub mod identity;
pub mod ids;
pub mod job;
pub mod messages;
pub mod pins;
pub mod source;

pub use self::job::run_import_job;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Slack export file not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Raven Workspace '{0}' not found. No channels use it either - run the import first.")]
    WorkspaceNotFound(String),

    #[error("No Raven User found for {0}. Open Raven once or add the Raven User role.")]
    OperatorNotFound(String),

    #[error("Import job {0} not found")]
    JobNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub status: String,
    pub workspace: String,
    pub users_mapped: usize,
    pub channels_imported: usize,
    pub messages_imported: usize,
    pub messages_skipped: usize,
    pub reactions_imported: usize,
    pub thread_replies_linked: usize,
    pub pinned_messages_set: usize,
    pub archive_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSummary {
    pub message: String,
    pub workspace: String,
    pub channels_total: usize,
    pub channels_joined: usize,
}

/// Runs Slack export imports against the chat store.
#[derive(Clone)]
pub struct Importer {
    db: DatabaseManager,
    config: ImportConfig,
}

impl Importer {
    pub fn new(db: DatabaseManager, config: ImportConfig) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    #[cfg(test)]
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    fn workspace_or_default<'a>(&'a self, workspace_name: Option<&'a str>) -> &'a str {
        workspace_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.config.default_workspace)
    }

    fn operator_or_default<'a>(&'a self, operator: Option<&'a str>) -> &'a str {
        operator
            .map(str::trim)
            .filter(|op| !op.is_empty())
            .unwrap_or(&self.config.operator)
    }

    /// Imports the export referenced by `file_reference` into `workspace_name`.
    ///
    /// Hooks stay suppressed for the whole run and the run holds one
    /// transaction, committed after every stage. Any error rolls back the
    /// stage in progress and is returned unchanged.
    pub async fn import(
        &self,
        file_reference: &str,
        workspace_name: Option<&str>,
        operator: Option<&str>,
    ) -> Result<ImportSummary, ImportError> {
        let path = source::resolve_file_reference(&self.config.files_root, file_reference)?;
        let workspace_name = self.workspace_or_default(workspace_name).to_string();
        let operator = self.operator_or_default(operator).to_string();

        let hooks = self.db.hooks();
        let _suppressed = hooks.suppress();

        let mut archive = ExportArchive::open(&path)?;
        info!(
            path = %path.display(),
            workspace = %workspace_name,
            users = archive.users().len(),
            channels = archive.channels().len(),
            folders = archive.folders().len(),
            "starting slack import"
        );

        self.db.begin().await?;
        match self
            .run_stages(&mut archive, &workspace_name, &operator)
            .await
        {
            Ok(summary) => {
                self.db.commit().await?;
                info!(
                    workspace = %summary.workspace,
                    messages = summary.messages_imported,
                    skipped = summary.messages_skipped,
                    "slack import finished"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback) = self.db.rollback().await {
                    warn!(error = %rollback, "rollback after failed import also failed");
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        archive: &mut ExportArchive,
        workspace_name: &str,
        operator_ref: &str,
    ) -> Result<ImportSummary, ImportError> {
        let operator = identity::resolve_operator(&self.db, operator_ref).await?;
        let ctx = WriteContext::import(operator.as_deref().unwrap_or(operator_ref));

        let identities = identity::resolve_identities(&self.db, &ctx, &self.config, archive.users())
            .await?;
        info!(users = identities.len(), "identities resolved");
        self.db.checkpoint().await?;

        // The operator may only exist after this run's identities were created.
        let operator = match operator {
            Some(op) => Some(op),
            None => identity::resolve_operator(&self.db, operator_ref).await?,
        };

        let workspace = channels::ensure_workspace(&self.db, &ctx, workspace_name).await?;
        channels::ensure_operator_membership(&self.db, &ctx, &workspace.id, operator.as_deref())
            .await?;
        self.db.checkpoint().await?;

        let mut channel_map = channels::materialize_channels(
            &self.db,
            &ctx,
            archive.channels(),
            &identities,
            &workspace.id,
            operator.as_deref(),
        )
        .await?;
        info!(channels = channel_map.len(), "channels materialized");
        self.db.checkpoint().await?;

        let outcome = messages::import_messages(
            &self.db,
            &ctx,
            archive,
            &mut channel_map,
            &identities,
            &workspace.id,
            operator.as_deref(),
        )
        .await?;
        info!(
            imported = outcome.counts.imported,
            skipped = outcome.counts.skipped,
            reactions = outcome.counts.reactions_imported,
            replies_linked = outcome.counts.replies_linked,
            "messages imported"
        );
        self.db.checkpoint().await?;

        let pinned = pins::apply_pins(
            &self.db,
            &ctx,
            archive.channels(),
            &mut channel_map,
            &outcome.index,
            &identities,
            &workspace.id,
            operator.as_deref(),
        )
        .await?;
        info!(pinned, "pins applied");

        Ok(ImportSummary {
            status: "success".to_string(),
            workspace: workspace.id,
            users_mapped: identities.len(),
            channels_imported: channel_map.len(),
            messages_imported: outcome.counts.imported,
            messages_skipped: outcome.counts.skipped,
            reactions_imported: outcome.counts.reactions_imported,
            thread_replies_linked: outcome.counts.replies_linked,
            pinned_messages_set: pinned,
            archive_path: archive.path().display().to_string(),
        })
    }

    /// Joins the operator to the workspace and every channel in it.
    pub async fn add_operator_to_workspace(
        &self,
        workspace_name: Option<&str>,
        operator: Option<&str>,
    ) -> Result<JoinSummary, ImportError> {
        let workspace_name = self.workspace_or_default(workspace_name).to_string();
        let operator = self.operator_or_default(operator).to_string();

        self.db.begin().await?;
        match channels::add_operator_to_workspace(&self.db, &workspace_name, &operator).await {
            Ok(summary) => {
                self.db.commit().await?;
                info!(
                    workspace = %summary.workspace,
                    channels_total = summary.channels_total,
                    channels_joined = summary.channels_joined,
                    "operator joined workspace"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback) = self.db.rollback().await {
                    warn!(error = %rollback, "rollback after failed join also failed");
                }
                Err(e)
            }
        }
    }

    /// Creates or re-enables an operator identity and its chat identity.
    pub async fn register_operator(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<String, ImportError> {
        let ctx = WriteContext::interactive(email);
        identity::register_operator(&self.db, &ctx, &self.config, email, full_name).await
    }

    /// Records a new job for `file_reference` without running it.
    pub async fn create_job(
        &self,
        file_reference: &str,
        workspace_name: Option<&str>,
    ) -> Result<ImportJob, ImportError> {
        let reference = file_reference.trim();
        if reference.is_empty() {
            return Err(ImportError::InvalidArgument(
                "file reference is required".to_string(),
            ));
        }
        let job = ImportJob::new(reference, self.workspace_or_default(workspace_name));
        self.db.job_store().create_job(&job).await?;
        Ok(job)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::testing::Fixture;
    use super::*;
    use crate::db::hooks::testing::RecordingHooks;
    use crate::db::{DocType, HookRegistry, JobStatus};

    fn users() -> String {
        json!([
            { "id": "U1", "name": "ana", "profile": { "email": "ana@example.com", "real_name": "Ana Lima" } },
            { "id": "U2", "name": "bo", "profile": { "real_name": "Bo Berg" } },
        ])
        .to_string()
    }

    fn channels() -> String {
        json!([
            {
                "id": "C1", "name": "General", "creator": "U1", "members": ["U1", "U2"],
                "purpose": { "value": "Company wide" },
                "pins": [{ "id": "100.000100" }, { "id": "999.000000" }],
            },
            { "id": "C2", "name": "ghost-town", "members": ["U404"] },
        ])
        .to_string()
    }

    fn day_one() -> String {
        json!([
            { "type": "message", "user": "U2", "ts": "200.000200", "thread_ts": "100.000100", "text": "reply first" },
            { "type": "message", "user": "U1", "ts": "100.000100", "thread_ts": "100.000100", "text": "root",
              "reactions": [{ "name": "tada", "users": ["U1", "U2", "U404"] }] },
            { "type": "message", "user": "U404", "ts": "150.000000", "text": "stranger" },
            { "type": "message", "subtype": "channel_join", "user": "U2", "ts": "160.000000", "text": "<@U2> has joined" },
            { "type": "file_comment", "user": "U1", "ts": "170.000000" },
        ])
        .to_string()
    }

    fn day_two() -> String {
        json!([
            { "type": "message", "user": "U1", "ts": "300.000300", "thread_ts": "100.000100", "text": "second reply" },
        ])
        .to_string()
    }

    fn write_standard_export(fixture: &Fixture) -> &'static str {
        let users = users();
        let channels = channels();
        let day_one = day_one();
        let day_two = day_two();
        fixture.write_export(&[
            ("users.json", users.as_str()),
            ("channels.json", channels.as_str()),
            ("General/2024-01-02.json", day_two.as_str()),
            ("General/2024-01-01.json", day_one.as_str()),
            ("ghost-town/2024-01-01.json", "[]"),
        ])
    }

    #[tokio::test]
    async fn basic_round_trip() {
        let fixture = Fixture::new().await;
        let users = json!([{ "id": "U1", "profile": { "email": "ana@example.com" } }]).to_string();
        let channels = json!([{ "id": "C1", "name": "general", "members": ["U1"] }]).to_string();
        let day = json!([{ "type": "message", "user": "U1", "ts": "1700000000.000100", "text": "hi" }])
            .to_string();
        let file = fixture.write_export(&[
            ("users.json", users.as_str()),
            ("channels.json", channels.as_str()),
            ("general/2024-01-01.json", day.as_str()),
        ]);

        let summary = fixture.importer.import(file, None, None).await.unwrap();
        assert_eq!(summary.status, "success");
        assert_eq!(summary.workspace, "Slack");
        assert_eq!(summary.users_mapped, 1);
        assert_eq!(summary.channels_imported, 1);
        assert_eq!(summary.messages_imported, 1);

        let db = fixture.db();
        let identity = db.identity_store().get_identity("ana@example.com").await.unwrap().unwrap();
        assert!(identity.enabled);
        assert!(db.identity_store().get_chat_identity(&identity.id).await.unwrap().is_some());
        assert_eq!(
            db.channel_store().list_channel_ids("Slack").await.unwrap(),
            vec!["Slack-general".to_string()]
        );
        let members = db.channel_store().list_channel_members("Slack-general").await.unwrap();
        assert_eq!(members.len(), 1);

        let id = ids::message_id("Slack-general", "1700000000.000100");
        let message = db.message_store().get_message(&id).await.unwrap().unwrap();
        assert!(!message.is_reply);
        assert!(message.linked_message.is_none());
        assert_eq!(message.text, "<p>hi</p>");
        assert_eq!(message.created_at.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn full_pipeline_counts() {
        let fixture = Fixture::new().await;
        let file = write_standard_export(&fixture);

        let summary = fixture.importer.import(file, Some("Acme"), None).await.unwrap();
        assert_eq!(summary.workspace, "Acme");
        assert_eq!(summary.users_mapped, 2);
        assert_eq!(summary.channels_imported, 1);
        assert_eq!(summary.messages_imported, 4);
        assert_eq!(summary.messages_skipped, 1);
        assert_eq!(summary.reactions_imported, 2);
        assert_eq!(summary.thread_replies_linked, 2);
        assert_eq!(summary.pinned_messages_set, 1);

        let db = fixture.db();
        let channel = db.channel_store().get_channel("Acme-general").await.unwrap().unwrap();
        assert_eq!(channel.channel_description, "Company wide");
        let root = ids::message_id("Acme-general", "100.000100");
        assert_eq!(channel.pinned_messages_string, root);
        assert!(db.channel_store().find_channel("Acme", "ghost-town").await.unwrap().is_none());

        let join = ids::message_id("Acme-general", "160.000000");
        let join = db.message_store().get_message(&join).await.unwrap().unwrap();
        assert_eq!(join.message_type, crate::db::MessageKind::System);

        let members = db.channel_store().list_channel_members("Acme-general").await.unwrap();
        let admins: Vec<_> = members.iter().filter(|m| m.is_admin).map(|m| m.user_id.as_str()).collect();
        assert_eq!(admins, vec!["ana@example.com"]);
    }

    #[tokio::test]
    async fn synthetic_identity_is_disabled() {
        let fixture = Fixture::new().await;
        let file = write_standard_export(&fixture);
        fixture.importer.import(file, None, None).await.unwrap();

        let identity = fixture
            .db()
            .identity_store()
            .get_identity_by_email("slack-U2@slack.local")
            .await
            .unwrap()
            .unwrap();
        assert!(!identity.enabled);
        assert_eq!(identity.full_name, "Bo Berg");
        assert_eq!(identity.username, "bo");
    }

    #[tokio::test]
    async fn reply_before_root_is_linked_in_second_pass() {
        let fixture = Fixture::new().await;
        let file = write_standard_export(&fixture);
        fixture.importer.import(file, None, None).await.unwrap();

        let store = fixture.db().message_store();
        let root = ids::message_id("Slack-general", "100.000100");
        for ts in ["200.000200", "300.000300"] {
            let reply = store
                .get_message(&ids::message_id("Slack-general", ts))
                .await
                .unwrap()
                .unwrap();
            assert!(reply.is_reply);
            assert_eq!(reply.linked_message.as_deref(), Some(root.as_str()));
        }
        let root = store.get_message(&root).await.unwrap().unwrap();
        assert!(!root.is_reply);
        assert!(root.linked_message.is_none());
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let fixture = Fixture::new().await;
        let file = write_standard_export(&fixture);
        let first = fixture.importer.import(file, None, None).await.unwrap();
        let second = fixture.importer.import(file, None, None).await.unwrap();

        assert_eq!(second.messages_imported, 0);
        assert_eq!(second.messages_skipped, first.messages_imported + first.messages_skipped);
        assert_eq!(second.reactions_imported, 0);
        assert_eq!(second.pinned_messages_set, 0);
        assert_eq!(second.channels_imported, first.channels_imported);

        let db = fixture.db();
        assert_eq!(db.message_store().count_messages("Slack-general").await.unwrap(), 4);
        assert_eq!(
            db.channel_store().list_channel_members("Slack-general").await.unwrap().len(),
            2
        );
        assert_eq!(
            db.channel_store().pinned_message_ids("Slack-general").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn rerun_after_deletion_recreates_and_relinks() {
        let fixture = Fixture::new().await;
        let file = write_standard_export(&fixture);
        fixture.importer.import(file, None, None).await.unwrap();

        let root = ids::message_id("Slack-general", "100.000100");
        let reply = ids::message_id("Slack-general", "200.000200");
        let (root_id, reply_id) = (root.clone(), reply.clone());
        fixture
            .db()
            .handle()
            .run(move |conn| {
                use diesel::prelude::*;

                use crate::db::schema::messages;
                diesel::delete(messages::table.filter(messages::id.eq(root_id))).execute(conn)?;
                diesel::update(messages::table.filter(messages::id.eq(reply_id)))
                    .set((messages::linked_message.eq(None::<String>), messages::is_reply.eq(false)))
                    .execute(conn)?;
                Ok(())
            })
            .await
            .unwrap();

        let summary = fixture.importer.import(file, None, None).await.unwrap();
        assert_eq!(summary.messages_imported, 1);
        assert_eq!(summary.pinned_messages_set, 1);

        let store = fixture.db().message_store();
        assert!(store.message_exists(&root).await.unwrap());
        let reply = store.get_message(&reply).await.unwrap().unwrap();
        assert_eq!(reply.linked_message.as_deref(), Some(root.as_str()));
        assert_eq!(store.list_reactions(&root).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_day_file_is_skipped() {
        let fixture = Fixture::new().await;
        let users = users();
        let channels = channels();
        let day_two = day_two();
        let file = fixture.write_export(&[
            ("users.json", users.as_str()),
            ("channels.json", channels.as_str()),
            ("General/2024-01-01.json", "[{oops"),
            ("General/2024-01-02.json", day_two.as_str()),
            ("General/2024-01-03.json", ""),
        ]);

        let summary = fixture.importer.import(file, None, None).await.unwrap();
        assert_eq!(summary.messages_skipped, 1);
        assert_eq!(summary.messages_imported, 1);
        // The root never arrived, so the reply stays unlinked.
        assert_eq!(summary.thread_replies_linked, 0);
        let reply = fixture
            .db()
            .message_store()
            .get_message(&ids::message_id("Slack-general", "300.000300"))
            .await
            .unwrap()
            .unwrap();
        assert!(reply.linked_message.is_none());
        assert!(!reply.is_reply);
    }

    #[tokio::test]
    async fn missing_archive_is_reported() {
        let fixture = Fixture::new().await;
        let err = fixture.importer.import("absent.zip", None, None).await.unwrap_err();
        assert!(matches!(err, ImportError::ArchiveNotFound(_)));

        let err = fixture.importer.import("  ", None, None).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn hooks_are_restored_after_failure() {
        let recorder = Arc::new(RecordingHooks::default());
        let hooks = Arc::new(HookRegistry::new(recorder.clone()));
        let fixture = Fixture::with_hooks(hooks.clone()).await;
        let users = users();
        let file = fixture.write_export(&[("users.json", users.as_str())]);

        let err = fixture.importer.import(file, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::Archive(ArchiveError::MissingManifest(_))
        ));
        assert!(!hooks.is_suppressed());

        let ctx = WriteContext::interactive("Administrator");
        hooks.dispatch(&ctx, DocType::Message, "after-failure");
        assert_eq!(recorder.count(DocType::Message), 1);
    }

    #[tokio::test]
    async fn import_does_not_fire_hooks() {
        let recorder = Arc::new(RecordingHooks::default());
        let fixture = Fixture::with_hooks(Arc::new(HookRegistry::new(recorder.clone()))).await;
        let file = write_standard_export(&fixture);

        fixture.importer.import(file, None, None).await.unwrap();
        assert_eq!(recorder.total(), 0);
    }

    #[tokio::test]
    async fn operator_joins_imported_channels() {
        let fixture = Fixture::new().await;
        fixture
            .importer
            .register_operator("admin@example.com", Some("Site Admin"))
            .await
            .unwrap();
        let file = write_standard_export(&fixture);

        fixture
            .importer
            .import(file, None, Some("admin@example.com"))
            .await
            .unwrap();

        let db = fixture.db();
        let member = db
            .workspace_store()
            .get_workspace_member("Slack", "admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(member.is_admin);
        let members = db.channel_store().list_channel_members("Slack-general").await.unwrap();
        assert!(members.iter().any(|m| m.user_id == "admin@example.com"));
    }

    #[tokio::test]
    async fn join_workspace_reports_counts() {
        let fixture = Fixture::new().await;
        let file = write_standard_export(&fixture);
        fixture.importer.import(file, None, None).await.unwrap();
        fixture
            .importer
            .register_operator("admin@example.com", None)
            .await
            .unwrap();

        let summary = fixture
            .importer
            .add_operator_to_workspace(None, Some("admin@example.com"))
            .await
            .unwrap();
        assert_eq!(summary.workspace, "Slack");
        assert_eq!(summary.channels_total, 1);
        assert_eq!(summary.channels_joined, 1);
        assert_eq!(
            summary.message,
            "Added you to workspace and 1 channel(s). Refresh Raven to see them."
        );

        let again = fixture
            .importer
            .add_operator_to_workspace(Some("Slack"), Some("admin@example.com"))
            .await
            .unwrap();
        assert_eq!(again.channels_joined, 0);
    }

    #[tokio::test]
    async fn join_workspace_errors() {
        let fixture = Fixture::new().await;
        let err = fixture
            .importer
            .add_operator_to_workspace(Some("Nowhere"), Some("admin@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::WorkspaceNotFound(name) if name == "Nowhere"));

        let file = write_standard_export(&fixture);
        fixture.importer.import(file, None, None).await.unwrap();
        let err = fixture
            .importer
            .add_operator_to_workspace(None, Some("nobody@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::OperatorNotFound(_)));
    }

    #[tokio::test]
    async fn job_records_completion() {
        let fixture = Fixture::new().await;
        let file = write_standard_export(&fixture);
        let job = fixture.importer.create_job(file, None).await.unwrap();

        let summary = run_import_job(&fixture.importer, &job.id, None).await.unwrap();
        let stored = fixture.db().job_store().get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        let recorded: ImportSummary = serde_json::from_str(&stored.summary).unwrap();
        assert_eq!(recorded, summary);
    }

    #[tokio::test]
    async fn job_records_failure() {
        let fixture = Fixture::new().await;
        let job = fixture.importer.create_job("missing.zip", None).await.unwrap();

        let err = run_import_job(&fixture.importer, &job.id, None).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
        let stored = fixture.db().job_store().get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.summary.contains("Slack export file not found"));
    }
}
