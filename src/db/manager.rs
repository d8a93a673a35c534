use std::sync::Arc;

use diesel::RunQueryDsl;
use diesel::connection::{AnsiTransactionManager, TransactionManager};

use crate::config::DatabaseConfig;
use crate::db::hooks::HookRegistry;
use crate::db::sqlite::{
    SqliteChannelStore, SqliteHandle, SqliteIdentityStore, SqliteImportJobStore,
    SqliteMessageStore, SqliteWorkspaceStore,
};
use crate::db::{
    ChannelStore, DatabaseError, IdentityStore, ImportJobStore, MessageStore, WorkspaceStore,
};

#[derive(Clone)]
pub struct DatabaseManager {
    handle: SqliteHandle,
    identity_store: Arc<dyn IdentityStore>,
    workspace_store: Arc<dyn WorkspaceStore>,
    channel_store: Arc<dyn ChannelStore>,
    message_store: Arc<dyn MessageStore>,
    job_store: Arc<dyn ImportJobStore>,
}

impl DatabaseManager {
    pub async fn new(
        config: &DatabaseConfig,
        hooks: Arc<HookRegistry>,
    ) -> Result<Self, DatabaseError> {
        let path = config.sqlite_path();
        if path.is_empty() {
            return Err(DatabaseError::Connection(
                "no sqlite database configured".to_string(),
            ));
        }
        tokio::task::spawn_blocking(move || Self::open(&path, hooks))
            .await
            .map_err(|e| DatabaseError::Connection(format!("connection task failed: {e}")))?
    }

    #[cfg(test)]
    pub fn new_in_memory(hooks: Arc<HookRegistry>) -> Result<Self, DatabaseError> {
        Self::open(":memory:", hooks)
    }

    fn open(path: &str, hooks: Arc<HookRegistry>) -> Result<Self, DatabaseError> {
        let handle = SqliteHandle::open(path, hooks)?;
        Ok(Self {
            identity_store: Arc::new(SqliteIdentityStore::new(handle.clone())),
            workspace_store: Arc::new(SqliteWorkspaceStore::new(handle.clone())),
            channel_store: Arc::new(SqliteChannelStore::new(handle.clone())),
            message_store: Arc::new(SqliteMessageStore::new(handle.clone())),
            job_store: Arc::new(SqliteImportJobStore::new(handle.clone())),
            handle,
        })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        self.handle
            .run(|conn| {
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS roles (
                        name TEXT PRIMARY KEY NOT NULL,
                        desk_access INTEGER NOT NULL DEFAULT 1,
                        created_at TEXT NOT NULL
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS identities (
                        id TEXT PRIMARY KEY NOT NULL,
                        email TEXT NOT NULL UNIQUE,
                        username TEXT NOT NULL,
                        first_name TEXT NOT NULL DEFAULT '',
                        last_name TEXT NOT NULL DEFAULT '',
                        full_name TEXT NOT NULL DEFAULT '',
                        enabled INTEGER NOT NULL DEFAULT 1,
                        user_type TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS identity_roles (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        identity_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
                        role TEXT NOT NULL REFERENCES roles(name),
                        UNIQUE (identity_id, role)
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_identities (
                        id TEXT PRIMARY KEY NOT NULL,
                        identity_id TEXT NOT NULL UNIQUE REFERENCES identities(id) ON DELETE CASCADE,
                        full_name TEXT NOT NULL DEFAULT '',
                        first_name TEXT NOT NULL DEFAULT '',
                        enabled INTEGER NOT NULL DEFAULT 1,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS workspaces (
                        id TEXT PRIMARY KEY NOT NULL,
                        workspace_name TEXT NOT NULL UNIQUE,
                        visibility TEXT NOT NULL,
                        created_at TEXT NOT NULL
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS workspace_members (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                        user_id TEXT NOT NULL REFERENCES chat_identities(id) ON DELETE CASCADE,
                        is_admin INTEGER NOT NULL DEFAULT 0,
                        created_at TEXT NOT NULL,
                        UNIQUE (workspace_id, user_id)
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS channels (
                        id TEXT PRIMARY KEY NOT NULL,
                        channel_name TEXT NOT NULL,
                        workspace_id TEXT NOT NULL,
                        channel_type TEXT NOT NULL,
                        channel_description TEXT NOT NULL DEFAULT '',
                        is_archived INTEGER NOT NULL DEFAULT 0,
                        is_thread INTEGER NOT NULL DEFAULT 0,
                        pinned_messages_string TEXT NOT NULL DEFAULT '',
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL,
                        UNIQUE (workspace_id, channel_name)
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS channel_members (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                        user_id TEXT NOT NULL REFERENCES chat_identities(id) ON DELETE CASCADE,
                        is_admin INTEGER NOT NULL DEFAULT 0,
                        allow_notifications INTEGER NOT NULL DEFAULT 1,
                        last_visit TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        UNIQUE (channel_id, user_id)
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS messages (
                        id TEXT PRIMARY KEY NOT NULL,
                        channel_id TEXT NOT NULL,
                        owner TEXT NOT NULL,
                        message_type TEXT NOT NULL,
                        text TEXT NOT NULL DEFAULT '',
                        json TEXT NOT NULL DEFAULT '',
                        is_reply INTEGER NOT NULL DEFAULT 0,
                        linked_message TEXT,
                        created_at TEXT NOT NULL,
                        modified_at TEXT NOT NULL
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS message_reactions (
                        id TEXT PRIMARY KEY NOT NULL,
                        owner TEXT NOT NULL,
                        reaction TEXT NOT NULL,
                        reaction_escaped TEXT NOT NULL,
                        message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                        channel_id TEXT NOT NULL,
                        is_custom INTEGER NOT NULL DEFAULT 0,
                        created_at TEXT NOT NULL
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS pinned_messages (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                        message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                        owner TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        UNIQUE (channel_id, message_id)
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS import_jobs (
                        id TEXT PRIMARY KEY NOT NULL,
                        source_file TEXT NOT NULL,
                        workspace_name TEXT NOT NULL,
                        status TEXT NOT NULL,
                        summary TEXT NOT NULL DEFAULT '',
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_channels_workspace ON channels(workspace_id)",
                    "CREATE INDEX IF NOT EXISTS idx_channel_members_user ON channel_members(user_id)",
                    "CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel_id)",
                    "CREATE INDEX IF NOT EXISTS idx_messages_linked ON messages(linked_message)",
                    "CREATE INDEX IF NOT EXISTS idx_message_reactions_message ON message_reactions(message_id)",
                    "CREATE INDEX IF NOT EXISTS idx_pinned_messages_channel ON pinned_messages(channel_id)",
                    "CREATE INDEX IF NOT EXISTS idx_import_jobs_created ON import_jobs(created_at)",
                ];

                for statement in statements {
                    diesel::sql_query(statement)
                        .execute(conn)
                        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
                }

                Ok(())
            })
            .await
    }

    pub async fn begin(&self) -> Result<(), DatabaseError> {
        self.handle
            .run(|conn| Ok(AnsiTransactionManager::begin_transaction(conn)?))
            .await
    }

    pub async fn commit(&self) -> Result<(), DatabaseError> {
        self.handle
            .run(|conn| Ok(AnsiTransactionManager::commit_transaction(conn)?))
            .await
    }

    pub async fn rollback(&self) -> Result<(), DatabaseError> {
        self.handle
            .run(|conn| Ok(AnsiTransactionManager::rollback_transaction(conn)?))
            .await
    }

    /// Commits everything written so far and opens a fresh transaction.
    pub async fn checkpoint(&self) -> Result<(), DatabaseError> {
        self.handle
            .run(|conn| {
                AnsiTransactionManager::commit_transaction(conn)?;
                AnsiTransactionManager::begin_transaction(conn)?;
                Ok(())
            })
            .await
    }

    pub fn hooks(&self) -> Arc<HookRegistry> {
        self.handle.hooks()
    }

    pub fn identity_store(&self) -> Arc<dyn IdentityStore> {
        self.identity_store.clone()
    }

    pub fn workspace_store(&self) -> Arc<dyn WorkspaceStore> {
        self.workspace_store.clone()
    }

    pub fn channel_store(&self) -> Arc<dyn ChannelStore> {
        self.channel_store.clone()
    }

    pub fn message_store(&self) -> Arc<dyn MessageStore> {
        self.message_store.clone()
    }

    pub fn job_store(&self) -> Arc<dyn ImportJobStore> {
        self.job_store.clone()
    }

    #[cfg(test)]
    pub(crate) fn handle(&self) -> &SqliteHandle {
        &self.handle
    }
}
