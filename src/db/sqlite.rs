use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use parking_lot::Mutex;

use super::DatabaseError;
use super::hooks::{DocType, HookRegistry, WriteContext};
use super::models::{
    Channel, ChatIdentity, Identity, ImportJob, JobStatus, Message, Reaction, Workspace,
};
#[cfg(test)]
use super::models::{ChannelMember, WorkspaceMember};
use crate::db::schema::{
    channel_members, channels, chat_identities, identities, identity_roles, import_jobs,
    message_reactions, messages, pinned_messages, roles, workspace_members, workspaces,
};

pub type SharedConnection = Arc<Mutex<SqliteConnection>>;

// Fixed-width UTC timestamps so text ordering matches time ordering.
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

/// One connection shared by every store, so a run can hold a single transaction.
#[derive(Clone)]
pub struct SqliteHandle {
    conn: SharedConnection,
    hooks: Arc<HookRegistry>,
}

impl SqliteHandle {
    pub fn open(path: &str, hooks: Arc<HookRegistry>) -> Result<Self, DatabaseError> {
        let mut conn = SqliteConnection::establish(path)
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hooks,
        })
    }

    pub fn hooks(&self) -> Arc<HookRegistry> {
        self.hooks.clone()
    }

    pub async fn run<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    fn notify(&self, ctx: &WriteContext, doctype: DocType, name: &str) {
        self.hooks.dispatch(ctx, doctype, name);
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = identities)]
struct DbIdentity {
    id: String,
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    full_name: String,
    enabled: bool,
    user_type: String,
    created_at: String,
    updated_at: String,
}

impl DbIdentity {
    fn from_model(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            full_name: identity.full_name.clone(),
            enabled: identity.enabled,
            user_type: identity.user_type.clone(),
            created_at: datetime_to_string(&identity.created_at),
            updated_at: datetime_to_string(&identity.updated_at),
        }
    }

    fn to_identity(&self) -> Result<Identity, DatabaseError> {
        Ok(Identity {
            id: self.id.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: self.full_name.clone(),
            enabled: self.enabled,
            user_type: self.user_type.clone(),
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = chat_identities)]
struct DbChatIdentity {
    id: String,
    identity_id: String,
    full_name: String,
    first_name: String,
    enabled: bool,
    created_at: String,
    updated_at: String,
}

impl DbChatIdentity {
    fn from_model(chat: &ChatIdentity) -> Self {
        Self {
            id: chat.id.clone(),
            identity_id: chat.identity_id.clone(),
            full_name: chat.full_name.clone(),
            first_name: chat.first_name.clone(),
            enabled: chat.enabled,
            created_at: datetime_to_string(&chat.created_at),
            updated_at: datetime_to_string(&chat.updated_at),
        }
    }

    fn to_chat_identity(&self) -> Result<ChatIdentity, DatabaseError> {
        Ok(ChatIdentity {
            id: self.id.clone(),
            identity_id: self.identity_id.clone(),
            full_name: self.full_name.clone(),
            first_name: self.first_name.clone(),
            enabled: self.enabled,
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = identity_roles)]
struct NewIdentityRole<'a> {
    identity_id: &'a str,
    role: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = roles)]
struct NewRole<'a> {
    name: &'a str,
    desk_access: bool,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = workspaces)]
struct DbWorkspace {
    id: String,
    workspace_name: String,
    visibility: String,
    created_at: String,
}

impl DbWorkspace {
    fn to_workspace(&self) -> Result<Workspace, DatabaseError> {
        Ok(Workspace {
            id: self.id.clone(),
            workspace_name: self.workspace_name.clone(),
            visibility: self.visibility.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = workspace_members)]
struct DbWorkspaceMember {
    id: i32,
    workspace_id: String,
    user_id: String,
    is_admin: bool,
    created_at: String,
}

#[cfg(test)]
impl DbWorkspaceMember {
    fn to_workspace_member(&self) -> Result<WorkspaceMember, DatabaseError> {
        Ok(WorkspaceMember {
            id: self.id as i64,
            workspace_id: self.workspace_id.clone(),
            user_id: self.user_id.clone(),
            is_admin: self.is_admin,
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = workspace_members)]
struct NewWorkspaceMember<'a> {
    workspace_id: &'a str,
    user_id: &'a str,
    is_admin: bool,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = channels)]
struct DbChannel {
    id: String,
    channel_name: String,
    workspace_id: String,
    channel_type: String,
    channel_description: String,
    is_archived: bool,
    is_thread: bool,
    pinned_messages_string: String,
    created_at: String,
    updated_at: String,
}

impl DbChannel {
    fn from_model(channel: &Channel) -> Self {
        Self {
            id: channel.id.clone(),
            channel_name: channel.channel_name.clone(),
            workspace_id: channel.workspace_id.clone(),
            channel_type: channel.channel_type.clone(),
            channel_description: channel.channel_description.clone(),
            is_archived: channel.is_archived,
            is_thread: channel.is_thread,
            pinned_messages_string: channel.pinned_messages_string.clone(),
            created_at: datetime_to_string(&channel.created_at),
            updated_at: datetime_to_string(&channel.updated_at),
        }
    }

    fn to_channel(&self) -> Result<Channel, DatabaseError> {
        Ok(Channel {
            id: self.id.clone(),
            channel_name: self.channel_name.clone(),
            workspace_id: self.workspace_id.clone(),
            channel_type: self.channel_type.clone(),
            channel_description: self.channel_description.clone(),
            is_archived: self.is_archived,
            is_thread: self.is_thread,
            pinned_messages_string: self.pinned_messages_string.clone(),
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channel_members)]
struct DbChannelMember {
    id: i32,
    channel_id: String,
    user_id: String,
    is_admin: bool,
    allow_notifications: bool,
    last_visit: String,
    created_at: String,
}

#[cfg(test)]
impl DbChannelMember {
    fn to_channel_member(&self) -> Result<ChannelMember, DatabaseError> {
        Ok(ChannelMember {
            id: self.id as i64,
            channel_id: self.channel_id.clone(),
            user_id: self.user_id.clone(),
            is_admin: self.is_admin,
            allow_notifications: self.allow_notifications,
            last_visit: string_to_datetime(&self.last_visit)?,
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = channel_members)]
struct NewChannelMember<'a> {
    channel_id: &'a str,
    user_id: &'a str,
    is_admin: bool,
    allow_notifications: bool,
    last_visit: String,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = messages)]
struct DbMessage {
    id: String,
    channel_id: String,
    owner: String,
    message_type: String,
    text: String,
    json: String,
    is_reply: bool,
    linked_message: Option<String>,
    created_at: String,
    modified_at: String,
}

impl DbMessage {
    fn from_model(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            channel_id: message.channel_id.clone(),
            owner: message.owner.clone(),
            message_type: message.message_type.as_str().to_string(),
            text: message.text.clone(),
            json: message.json.clone(),
            is_reply: message.is_reply,
            linked_message: message.linked_message.clone(),
            created_at: datetime_to_string(&message.created_at),
            modified_at: datetime_to_string(&message.modified_at),
        }
    }

    #[cfg(test)]
    fn to_message(&self) -> Result<Message, DatabaseError> {
        Ok(Message {
            id: self.id.clone(),
            channel_id: self.channel_id.clone(),
            owner: self.owner.clone(),
            message_type: self.message_type.parse().map_err(DatabaseError::Query)?,
            text: self.text.clone(),
            json: self.json.clone(),
            is_reply: self.is_reply,
            linked_message: self.linked_message.clone(),
            created_at: string_to_datetime(&self.created_at)?,
            modified_at: string_to_datetime(&self.modified_at)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = message_reactions)]
struct DbReaction {
    id: String,
    owner: String,
    reaction: String,
    reaction_escaped: String,
    message_id: String,
    channel_id: String,
    is_custom: bool,
    created_at: String,
}

impl DbReaction {
    fn from_model(reaction: &Reaction) -> Self {
        Self {
            id: reaction.id.clone(),
            owner: reaction.owner.clone(),
            reaction: reaction.reaction.clone(),
            reaction_escaped: reaction.reaction_escaped.clone(),
            message_id: reaction.message_id.clone(),
            channel_id: reaction.channel_id.clone(),
            is_custom: reaction.is_custom,
            created_at: datetime_to_string(&reaction.created_at),
        }
    }

    #[cfg(test)]
    fn to_reaction(&self) -> Result<Reaction, DatabaseError> {
        Ok(Reaction {
            id: self.id.clone(),
            owner: self.owner.clone(),
            reaction: self.reaction.clone(),
            reaction_escaped: self.reaction_escaped.clone(),
            message_id: self.message_id.clone(),
            channel_id: self.channel_id.clone(),
            is_custom: self.is_custom,
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = pinned_messages)]
struct NewPinnedMessage<'a> {
    channel_id: &'a str,
    message_id: &'a str,
    owner: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = import_jobs)]
struct DbImportJob {
    id: String,
    source_file: String,
    workspace_name: String,
    status: String,
    summary: String,
    created_at: String,
    updated_at: String,
}

impl DbImportJob {
    fn to_import_job(&self) -> Result<ImportJob, DatabaseError> {
        Ok(ImportJob {
            id: self.id.clone(),
            source_file: self.source_file.clone(),
            workspace_name: self.workspace_name.clone(),
            status: self.status.parse().map_err(DatabaseError::Query)?,
            summary: self.summary.clone(),
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

pub struct SqliteIdentityStore {
    handle: SqliteHandle,
}

impl SqliteIdentityStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::IdentityStore for SqliteIdentityStore {
    async fn ensure_role(&self, ctx: &WriteContext, role: &str) -> Result<bool, DatabaseError> {
        let role_name = role.to_string();
        let created = self
            .handle
            .run(move |conn| {
                let row = NewRole {
                    name: &role_name,
                    desk_access: true,
                    created_at: datetime_to_string(&Utc::now()),
                };
                let inserted = diesel::insert_or_ignore_into(roles::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await?;
        if created {
            self.handle.notify(ctx, DocType::Role, role);
        }
        Ok(created)
    }

    #[cfg(test)]
    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, DatabaseError> {
        let id = id.to_string();
        self.handle
            .run(move |conn| {
                identities::table
                    .filter(identities::id.eq(id))
                    .select(DbIdentity::as_select())
                    .first::<DbIdentity>(conn)
                    .optional()?
                    .map(|row| row.to_identity())
                    .transpose()
            })
            .await
    }

    async fn get_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, DatabaseError> {
        let email = email.to_string();
        self.handle
            .run(move |conn| {
                identities::table
                    .filter(identities::email.eq(email))
                    .select(DbIdentity::as_select())
                    .first::<DbIdentity>(conn)
                    .optional()?
                    .map(|row| row.to_identity())
                    .transpose()
            })
            .await
    }

    async fn create_identity(
        &self,
        ctx: &WriteContext,
        identity: &Identity,
        chat_identity: &ChatIdentity,
        role_names: &[String],
    ) -> Result<(), DatabaseError> {
        if role_names.is_empty() {
            return Err(DatabaseError::Constraint(format!(
                "identity {} must have at least one role",
                identity.id
            )));
        }
        let row = DbIdentity::from_model(identity);
        let chat_row = DbChatIdentity::from_model(chat_identity);
        let role_names = role_names.to_vec();
        // Inside an open run transaction this becomes a savepoint.
        self.handle
            .run(move |conn| {
                conn.transaction::<_, DatabaseError, _>(|conn| {
                    diesel::insert_into(identities::table)
                        .values(&row)
                        .execute(conn)?;
                    for role in &role_names {
                        diesel::insert_into(identity_roles::table)
                            .values(NewIdentityRole {
                                identity_id: &row.id,
                                role,
                            })
                            .execute(conn)?;
                    }
                    diesel::insert_into(chat_identities::table)
                        .values(&chat_row)
                        .execute(conn)?;
                    Ok(())
                })
            })
            .await?;
        self.handle.notify(ctx, DocType::Identity, &identity.id);
        self.handle
            .notify(ctx, DocType::ChatIdentity, &chat_identity.id);
        Ok(())
    }

    async fn update_identity(
        &self,
        _ctx: &WriteContext,
        identity: &Identity,
    ) -> Result<(), DatabaseError> {
        let row = DbIdentity::from_model(identity);
        self.handle
            .run(move |conn| {
                let updated = diesel::update(identities::table.filter(identities::id.eq(&row.id)))
                    .set((
                        identities::username.eq(&row.username),
                        identities::first_name.eq(&row.first_name),
                        identities::last_name.eq(&row.last_name),
                        identities::full_name.eq(&row.full_name),
                        identities::enabled.eq(row.enabled),
                        identities::updated_at.eq(&row.updated_at),
                    ))
                    .execute(conn)?;
                if updated == 0 {
                    return Err(DatabaseError::NotFound(format!("identity {}", row.id)));
                }
                Ok(())
            })
            .await
    }

    async fn get_roles(&self, identity_id: &str) -> Result<Vec<String>, DatabaseError> {
        let identity_id = identity_id.to_string();
        self.handle
            .run(move |conn| {
                Ok(identity_roles::table
                    .filter(identity_roles::identity_id.eq(identity_id))
                    .order(identity_roles::id.asc())
                    .select(identity_roles::role)
                    .load::<String>(conn)?)
            })
            .await
    }

    async fn add_role(
        &self,
        _ctx: &WriteContext,
        identity_id: &str,
        role: &str,
    ) -> Result<bool, DatabaseError> {
        let identity_id = identity_id.to_string();
        let role = role.to_string();
        self.handle
            .run(move |conn| {
                let inserted = diesel::insert_or_ignore_into(identity_roles::table)
                    .values(NewIdentityRole {
                        identity_id: &identity_id,
                        role: &role,
                    })
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await
    }

    #[cfg(test)]
    async fn get_chat_identity(&self, id: &str) -> Result<Option<ChatIdentity>, DatabaseError> {
        let id = id.to_string();
        self.handle
            .run(move |conn| {
                chat_identities::table
                    .filter(chat_identities::id.eq(id))
                    .select(DbChatIdentity::as_select())
                    .first::<DbChatIdentity>(conn)
                    .optional()?
                    .map(|row| row.to_chat_identity())
                    .transpose()
            })
            .await
    }

    async fn get_chat_identity_by_identity(
        &self,
        identity_id: &str,
    ) -> Result<Option<ChatIdentity>, DatabaseError> {
        let identity_id = identity_id.to_string();
        self.handle
            .run(move |conn| {
                chat_identities::table
                    .filter(chat_identities::identity_id.eq(identity_id))
                    .select(DbChatIdentity::as_select())
                    .first::<DbChatIdentity>(conn)
                    .optional()?
                    .map(|row| row.to_chat_identity())
                    .transpose()
            })
            .await
    }

    async fn create_chat_identity(
        &self,
        ctx: &WriteContext,
        chat_identity: &ChatIdentity,
    ) -> Result<(), DatabaseError> {
        let row = DbChatIdentity::from_model(chat_identity);
        self.handle
            .run(move |conn| {
                diesel::insert_into(chat_identities::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await?;
        self.handle
            .notify(ctx, DocType::ChatIdentity, &chat_identity.id);
        Ok(())
    }

    async fn update_chat_identity(
        &self,
        _ctx: &WriteContext,
        chat_identity: &ChatIdentity,
    ) -> Result<(), DatabaseError> {
        let row = DbChatIdentity::from_model(chat_identity);
        self.handle
            .run(move |conn| {
                let updated = diesel::update(
                    chat_identities::table.filter(chat_identities::id.eq(&row.id)),
                )
                .set((
                    chat_identities::full_name.eq(&row.full_name),
                    chat_identities::first_name.eq(&row.first_name),
                    chat_identities::enabled.eq(row.enabled),
                    chat_identities::updated_at.eq(&row.updated_at),
                ))
                .execute(conn)?;
                if updated == 0 {
                    return Err(DatabaseError::NotFound(format!("chat identity {}", row.id)));
                }
                Ok(())
            })
            .await
    }
}

pub struct SqliteWorkspaceStore {
    handle: SqliteHandle,
}

impl SqliteWorkspaceStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::WorkspaceStore for SqliteWorkspaceStore {
    async fn get_workspace(&self, id: &str) -> Result<Option<Workspace>, DatabaseError> {
        let id = id.to_string();
        self.handle
            .run(move |conn| {
                workspaces::table
                    .filter(workspaces::id.eq(id))
                    .select(DbWorkspace::as_select())
                    .first::<DbWorkspace>(conn)
                    .optional()?
                    .map(|row| row.to_workspace())
                    .transpose()
            })
            .await
    }

    async fn get_workspace_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Workspace>, DatabaseError> {
        let name = name.to_string();
        self.handle
            .run(move |conn| {
                workspaces::table
                    .filter(workspaces::workspace_name.eq(name))
                    .select(DbWorkspace::as_select())
                    .first::<DbWorkspace>(conn)
                    .optional()?
                    .map(|row| row.to_workspace())
                    .transpose()
            })
            .await
    }

    async fn create_workspace(
        &self,
        ctx: &WriteContext,
        workspace: &Workspace,
    ) -> Result<(), DatabaseError> {
        let row = DbWorkspace {
            id: workspace.id.clone(),
            workspace_name: workspace.workspace_name.clone(),
            visibility: workspace.visibility.clone(),
            created_at: datetime_to_string(&workspace.created_at),
        };
        self.handle
            .run(move |conn| {
                diesel::insert_into(workspaces::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await?;
        self.handle.notify(ctx, DocType::Workspace, &workspace.id);
        Ok(())
    }

    #[cfg(test)]
    async fn get_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<WorkspaceMember>, DatabaseError> {
        let workspace_id = workspace_id.to_string();
        let user_id = user_id.to_string();
        self.handle
            .run(move |conn| {
                workspace_members::table
                    .filter(workspace_members::workspace_id.eq(workspace_id))
                    .filter(workspace_members::user_id.eq(user_id))
                    .select(DbWorkspaceMember::as_select())
                    .first::<DbWorkspaceMember>(conn)
                    .optional()?
                    .map(|row| row.to_workspace_member())
                    .transpose()
            })
            .await
    }

    async fn add_workspace_member(
        &self,
        ctx: &WriteContext,
        workspace_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> Result<bool, DatabaseError> {
        let workspace = workspace_id.to_string();
        let user = user_id.to_string();
        let created = self
            .handle
            .run(move |conn| {
                let inserted = diesel::insert_or_ignore_into(workspace_members::table)
                    .values(NewWorkspaceMember {
                        workspace_id: &workspace,
                        user_id: &user,
                        is_admin,
                        created_at: datetime_to_string(&Utc::now()),
                    })
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await?;
        if created {
            self.handle.notify(
                ctx,
                DocType::WorkspaceMember,
                &format!("{}:{}", workspace_id, user_id),
            );
        }
        Ok(created)
    }
}

pub struct SqliteChannelStore {
    handle: SqliteHandle,
}

impl SqliteChannelStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::ChannelStore for SqliteChannelStore {
    async fn get_channel(&self, id: &str) -> Result<Option<Channel>, DatabaseError> {
        let id = id.to_string();
        self.handle
            .run(move |conn| {
                channels::table
                    .filter(channels::id.eq(id))
                    .select(DbChannel::as_select())
                    .first::<DbChannel>(conn)
                    .optional()?
                    .map(|row| row.to_channel())
                    .transpose()
            })
            .await
    }

    async fn find_channel(
        &self,
        workspace_id: &str,
        channel_name: &str,
    ) -> Result<Option<Channel>, DatabaseError> {
        let workspace_id = workspace_id.to_string();
        let channel_name = channel_name.to_string();
        self.handle
            .run(move |conn| {
                channels::table
                    .filter(channels::workspace_id.eq(workspace_id))
                    .filter(channels::channel_name.eq(channel_name))
                    .select(DbChannel::as_select())
                    .first::<DbChannel>(conn)
                    .optional()?
                    .map(|row| row.to_channel())
                    .transpose()
            })
            .await
    }

    async fn create_channel(
        &self,
        ctx: &WriteContext,
        channel: &Channel,
    ) -> Result<(), DatabaseError> {
        let row = DbChannel::from_model(channel);
        self.handle
            .run(move |conn| {
                diesel::insert_into(channels::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await?;
        self.handle.notify(ctx, DocType::Channel, &channel.id);
        Ok(())
    }

    async fn list_channel_ids(&self, workspace_id: &str) -> Result<Vec<String>, DatabaseError> {
        let workspace_id = workspace_id.to_string();
        self.handle
            .run(move |conn| {
                Ok(channels::table
                    .filter(channels::workspace_id.eq(workspace_id))
                    .filter(channels::is_thread.eq(false))
                    .order((channels::created_at.asc(), channels::id.asc()))
                    .select(channels::id)
                    .load::<String>(conn)?)
            })
            .await
    }

    async fn add_channel_member(
        &self,
        ctx: &WriteContext,
        channel_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> Result<bool, DatabaseError> {
        let channel = channel_id.to_string();
        let user = user_id.to_string();
        let created = self
            .handle
            .run(move |conn| {
                let now = datetime_to_string(&Utc::now());
                let inserted = diesel::insert_or_ignore_into(channel_members::table)
                    .values(NewChannelMember {
                        channel_id: &channel,
                        user_id: &user,
                        is_admin,
                        allow_notifications: true,
                        last_visit: now.clone(),
                        created_at: now,
                    })
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await?;
        if created {
            self.handle.notify(
                ctx,
                DocType::ChannelMember,
                &format!("{}:{}", channel_id, user_id),
            );
        }
        Ok(created)
    }

    #[cfg(test)]
    async fn list_channel_members(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelMember>, DatabaseError> {
        let channel_id = channel_id.to_string();
        self.handle
            .run(move |conn| {
                let rows = channel_members::table
                    .filter(channel_members::channel_id.eq(channel_id))
                    .order(channel_members::id.asc())
                    .select(DbChannelMember::as_select())
                    .load::<DbChannelMember>(conn)?;
                rows.iter().map(|row| row.to_channel_member()).collect()
            })
            .await
    }

    async fn pinned_message_ids(&self, channel_id: &str) -> Result<Vec<String>, DatabaseError> {
        let channel_id = channel_id.to_string();
        self.handle
            .run(move |conn| {
                Ok(pinned_messages::table
                    .filter(pinned_messages::channel_id.eq(channel_id))
                    .order((pinned_messages::created_at.asc(), pinned_messages::id.asc()))
                    .select(pinned_messages::message_id)
                    .load::<String>(conn)?)
            })
            .await
    }

    async fn add_pin(
        &self,
        ctx: &WriteContext,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, DatabaseError> {
        let channel = channel_id.to_string();
        let message = message_id.to_string();
        let owner = ctx.actor.clone();
        let created = self
            .handle
            .run(move |conn| {
                let inserted = diesel::insert_or_ignore_into(pinned_messages::table)
                    .values(NewPinnedMessage {
                        channel_id: &channel,
                        message_id: &message,
                        owner: &owner,
                        created_at: datetime_to_string(&Utc::now()),
                    })
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await?;
        if created {
            self.handle.notify(ctx, DocType::PinnedMessage, message_id);
        }
        Ok(created)
    }

    async fn set_pinned_messages_string(
        &self,
        _ctx: &WriteContext,
        channel_id: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let channel_id = channel_id.to_string();
        let value = value.to_string();
        self.handle
            .run(move |conn| {
                diesel::update(channels::table.filter(channels::id.eq(channel_id)))
                    .set((
                        channels::pinned_messages_string.eq(value),
                        channels::updated_at.eq(datetime_to_string(&Utc::now())),
                    ))
                    .execute(conn)?;
                Ok(())
            })
            .await
    }
}

pub struct SqliteMessageStore {
    handle: SqliteHandle,
}

impl SqliteMessageStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::MessageStore for SqliteMessageStore {
    #[cfg(test)]
    async fn get_message(&self, id: &str) -> Result<Option<Message>, DatabaseError> {
        let id = id.to_string();
        self.handle
            .run(move |conn| {
                messages::table
                    .filter(messages::id.eq(id))
                    .select(DbMessage::as_select())
                    .first::<DbMessage>(conn)
                    .optional()?
                    .map(|row| row.to_message())
                    .transpose()
            })
            .await
    }

    async fn message_exists(&self, id: &str) -> Result<bool, DatabaseError> {
        let id = id.to_string();
        self.handle
            .run(move |conn| {
                Ok(diesel::select(diesel::dsl::exists(
                    messages::table.filter(messages::id.eq(id)),
                ))
                .get_result::<bool>(conn)?)
            })
            .await
    }

    async fn insert_message(
        &self,
        ctx: &WriteContext,
        message: &Message,
    ) -> Result<bool, DatabaseError> {
        let row = DbMessage::from_model(message);
        let created = self
            .handle
            .run(move |conn| {
                let inserted = diesel::insert_or_ignore_into(messages::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await?;
        if created {
            self.handle.notify(ctx, DocType::Message, &message.id);
        }
        Ok(created)
    }

    async fn link_reply(
        &self,
        _ctx: &WriteContext,
        message_id: &str,
        root_id: &str,
    ) -> Result<bool, DatabaseError> {
        let message_id = message_id.to_string();
        let root_id = root_id.to_string();
        self.handle
            .run(move |conn| {
                let updated = diesel::sql_query(
                    "UPDATE messages SET linked_message = ?, is_reply = 1, modified_at = ? \
                     WHERE id = ? AND (linked_message IS NULL OR linked_message = '')",
                )
                .bind::<Text, _>(root_id)
                .bind::<Text, _>(datetime_to_string(&Utc::now()))
                .bind::<Text, _>(message_id)
                .execute(conn)?;
                Ok(updated > 0)
            })
            .await
    }

    async fn insert_reaction(
        &self,
        ctx: &WriteContext,
        reaction: &Reaction,
    ) -> Result<bool, DatabaseError> {
        let row = DbReaction::from_model(reaction);
        let created = self
            .handle
            .run(move |conn| {
                let inserted = diesel::insert_or_ignore_into(message_reactions::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await?;
        if created {
            self.handle.notify(ctx, DocType::Reaction, &reaction.id);
        }
        Ok(created)
    }

    #[cfg(test)]
    async fn count_messages(&self, channel_id: &str) -> Result<i64, DatabaseError> {
        let channel_id = channel_id.to_string();
        self.handle
            .run(move |conn| {
                Ok(messages::table
                    .filter(messages::channel_id.eq(channel_id))
                    .count()
                    .get_result::<i64>(conn)?)
            })
            .await
    }

    #[cfg(test)]
    async fn list_reactions(&self, message_id: &str) -> Result<Vec<Reaction>, DatabaseError> {
        let message_id = message_id.to_string();
        self.handle
            .run(move |conn| {
                let rows = message_reactions::table
                    .filter(message_reactions::message_id.eq(message_id))
                    .order(message_reactions::id.asc())
                    .select(DbReaction::as_select())
                    .load::<DbReaction>(conn)?;
                rows.iter().map(|row| row.to_reaction()).collect()
            })
            .await
    }
}

pub struct SqliteImportJobStore {
    handle: SqliteHandle,
}

impl SqliteImportJobStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::ImportJobStore for SqliteImportJobStore {
    async fn create_job(&self, job: &ImportJob) -> Result<(), DatabaseError> {
        let row = DbImportJob {
            id: job.id.clone(),
            source_file: job.source_file.clone(),
            workspace_name: job.workspace_name.clone(),
            status: job.status.as_str().to_string(),
            summary: job.summary.clone(),
            created_at: datetime_to_string(&job.created_at),
            updated_at: datetime_to_string(&job.updated_at),
        };
        self.handle
            .run(move |conn| {
                diesel::insert_into(import_jobs::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn get_job(&self, id: &str) -> Result<Option<ImportJob>, DatabaseError> {
        let id = id.to_string();
        self.handle
            .run(move |conn| {
                import_jobs::table
                    .filter(import_jobs::id.eq(id))
                    .select(DbImportJob::as_select())
                    .first::<DbImportJob>(conn)
                    .optional()?
                    .map(|row| row.to_import_job())
                    .transpose()
            })
            .await
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>, DatabaseError> {
        self.handle
            .run(move |conn| {
                let rows = import_jobs::table
                    .order(import_jobs::created_at.desc())
                    .limit(limit)
                    .select(DbImportJob::as_select())
                    .load::<DbImportJob>(conn)?;
                rows.iter().map(|row| row.to_import_job()).collect()
            })
            .await
    }

    async fn set_job_status(
        &self,
        id: &str,
        status: JobStatus,
        summary: &str,
    ) -> Result<(), DatabaseError> {
        let id = id.to_string();
        let summary = summary.to_string();
        self.handle
            .run(move |conn| {
                let updated = diesel::update(import_jobs::table.filter(import_jobs::id.eq(&id)))
                    .set((
                        import_jobs::status.eq(status.as_str()),
                        import_jobs::summary.eq(summary),
                        import_jobs::updated_at.eq(datetime_to_string(&Utc::now())),
                    ))
                    .execute(conn)?;
                if updated == 0 {
                    return Err(DatabaseError::NotFound(format!("import job {}", id)));
                }
                Ok(())
            })
            .await
    }
}
