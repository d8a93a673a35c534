use async_trait::async_trait;

use super::DatabaseError;
use super::hooks::WriteContext;
use super::models::{
    Channel, ChatIdentity, Identity, ImportJob, JobStatus, Message, Reaction, Workspace,
};
#[cfg(test)]
use super::models::{ChannelMember, WorkspaceMember};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Inserts the role if missing. Returns `true` when a row was created.
    async fn ensure_role(&self, ctx: &WriteContext, role: &str) -> Result<bool, DatabaseError>;
    #[cfg(test)]
    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, DatabaseError>;
    async fn get_identity_by_email(&self, email: &str)
    -> Result<Option<Identity>, DatabaseError>;
    /// Inserts the identity, its roles and its chat identity as one unit: on
    /// any failure none of them is kept. Fails with `Constraint` when `roles`
    /// is empty.
    async fn create_identity(
        &self,
        ctx: &WriteContext,
        identity: &Identity,
        chat_identity: &ChatIdentity,
        roles: &[String],
    ) -> Result<(), DatabaseError>;
    async fn update_identity(
        &self,
        ctx: &WriteContext,
        identity: &Identity,
    ) -> Result<(), DatabaseError>;
    async fn get_roles(&self, identity_id: &str) -> Result<Vec<String>, DatabaseError>;
    async fn add_role(
        &self,
        ctx: &WriteContext,
        identity_id: &str,
        role: &str,
    ) -> Result<bool, DatabaseError>;
    #[cfg(test)]
    async fn get_chat_identity(&self, id: &str) -> Result<Option<ChatIdentity>, DatabaseError>;
    async fn get_chat_identity_by_identity(
        &self,
        identity_id: &str,
    ) -> Result<Option<ChatIdentity>, DatabaseError>;
    async fn create_chat_identity(
        &self,
        ctx: &WriteContext,
        chat_identity: &ChatIdentity,
    ) -> Result<(), DatabaseError>;
    async fn update_chat_identity(
        &self,
        ctx: &WriteContext,
        chat_identity: &ChatIdentity,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn get_workspace(&self, id: &str) -> Result<Option<Workspace>, DatabaseError>;
    async fn get_workspace_by_name(&self, name: &str)
    -> Result<Option<Workspace>, DatabaseError>;
    async fn create_workspace(
        &self,
        ctx: &WriteContext,
        workspace: &Workspace,
    ) -> Result<(), DatabaseError>;
    #[cfg(test)]
    async fn get_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<WorkspaceMember>, DatabaseError>;
    /// Insert-if-absent on (workspace, user). Returns `true` when a row was created.
    async fn add_workspace_member(
        &self,
        ctx: &WriteContext,
        workspace_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_channel(&self, id: &str) -> Result<Option<Channel>, DatabaseError>;
    async fn find_channel(
        &self,
        workspace_id: &str,
        channel_name: &str,
    ) -> Result<Option<Channel>, DatabaseError>;
    async fn create_channel(&self, ctx: &WriteContext, channel: &Channel)
    -> Result<(), DatabaseError>;
    /// Non-thread channel ids in the workspace, oldest first.
    async fn list_channel_ids(&self, workspace_id: &str) -> Result<Vec<String>, DatabaseError>;
    /// Insert-if-absent on (channel, user). Returns `true` when a row was created.
    async fn add_channel_member(
        &self,
        ctx: &WriteContext,
        channel_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> Result<bool, DatabaseError>;
    #[cfg(test)]
    async fn list_channel_members(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelMember>, DatabaseError>;
    /// Pinned message ids ordered by pin creation.
    async fn pinned_message_ids(&self, channel_id: &str) -> Result<Vec<String>, DatabaseError>;
    /// Insert-if-absent on (channel, message). Returns `true` when a row was created.
    async fn add_pin(
        &self,
        ctx: &WriteContext,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, DatabaseError>;
    async fn set_pinned_messages_string(
        &self,
        ctx: &WriteContext,
        channel_id: &str,
        value: &str,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    #[cfg(test)]
    async fn get_message(&self, id: &str) -> Result<Option<Message>, DatabaseError>;
    async fn message_exists(&self, id: &str) -> Result<bool, DatabaseError>;
    /// Insert-if-absent on the message id. Returns `true` when a row was created.
    async fn insert_message(&self, ctx: &WriteContext, message: &Message)
    -> Result<bool, DatabaseError>;
    /// Sets `linked_message`/`is_reply` only when the message has no parent yet.
    async fn link_reply(
        &self,
        ctx: &WriteContext,
        message_id: &str,
        root_id: &str,
    ) -> Result<bool, DatabaseError>;
    /// Insert-if-absent on the reaction id. Returns `true` when a row was created.
    async fn insert_reaction(
        &self,
        ctx: &WriteContext,
        reaction: &Reaction,
    ) -> Result<bool, DatabaseError>;
    #[cfg(test)]
    async fn count_messages(&self, channel_id: &str) -> Result<i64, DatabaseError>;
    #[cfg(test)]
    async fn list_reactions(&self, message_id: &str) -> Result<Vec<Reaction>, DatabaseError>;
}

#[async_trait]
pub trait ImportJobStore: Send + Sync {
    async fn create_job(&self, job: &ImportJob) -> Result<(), DatabaseError>;
    async fn get_job(&self, id: &str) -> Result<Option<ImportJob>, DatabaseError>;
    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>, DatabaseError>;
    async fn set_job_status(
        &self,
        id: &str,
        status: JobStatus,
        summary: &str,
    ) -> Result<(), DatabaseError>;
}
