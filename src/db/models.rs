use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub enabled: bool,
    pub user_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIdentity {
    pub id: String,
    pub identity_id: String,
    pub full_name: String,
    pub first_name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub workspace_name: String,
    pub visibility: String,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub const PRIVATE: &'static str = "Private";

    pub fn private(name: &str) -> Self {
        Self {
            id: name.to_string(),
            workspace_name: name.to_string(),
            visibility: Self::PRIVATE.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub id: i64,
    pub workspace_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub channel_name: String,
    pub workspace_id: String,
    pub channel_type: String,
    pub channel_description: String,
    pub is_archived: bool,
    pub is_thread: bool,
    pub pinned_messages_string: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub const PUBLIC: &'static str = "Public";

    /// Channel ids are scoped by workspace: `<workspace>-<channel_name>`.
    pub fn id_for(workspace_id: &str, channel_name: &str) -> String {
        format!("{}-{}", workspace_id, channel_name)
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMember {
    pub id: i64,
    pub channel_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub allow_notifications: bool,
    pub last_visit: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "Text",
            MessageKind::System => "System",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Text" => Ok(MessageKind::Text),
            "System" => Ok(MessageKind::System),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub owner: String,
    pub message_type: MessageKind,
    pub text: String,
    /// Raw source payload, kept for audit.
    pub json: String,
    pub is_reply: bool,
    pub linked_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub owner: String,
    pub reaction: String,
    pub reaction_escaped: String,
    pub message_id: String,
    pub channel_id: String,
    pub is_custom: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "Not Started",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Not Started" => Ok(JobStatus::NotStarted),
            "Running" => Ok(JobStatus::Running),
            "Completed" => Ok(JobStatus::Completed),
            "Failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub source_file: String,
    pub workspace_name: String,
    pub status: JobStatus,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    pub fn new(source_file: &str, workspace_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_file: source_file.to_string(),
            workspace_name: workspace_name.to_string(),
            status: JobStatus::NotStarted,
            summary: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_display() {
        for status in [
            JobStatus::NotStarted,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
        assert!("Queued".parse::<JobStatus>().is_err());
    }

    #[test]
    fn channel_id_is_workspace_scoped() {
        assert_eq!(Channel::id_for("Slack", "general"), "Slack-general");
    }

    #[test]
    fn new_job_starts_not_started() {
        let job = ImportJob::new("/private/files/slack.zip", "Slack");
        assert_eq!(job.status, JobStatus::NotStarted);
        assert!(job.summary.is_empty());
    }
}
