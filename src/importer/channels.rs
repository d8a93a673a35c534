use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use super::identity::{self, IdentityMap};
use super::{ImportError, JoinSummary};
use crate::db::{Channel, DatabaseManager, Workspace, WriteContext};
use crate::slack::SlackChannel;
use crate::utils::formatting::normalize_channel_name;

/// Source channel name to channel id.
pub type ChannelMap = HashMap<String, String>;

/// Looks the workspace up by name and creates it (private) when absent.
/// No owner membership is added here.
pub async fn ensure_workspace(
    db: &DatabaseManager,
    ctx: &WriteContext,
    name: &str,
) -> Result<Workspace, ImportError> {
    let name = name.trim();
    let store = db.workspace_store();
    if let Some(workspace) = store.get_workspace_by_name(name).await? {
        return Ok(workspace);
    }
    let workspace = Workspace::private(name);
    store.create_workspace(ctx, &workspace).await?;
    info!(workspace = %workspace.id, "created workspace");
    Ok(workspace)
}

pub async fn ensure_operator_membership(
    db: &DatabaseManager,
    ctx: &WriteContext,
    workspace_id: &str,
    operator: Option<&str>,
) -> Result<(), ImportError> {
    let Some(operator) = operator else {
        debug!(workspace = workspace_id, "no operator chat identity, skipping workspace membership");
        return Ok(());
    };
    db.workspace_store()
        .add_workspace_member(ctx, workspace_id, operator, true)
        .await?;
    Ok(())
}

/// Ensures the channel and its members exist. Returns the channel id, or
/// `None` when nobody in the channel resolves to a chat identity.
pub async fn ensure_channel_and_members(
    db: &DatabaseManager,
    ctx: &WriteContext,
    source: &SlackChannel,
    identities: &IdentityMap,
    workspace_id: &str,
    operator: Option<&str>,
) -> Result<Option<String>, ImportError> {
    let Some(source_name) = source.name.as_deref().filter(|n| !n.trim().is_empty()) else {
        return Ok(None);
    };

    let mut members: Vec<&str> = Vec::new();
    for uid in &source.members {
        if let Some(chat_id) = identities.get(uid) {
            if !members.contains(&chat_id.as_str()) {
                members.push(chat_id);
            }
        }
    }
    if let Some(operator) = operator {
        if !members.contains(&operator) {
            members.push(operator);
        }
    }
    if members.is_empty() {
        debug!(channel = source_name, "no resolvable members, channel skipped");
        return Ok(None);
    }

    let store = db.channel_store();
    let channel_name = normalize_channel_name(source_name);
    let channel = match store.find_channel(workspace_id, &channel_name).await? {
        Some(existing) => existing,
        None => {
            let now = Utc::now();
            let channel = Channel {
                id: Channel::id_for(workspace_id, &channel_name),
                channel_name,
                workspace_id: workspace_id.to_string(),
                channel_type: Channel::PUBLIC.to_string(),
                channel_description: source.description(),
                is_archived: source.is_archived,
                is_thread: false,
                pinned_messages_string: String::new(),
                created_at: now,
                updated_at: now,
            };
            store.create_channel(ctx, &channel).await?;
            debug!(channel = %channel.id, "created channel");
            channel
        }
    };

    let creator = source
        .creator
        .as_ref()
        .and_then(|uid| identities.get(uid))
        .map(String::as_str);
    for member in members {
        let is_admin = creator == Some(member);
        store
            .add_channel_member(ctx, &channel.id, member, is_admin)
            .await?;
    }

    Ok(Some(channel.id))
}

pub async fn materialize_channels(
    db: &DatabaseManager,
    ctx: &WriteContext,
    channels: &[SlackChannel],
    identities: &IdentityMap,
    workspace_id: &str,
    operator: Option<&str>,
) -> Result<ChannelMap, ImportError> {
    let mut map = ChannelMap::new();
    for source in channels {
        let Some(name) = source.name.as_ref() else {
            continue;
        };
        if let Some(channel_id) =
            ensure_channel_and_members(db, ctx, source, identities, workspace_id, operator).await?
        {
            map.insert(name.clone(), channel_id);
        }
    }
    Ok(map)
}

/// Joins the operator to `workspace_name` and to every channel in it.
///
/// A workspace row that went missing while channels still point at it is
/// recreated first.
pub async fn add_operator_to_workspace(
    db: &DatabaseManager,
    workspace_name: &str,
    operator_ref: &str,
) -> Result<JoinSummary, ImportError> {
    let workspaces = db.workspace_store();
    let channels = db.channel_store();

    let workspace_id = match workspaces.get_workspace_by_name(workspace_name).await? {
        Some(workspace) => workspace.id,
        None => match workspaces.get_workspace(workspace_name).await? {
            Some(workspace) => workspace.id,
            None => {
                if channels.list_channel_ids(workspace_name).await?.is_empty() {
                    return Err(ImportError::WorkspaceNotFound(workspace_name.to_string()));
                }
                let workspace = Workspace::private(workspace_name);
                workspaces
                    .create_workspace(&WriteContext::interactive(operator_ref), &workspace)
                    .await?;
                info!(workspace = %workspace.id, "recreated workspace referenced by channels");
                workspace.id
            }
        },
    };

    let operator = identity::resolve_operator(db, operator_ref)
        .await?
        .ok_or_else(|| ImportError::OperatorNotFound(operator_ref.to_string()))?;

    workspaces
        .add_workspace_member(&WriteContext::interactive(&operator), &workspace_id, &operator, true)
        .await?;

    // Channel members bypass hooks so no "joined" notices are posted.
    let quiet = WriteContext::import(&operator);
    let channel_ids = channels.list_channel_ids(&workspace_id).await?;
    let mut joined = 0;
    for channel_id in &channel_ids {
        if channels
            .add_channel_member(&quiet, channel_id, &operator, false)
            .await?
        {
            joined += 1;
        }
    }

    Ok(JoinSummary {
        message: format!(
            "Added you to workspace and {} channel(s). Refresh Raven to see them.",
            channel_ids.len()
        ),
        workspace: workspace_id,
        channels_total: channel_ids.len(),
        channels_joined: joined,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::importer::testing::Fixture;

    fn source(value: serde_json::Value) -> SlackChannel {
        serde_json::from_value(value).unwrap()
    }

    fn identities() -> IdentityMap {
        IdentityMap::from([
            ("U1".to_string(), "ana@example.com".to_string()),
            ("U2".to_string(), "bo@example.com".to_string()),
        ])
    }

    async fn seed_identities(fixture: &Fixture) {
        let users: Vec<crate::slack::SlackUser> = serde_json::from_value(json!([
            { "id": "U1", "profile": { "email": "ana@example.com" } },
            { "id": "U2", "profile": { "email": "bo@example.com" } },
        ]))
        .unwrap();
        let ctx = WriteContext::import("Administrator");
        let config = fixture.importer.config().clone();
        identity::resolve_identities(fixture.db(), &ctx, &config, &users)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn workspace_is_reused_by_name() {
        let fixture = Fixture::new().await;
        let ctx = WriteContext::import("Administrator");
        let first = ensure_workspace(fixture.db(), &ctx, " Slack ").await.unwrap();
        let second = ensure_workspace(fixture.db(), &ctx, "Slack").await.unwrap();
        assert_eq!(first.id, "Slack");
        assert_eq!(first.id, second.id);
        assert_eq!(first.visibility, Workspace::PRIVATE);
    }

    #[tokio::test]
    async fn channel_without_members_is_not_created() {
        let fixture = Fixture::new().await;
        let ctx = WriteContext::import("Administrator");
        ensure_workspace(fixture.db(), &ctx, "Slack").await.unwrap();

        let ghost = source(json!({ "name": "ghost", "members": ["U404"] }));
        let created = ensure_channel_and_members(fixture.db(), &ctx, &ghost, &identities(), "Slack", None)
            .await
            .unwrap();
        assert!(created.is_none());
        assert!(
            fixture.db().channel_store().list_channel_ids("Slack").await.unwrap().is_empty()
        );
    }

    #[tokio::test]
    async fn channel_name_is_normalized_and_reused() {
        let fixture = Fixture::new().await;
        seed_identities(&fixture).await;
        let ctx = WriteContext::import("Administrator");
        ensure_workspace(fixture.db(), &ctx, "Slack").await.unwrap();

        let raw = source(json!({
            "name": " Design Team ", "creator": "U2", "members": ["U1", "U2", "U1"],
            "topic": { "value": "pixels" }, "is_archived": 1,
        }));
        let id = ensure_channel_and_members(fixture.db(), &ctx, &raw, &identities(), "Slack", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, "Slack-design-team");
        let again = ensure_channel_and_members(fixture.db(), &ctx, &raw, &identities(), "Slack", None)
            .await
            .unwrap();
        assert_eq!(again.as_deref(), Some("Slack-design-team"));

        let store = fixture.db().channel_store();
        let channel = store.get_channel(&id).await.unwrap().unwrap();
        assert!(channel.is_archived);
        assert_eq!(channel.channel_description, "pixels");

        let members = store.list_channel_members(&id).await.unwrap();
        assert_eq!(members.len(), 2);
        let admin: Vec<_> = members.iter().filter(|m| m.is_admin).collect();
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].user_id, "bo@example.com");
    }

    #[tokio::test]
    async fn join_recreates_missing_workspace() {
        let fixture = Fixture::new().await;
        seed_identities(&fixture).await;
        let ctx = WriteContext::import("Administrator");
        ensure_workspace(fixture.db(), &ctx, "Slack").await.unwrap();
        let general = source(json!({ "name": "general", "members": ["U1"] }));
        ensure_channel_and_members(fixture.db(), &ctx, &general, &identities(), "Slack", None)
            .await
            .unwrap();

        fixture
            .db()
            .handle()
            .run(|conn| {
                use diesel::prelude::*;

                use crate::db::schema::workspaces;
                diesel::delete(workspaces::table).execute(conn)?;
                Ok(())
            })
            .await
            .unwrap();

        let summary = add_operator_to_workspace(fixture.db(), "Slack", "bo@example.com")
            .await
            .unwrap();
        assert_eq!(summary.workspace, "Slack");
        assert_eq!(summary.channels_joined, 1);
        assert!(
            fixture.db().workspace_store().get_workspace("Slack").await.unwrap().is_some()
        );
    }
}
