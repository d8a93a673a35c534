use std::collections::HashSet;

use tracing::debug;

use super::ImportError;
use super::channels::{self, ChannelMap};
use super::identity::IdentityMap;
use super::messages::MessageIndex;
use crate::db::{DatabaseManager, WriteContext};
use crate::slack::SlackChannel;

/// Records pins that resolve to stored messages and refreshes each touched
/// channel's `pinned_messages_string`. Returns the number of new pins.
#[allow(clippy::too_many_arguments)]
pub async fn apply_pins(
    db: &DatabaseManager,
    ctx: &WriteContext,
    sources: &[SlackChannel],
    channel_map: &mut ChannelMap,
    index: &MessageIndex,
    identities: &IdentityMap,
    workspace_id: &str,
    operator: Option<&str>,
) -> Result<usize, ImportError> {
    let channel_store = db.channel_store();
    let message_store = db.message_store();
    let mut total = 0;

    for source in sources {
        let Some(name) = source.name.as_ref() else {
            continue;
        };
        let Some(mut channel_id) = channel_map.get(name).cloned() else {
            continue;
        };

        if channel_store.get_channel(&channel_id).await?.is_none() {
            match channels::ensure_channel_and_members(
                db,
                ctx,
                source,
                identities,
                workspace_id,
                operator,
            )
            .await?
            {
                Some(id) => {
                    channel_map.insert(name.clone(), id.clone());
                    channel_id = id;
                }
                None => continue,
            }
        }

        if source.pins.is_empty() {
            continue;
        }

        let mut pinned: HashSet<String> = channel_store
            .pinned_message_ids(&channel_id)
            .await?
            .into_iter()
            .collect();
        let mut added = 0;

        for pin in &source.pins {
            let Some(ts) = pin.id.as_ref() else {
                continue;
            };
            let Some(message_id) = index.get(&(name.clone(), ts.clone())) else {
                debug!(channel = %channel_id, ts = %ts, "pin references an unknown message");
                continue;
            };
            if pinned.contains(message_id) {
                continue;
            }
            if !message_store.message_exists(message_id).await? {
                debug!(channel = %channel_id, message = %message_id, "pinned message is not stored");
                continue;
            }
            if channel_store.add_pin(ctx, &channel_id, message_id).await? {
                pinned.insert(message_id.clone());
                added += 1;
            }
        }

        if added > 0 {
            let ordered = channel_store.pinned_message_ids(&channel_id).await?;
            channel_store
                .set_pinned_messages_string(ctx, &channel_id, &ordered.join("\n"))
                .await?;
        }
        total += added;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::importer::ids;
    use crate::importer::identity::resolve_identities;
    use crate::importer::messages::import_messages;
    use crate::importer::testing::Fixture;
    use crate::slack::ExportArchive;

    #[tokio::test]
    async fn pins_follow_source_order_and_skip_dangling() {
        let fixture = Fixture::new().await;
        let users = json!([{ "id": "U1", "profile": { "email": "ana@example.com" } }]).to_string();
        let channels = json!([{
            "id": "C1", "name": "general", "members": ["U1"],
            "pins": [{ "id": "2.0" }, { "id": "404.0" }, { "id": "1.0" }, {}, { "id": "2.0" }],
        }])
        .to_string();
        let day = json!([
            { "type": "message", "user": "U1", "ts": "1.0", "text": "one" },
            { "type": "message", "user": "U1", "ts": "2.0", "text": "two" },
        ])
        .to_string();
        let file = fixture.write_export(&[
            ("users.json", users.as_str()),
            ("channels.json", channels.as_str()),
            ("general/2024-01-01.json", day.as_str()),
        ]);

        let summary = fixture.importer.import(file, None, None).await.unwrap();
        assert_eq!(summary.pinned_messages_set, 2);

        let channel = fixture
            .db()
            .channel_store()
            .get_channel("Slack-general")
            .await
            .unwrap()
            .unwrap();
        let expected = [
            ids::message_id("Slack-general", "2.0"),
            ids::message_id("Slack-general", "1.0"),
        ]
        .join("\n");
        assert_eq!(channel.pinned_messages_string, expected);
    }

    #[tokio::test]
    async fn pins_without_any_messages_leave_channel_untouched() {
        let fixture = Fixture::new().await;
        let users = json!([{ "id": "U1", "profile": { "email": "ana@example.com" } }]).to_string();
        let channels = json!([{
            "id": "C1", "name": "general", "members": ["U1"], "pins": [{ "id": "9.0" }],
        }])
        .to_string();
        let file = fixture.write_export(&[
            ("users.json", users.as_str()),
            ("channels.json", channels.as_str()),
        ]);

        let summary = fixture.importer.import(file, None, None).await.unwrap();
        assert_eq!(summary.pinned_messages_set, 0);
        assert!(
            fixture
                .db()
                .channel_store()
                .pinned_message_ids("Slack-general")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn pins_recreate_a_missing_channel() {
        let fixture = Fixture::new().await;
        let db = fixture.db();
        let ctx = WriteContext::import("Administrator");
        let config = fixture.importer.config().clone();
        let users = json!([{ "id": "U1", "profile": { "email": "ana@example.com" } }]).to_string();
        let listing = json!([{
            "id": "C1", "name": "general", "members": ["U1"], "pins": [{ "id": "1.0" }],
        }])
        .to_string();
        let day = json!([{ "type": "message", "user": "U1", "ts": "1.0", "text": "one" }]).to_string();
        fixture.write_export(&[
            ("users.json", users.as_str()),
            ("channels.json", listing.as_str()),
            ("general/2024-01-01.json", day.as_str()),
        ]);

        let mut archive = ExportArchive::open(fixture.archive_path()).unwrap();
        let identities = resolve_identities(db, &ctx, &config, archive.users()).await.unwrap();
        let workspace = channels::ensure_workspace(db, &ctx, "Slack").await.unwrap();
        let mut channel_map = channels::materialize_channels(
            db,
            &ctx,
            archive.channels(),
            &identities,
            &workspace.id,
            None,
        )
        .await
        .unwrap();
        let outcome = import_messages(
            db,
            &ctx,
            &mut archive,
            &mut channel_map,
            &identities,
            &workspace.id,
            None,
        )
        .await
        .unwrap();

        // Messages carry no foreign key to the channel and survive this.
        fixture.delete_channel("Slack-general").await;

        let pinned = apply_pins(
            db,
            &ctx,
            archive.channels(),
            &mut channel_map,
            &outcome.index,
            &identities,
            &workspace.id,
            None,
        )
        .await
        .unwrap();
        assert_eq!(pinned, 1);

        let channel = db.channel_store().get_channel("Slack-general").await.unwrap().unwrap();
        assert_eq!(
            channel.pinned_messages_string,
            ids::message_id("Slack-general", "1.0")
        );
    }
}
