use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::channels::{self, ChannelMap};
use super::identity::IdentityMap;
use super::{ImportError, ids};
use crate::db::{DatabaseManager, Message, MessageKind, Reaction, WriteContext};
use crate::slack::{DayFile, ExportArchive, SlackMessage};
use crate::utils::formatting::slack_text_to_html;

/// `(source channel name, source ts)` to message id.
pub type MessageIndex = HashMap<(String, String), String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounts {
    pub imported: usize,
    pub skipped: usize,
    pub reactions_imported: usize,
    pub replies_linked: usize,
}

#[derive(Debug, Default)]
pub struct MessageOutcome {
    pub counts: MessageCounts,
    pub index: MessageIndex,
}

/// A reply whose root had not been seen when it was inserted.
#[derive(Debug, Clone)]
struct PendingReply {
    message_id: String,
    channel_name: String,
    root_ts: String,
}

/// Parses a Slack `ts` (`seconds.micros`) into a UTC timestamp.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, ""));
    let seconds: i64 = seconds.parse().ok()?;
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let nanos = if fraction.is_empty() {
        0
    } else {
        let digits: String = fraction.chars().take(9).collect();
        format!("{:0<9}", digits).parse::<u32>().ok()?
    };
    DateTime::from_timestamp(seconds, nanos)
}

struct ChannelRun<'a> {
    db: &'a DatabaseManager,
    ctx: &'a WriteContext,
    identities: &'a IdentityMap,
    channel_id: String,
    channel_name: String,
}

impl ChannelRun<'_> {
    async fn import_entry(
        &self,
        entry: Value,
        counts: &mut MessageCounts,
        index: &mut MessageIndex,
        pending: &mut Vec<PendingReply>,
    ) -> Result<(), ImportError> {
        let message: SlackMessage = match serde_json::from_value(entry.clone()) {
            Ok(message) => message,
            Err(e) => {
                debug!(channel = %self.channel_name, error = %e, "undecodable message entry");
                return Ok(());
            }
        };
        if !message.is_message() {
            return Ok(());
        }

        let Some(owner) = message.user.as_ref().and_then(|uid| self.identities.get(uid)) else {
            counts.skipped += 1;
            return Ok(());
        };

        let reply_to = message.reply_to();
        let linked_message = reply_to.and_then(|root| {
            index
                .get(&(self.channel_name.clone(), root.to_string()))
                .cloned()
        });

        let created_at = message
            .ts
            .as_deref()
            .and_then(parse_slack_ts)
            .unwrap_or_else(Utc::now);
        let message_id = match message.ts.as_deref() {
            Some(ts) => ids::message_id(&self.channel_id, ts),
            None => ids::random_id(),
        };

        let row = Message {
            id: message_id.clone(),
            channel_id: self.channel_id.clone(),
            owner: owner.clone(),
            message_type: if message.is_system() {
                MessageKind::System
            } else {
                MessageKind::Text
            },
            text: slack_text_to_html(message.text.as_deref().unwrap_or_default()),
            json: entry.to_string(),
            is_reply: linked_message.is_some(),
            linked_message: linked_message.clone(),
            created_at,
            modified_at: created_at,
        };

        let store = self.db.message_store();
        let inserted = store.insert_message(self.ctx, &row).await?;
        if inserted {
            counts.imported += 1;
        } else {
            counts.skipped += 1;
        }

        if let Some(ts) = &message.ts {
            index.insert((self.channel_name.clone(), ts.clone()), message_id.clone());
        }

        match (linked_message, reply_to) {
            // An existing row keeps its parent; only an unlinked one is filled in.
            (Some(root_id), _) => {
                if inserted || store.link_reply(self.ctx, &message_id, &root_id).await? {
                    counts.replies_linked += 1;
                }
            }
            (None, Some(root)) => pending.push(PendingReply {
                message_id: message_id.clone(),
                channel_name: self.channel_name.clone(),
                root_ts: root.to_string(),
            }),
            (None, None) => {}
        }

        for reaction in &message.reactions {
            let Some(name) = reaction.name.as_deref() else {
                continue;
            };
            for reactor in reaction.users.iter().filter_map(|uid| self.identities.get(uid)) {
                let row = Reaction {
                    id: ids::reaction_id(&message_id, reactor, name),
                    owner: reactor.clone(),
                    reaction: name.to_string(),
                    reaction_escaped: name.to_string(),
                    message_id: message_id.clone(),
                    channel_id: self.channel_id.clone(),
                    is_custom: false,
                    created_at: Utc::now(),
                };
                if store.insert_reaction(self.ctx, &row).await? {
                    counts.reactions_imported += 1;
                }
            }
        }

        Ok(())
    }
}

/// Imports every channel folder's messages, then links replies whose root
/// showed up later (or already existed from an earlier run).
#[allow(clippy::too_many_arguments)]
pub async fn import_messages(
    db: &DatabaseManager,
    ctx: &WriteContext,
    archive: &mut ExportArchive,
    channel_map: &mut ChannelMap,
    identities: &IdentityMap,
    workspace_id: &str,
    operator: Option<&str>,
) -> Result<MessageOutcome, ImportError> {
    let mut counts = MessageCounts::default();
    let mut index = MessageIndex::new();
    let mut pending: Vec<PendingReply> = Vec::new();

    for folder in archive.channel_folders() {
        let Some(channel_name) = folder.channel.name.clone() else {
            continue;
        };

        let known = match channel_map.get(&channel_name) {
            Some(id) if db.channel_store().get_channel(id).await?.is_some() => Some(id.clone()),
            _ => None,
        };
        let channel_id = match known {
            Some(id) => id,
            None => {
                let created = channels::ensure_channel_and_members(
                    db,
                    ctx,
                    &folder.channel,
                    identities,
                    workspace_id,
                    operator,
                )
                .await?;
                let Some(id) = created else {
                    debug!(folder = %folder.folder, "no channel for folder, skipping messages");
                    continue;
                };
                channel_map.insert(channel_name.clone(), id.clone());
                id
            }
        };

        let run = ChannelRun {
            db,
            ctx,
            identities,
            channel_id,
            channel_name,
        };
        let before = counts;

        for member in &folder.files {
            let entries = match archive.read_day_file(member) {
                DayFile::Entries(entries) => entries,
                DayFile::Malformed => {
                    counts.skipped += 1;
                    continue;
                }
                DayFile::Empty | DayFile::NotArray => continue,
            };
            for entry in entries.into_iter().filter(Value::is_object) {
                run.import_entry(entry, &mut counts, &mut index, &mut pending)
                    .await?;
            }
        }

        info!(
            channel = %run.channel_id,
            files = folder.files.len(),
            imported = counts.imported - before.imported,
            skipped = counts.skipped - before.skipped,
            "channel messages imported"
        );
    }

    counts.replies_linked += link_pending_replies(db, ctx, channel_map, &index, pending).await?;

    Ok(MessageOutcome { counts, index })
}

async fn link_pending_replies(
    db: &DatabaseManager,
    ctx: &WriteContext,
    channel_map: &ChannelMap,
    index: &MessageIndex,
    pending: Vec<PendingReply>,
) -> Result<usize, ImportError> {
    let store = db.message_store();
    let mut linked = 0;
    for reply in pending {
        let Some(channel_id) = channel_map.get(&reply.channel_name) else {
            continue;
        };
        let root_id = index
            .get(&(reply.channel_name.clone(), reply.root_ts.clone()))
            .cloned()
            .unwrap_or_else(|| ids::message_id(channel_id, &reply.root_ts));
        if !store.message_exists(&root_id).await? {
            debug!(message = %reply.message_id, root_ts = %reply.root_ts, "thread root missing, reply left unlinked");
            continue;
        }
        if store.link_reply(ctx, &reply.message_id, &root_id).await? {
            linked += 1;
        }
    }
    Ok(linked)
}
