use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::ImportError;
use crate::config::ImportConfig;
use crate::db::{ChatIdentity, DatabaseError, DatabaseManager, Identity, WriteContext};
use crate::slack::SlackUser;

pub const SYSTEM_USER: &str = "System User";

/// Source user id to chat identity id.
pub type IdentityMap = HashMap<String, String>;

/// Names and flags derived from one source user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub source_id: String,
    pub email: String,
    pub synthetic: bool,
    pub username: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub deleted: bool,
}

impl UserProfile {
    /// Returns `None` for records without a source id.
    pub fn from_source(user: &SlackUser, synthetic_domain: &str) -> Option<Self> {
        let source_id = user.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
        let profile = &user.profile;
        let email = non_blank(profile.email.as_deref());

        let full_name = non_blank(profile.real_name.as_deref())
            .or_else(|| non_blank(profile.display_name.as_deref()))
            .or_else(|| email.clone())
            .unwrap_or_else(|| source_id.to_string());
        let first_name = non_blank(profile.first_name.as_deref())
            .or_else(|| full_name.split(' ').next().and_then(|w| non_blank(Some(w))))
            .unwrap_or_else(|| source_id.to_string());
        let last_name = non_blank(profile.last_name.as_deref()).unwrap_or_default();

        let (email, synthetic) = match email {
            Some(email) => (email, false),
            None => (format!("slack-{}@{}", source_id, synthetic_domain), true),
        };
        let username = non_blank(user.name.as_deref()).unwrap_or_else(|| {
            email
                .split('@')
                .next()
                .unwrap_or(source_id)
                .to_string()
        });

        Some(Self {
            source_id: source_id.to_string(),
            email,
            synthetic,
            username,
            full_name,
            first_name,
            last_name,
            deleted: user.deleted,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Maps every source user to a chat identity, creating identities as needed.
pub async fn resolve_identities(
    db: &DatabaseManager,
    ctx: &WriteContext,
    config: &ImportConfig,
    users: &[SlackUser],
) -> Result<IdentityMap, ImportError> {
    let store = db.identity_store();
    if store.ensure_role(ctx, &config.baseline_role).await? {
        info!(role = %config.baseline_role, "created baseline role");
    }

    let mut map = IdentityMap::new();
    for user in users {
        let Some(profile) = UserProfile::from_source(user, &config.synthetic_email_domain) else {
            debug!("skipping user record without id");
            continue;
        };
        match resolve_user(db, ctx, config, &profile).await {
            Ok(chat_id) => {
                map.insert(profile.source_id, chat_id);
            }
            Err(e) => {
                warn!(source_id = %profile.source_id, email = %profile.email, error = %e, "failed to resolve user, skipping");
            }
        }
    }
    Ok(map)
}

async fn resolve_user(
    db: &DatabaseManager,
    ctx: &WriteContext,
    config: &ImportConfig,
    profile: &UserProfile,
) -> Result<String, DatabaseError> {
    let store = db.identity_store();
    let now = Utc::now();
    let enabled = !profile.deleted;

    let identity = match store.get_identity_by_email(&profile.email).await? {
        None => {
            let identity = Identity {
                id: profile.email.clone(),
                email: profile.email.clone(),
                username: profile.username.clone(),
                first_name: profile.first_name.clone(),
                last_name: profile.last_name.clone(),
                full_name: profile.full_name.clone(),
                enabled: !(profile.deleted || profile.synthetic),
                user_type: SYSTEM_USER.to_string(),
                created_at: now,
                updated_at: now,
            };
            let chat = ChatIdentity {
                id: identity.id.clone(),
                identity_id: identity.id.clone(),
                full_name: first_non_empty(&[
                    identity.full_name.as_str(),
                    profile.first_name.as_str(),
                ]),
                first_name: profile.first_name.clone(),
                enabled,
                created_at: now,
                updated_at: now,
            };
            store
                .create_identity(
                    ctx,
                    &identity,
                    &chat,
                    std::slice::from_ref(&config.baseline_role),
                )
                .await?;
            debug!(identity = %identity.id, synthetic = profile.synthetic, "created identity");
            return Ok(chat.id);
        }
        Some(mut identity) => {
            let mut changed = false;
            // Never re-enabled from here.
            if profile.deleted && identity.enabled {
                identity.enabled = false;
                changed = true;
            }
            if identity.full_name.is_empty() {
                identity.full_name = profile.full_name.clone();
                changed = true;
            }
            if changed {
                identity.updated_at = now;
                store.update_identity(ctx, &identity).await?;
            }
            let roles = store.get_roles(&identity.id).await?;
            if !roles.contains(&config.baseline_role) {
                store.add_role(ctx, &identity.id, &config.baseline_role).await?;
            }
            identity
        }
    };

    match store.get_chat_identity_by_identity(&identity.id).await? {
        None => {
            let chat = ChatIdentity {
                id: identity.id.clone(),
                identity_id: identity.id.clone(),
                full_name: first_non_empty(&[
                    identity.full_name.as_str(),
                    profile.first_name.as_str(),
                ]),
                first_name: profile.first_name.clone(),
                enabled,
                created_at: now,
                updated_at: now,
            };
            store.create_chat_identity(ctx, &chat).await?;
            Ok(chat.id)
        }
        Some(mut chat) => {
            let full_name = first_non_empty(&[
                chat.full_name.as_str(),
                identity.full_name.as_str(),
                profile.first_name.as_str(),
            ]);
            if chat.enabled != enabled || chat.full_name != full_name {
                chat.enabled = enabled;
                chat.full_name = full_name;
                chat.updated_at = now;
                store.update_chat_identity(ctx, &chat).await?;
            }
            Ok(chat.id)
        }
    }
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .find(|c| !c.is_empty())
        .map(|c| c.to_string())
        .unwrap_or_default()
}

/// Finds the operator's chat identity by identity id or email.
pub async fn resolve_operator(
    db: &DatabaseManager,
    reference: &str,
) -> Result<Option<String>, ImportError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Ok(None);
    }
    let store = db.identity_store();
    if let Some(chat) = store.get_chat_identity_by_identity(reference).await? {
        return Ok(Some(chat.id));
    }
    if let Some(identity) = store.get_identity_by_email(reference).await? {
        if let Some(chat) = store.get_chat_identity_by_identity(&identity.id).await? {
            return Ok(Some(chat.id));
        }
    }
    Ok(None)
}

pub async fn register_operator(
    db: &DatabaseManager,
    ctx: &WriteContext,
    config: &ImportConfig,
    email: &str,
    full_name: Option<&str>,
) -> Result<String, ImportError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ImportError::InvalidArgument(format!(
            "operator email is not valid: {:?}",
            email
        )));
    }

    let store = db.identity_store();
    store.ensure_role(ctx, &config.baseline_role).await?;

    let local_part = email.split('@').next().unwrap_or(&email).to_string();
    let full_name = non_blank(full_name).unwrap_or_else(|| local_part.clone());
    let first_name = full_name
        .split(' ')
        .next()
        .unwrap_or(&local_part)
        .to_string();
    let now = Utc::now();

    let identity = match store.get_identity_by_email(&email).await? {
        Some(mut identity) => {
            if !identity.enabled {
                identity.enabled = true;
                identity.updated_at = now;
                store.update_identity(ctx, &identity).await?;
            }
            if !store.get_roles(&identity.id).await?.contains(&config.baseline_role) {
                store.add_role(ctx, &identity.id, &config.baseline_role).await?;
            }
            identity
        }
        None => {
            let identity = Identity {
                id: email.clone(),
                email: email.clone(),
                username: local_part,
                first_name: first_name.clone(),
                last_name: String::new(),
                full_name: full_name.clone(),
                enabled: true,
                user_type: SYSTEM_USER.to_string(),
                created_at: now,
                updated_at: now,
            };
            let chat = ChatIdentity {
                id: identity.id.clone(),
                identity_id: identity.id.clone(),
                full_name: identity.full_name.clone(),
                first_name,
                enabled: true,
                created_at: now,
                updated_at: now,
            };
            store
                .create_identity(
                    ctx,
                    &identity,
                    &chat,
                    std::slice::from_ref(&config.baseline_role),
                )
                .await?;
            info!(operator = %chat.id, "operator registered");
            return Ok(chat.id);
        }
    };

    let chat_id = match store.get_chat_identity_by_identity(&identity.id).await? {
        Some(mut chat) => {
            if !chat.enabled {
                chat.enabled = true;
                chat.updated_at = now;
                store.update_chat_identity(ctx, &chat).await?;
            }
            chat.id
        }
        None => {
            let chat = ChatIdentity {
                id: identity.id.clone(),
                identity_id: identity.id.clone(),
                full_name: identity.full_name.clone(),
                first_name,
                enabled: true,
                created_at: now,
                updated_at: now,
            };
            store.create_chat_identity(ctx, &chat).await?;
            chat.id
        }
    };

    info!(operator = %chat_id, "operator registered");
    Ok(chat_id)
}
