use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocType {
    Role,
    Identity,
    ChatIdentity,
    Workspace,
    WorkspaceMember,
    Channel,
    ChannelMember,
    Message,
    Reaction,
    PinnedMessage,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Role => "Role",
            DocType::Identity => "User",
            DocType::ChatIdentity => "Raven User",
            DocType::Workspace => "Raven Workspace",
            DocType::WorkspaceMember => "Raven Workspace Member",
            DocType::Channel => "Raven Channel",
            DocType::ChannelMember => "Raven Channel Member",
            DocType::Message => "Raven Message",
            DocType::Reaction => "Raven Message Reaction",
            DocType::PinnedMessage => "Raven Pinned Messages",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentEvent<'a> {
    pub doctype: DocType,
    pub name: &'a str,
    pub actor: &'a str,
}

/// Run-scoped settings carried by every store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteContext {
    pub actor: String,
    /// Skip the host's after-insert behaviour (welcome mail, join notices, realtime fan-out).
    pub bypass_hooks: bool,
}

impl WriteContext {
    pub fn import(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            bypass_hooks: true,
        }
    }

    pub fn interactive(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            bypass_hooks: false,
        }
    }
}

/// The host application's document lifecycle, injected into the stores.
pub trait DocumentHooks: Send + Sync {
    fn after_insert(&self, event: &DocumentEvent<'_>);
}

pub struct LoggingHooks;

impl DocumentHooks for LoggingHooks {
    fn after_insert(&self, event: &DocumentEvent<'_>) {
        debug!(
            doctype = event.doctype.as_str(),
            name = event.name,
            actor = event.actor,
            "document inserted"
        );
    }
}

pub struct HookRegistry {
    hooks: Arc<dyn DocumentHooks>,
    suppressed: AtomicUsize,
}

impl HookRegistry {
    pub fn new(hooks: Arc<dyn DocumentHooks>) -> Self {
        Self {
            hooks,
            suppressed: AtomicUsize::new(0),
        }
    }

    /// Suppresses hooks process-wide until the returned guard is dropped.
    pub fn suppress(self: &Arc<Self>) -> SuppressionGuard {
        self.suppressed.fetch_add(1, Ordering::SeqCst);
        SuppressionGuard {
            registry: self.clone(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst) > 0
    }

    pub fn dispatch(&self, ctx: &WriteContext, doctype: DocType, name: &str) {
        if ctx.bypass_hooks || self.is_suppressed() {
            return;
        }
        self.hooks.after_insert(&DocumentEvent {
            doctype,
            name,
            actor: &ctx.actor,
        });
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new(Arc::new(LoggingHooks))
    }
}

#[must_use = "hooks are restored as soon as the guard is dropped"]
pub struct SuppressionGuard {
    registry: Arc<HookRegistry>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.registry.suppressed.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingHooks {
        pub events: Mutex<Vec<(DocType, String)>>,
    }

    impl RecordingHooks {
        pub fn count(&self, doctype: DocType) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|(kind, _)| *kind == doctype)
                .count()
        }

        pub fn total(&self) -> usize {
            self.events.lock().len()
        }
    }

    impl DocumentHooks for RecordingHooks {
        fn after_insert(&self, event: &DocumentEvent<'_>) {
            self.events
                .lock()
                .push((event.doctype, event.name.to_string()));
        }
    }
}
