pub use self::error::DatabaseError;
pub use self::hooks::{DocType, DocumentHooks, HookRegistry, LoggingHooks, WriteContext};
pub use self::manager::DatabaseManager;
pub use self::models::{
    Channel, ChatIdentity, Identity, ImportJob, JobStatus, Message, MessageKind, Reaction,
    Workspace,
};
pub use self::stores::{ChannelStore, IdentityStore, ImportJobStore, MessageStore, WorkspaceStore};

pub mod error;
pub mod hooks;
pub mod manager;
pub mod models;
pub mod schema;
pub mod sqlite;
pub mod stores;
