use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod archive;

pub use self::archive::{ArchiveError, ChannelFolder, DayFile, ExportArchive};

/// Subtypes rendered as system notices rather than user text.
pub const SYSTEM_SUBTYPES: [&str; 4] = [
    "channel_join",
    "channel_leave",
    "channel_topic",
    "channel_purpose",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackUser {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub deleted: bool,
    #[serde(default, deserialize_with = "lenient_object")]
    pub profile: SlackProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackProfile {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub real_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackChannel {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub members: Vec<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub purpose: SlackTextField,
    #[serde(default, deserialize_with = "lenient_object")]
    pub topic: SlackTextField,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_archived: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub pins: Vec<SlackPin>,
}

impl SlackChannel {
    /// Purpose text, falling back to the topic.
    pub fn description(&self) -> String {
        self.purpose
            .value
            .clone()
            .or_else(|| self.topic.value.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackTextField {
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackPin {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackMessage {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ts: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub thread_ts: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub reactions: Vec<SlackReaction>,
}

impl SlackMessage {
    pub fn is_message(&self) -> bool {
        self.kind.as_deref() == Some("message")
    }

    pub fn is_system(&self) -> bool {
        self.subtype
            .as_deref()
            .is_some_and(|subtype| SYSTEM_SUBTYPES.contains(&subtype))
    }

    /// The thread root timestamp, when this message replies to another one.
    pub fn reply_to(&self) -> Option<&str> {
        match (self.thread_ts.as_deref(), self.ts.as_deref()) {
            (Some(thread), Some(ts)) if thread != ts => Some(thread),
            (Some(thread), None) => Some(thread),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackReaction {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub users: Vec<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v as i64 == 1),
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
        _ => T::default(),
    })
}
