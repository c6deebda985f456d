// ── Generic message shapes ──
//
// The sync layer is generic over request/response records. It only needs
// a name to identify resources, a change list for streamed collections,
// and a continuation token for paged lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ── Streamed changes ─────────────────────────────────────────────────

/// Kind of mutation carried by a [`Change`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Add,
    Update,
    Remove,
    /// Full re-sync of an entry. Applied like [`ChangeType::Update`].
    Replace,
}

/// One entry in a streamed collection change list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change<V> {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
    #[serde(default)]
    pub change_time: Option<DateTime<Utc>>,
}

impl<V> Change<V> {
    pub fn add(value: V) -> Self {
        Self {
            change_type: ChangeType::Add,
            old_value: None,
            new_value: Some(value),
            change_time: None,
        }
    }

    pub fn update(old: V, new: V) -> Self {
        Self {
            change_type: ChangeType::Update,
            old_value: Some(old),
            new_value: Some(new),
            change_time: None,
        }
    }

    pub fn remove(value: V) -> Self {
        Self {
            change_type: ChangeType::Remove,
            old_value: Some(value),
            new_value: None,
            change_time: None,
        }
    }

    #[must_use]
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.change_time = Some(time);
        self
    }

    /// The value that identifies the entry: `new_value`, else `old_value`.
    pub fn subject(&self) -> Option<&V> {
        self.new_value.as_ref().or(self.old_value.as_ref())
    }
}

/// A pushed value for a single named resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange<V> {
    pub name: String,
    pub value: V,
    #[serde(default)]
    pub change_time: Option<DateTime<Utc>>,
}

/// Stream message for single-value pulls. Servers batch changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullValueResponse<V> {
    pub changes: Vec<ValueChange<V>>,
}

impl<V> PullValueResponse<V> {
    /// The newest value in the batch, if any.
    pub fn into_latest(self) -> Option<V> {
        self.changes.into_iter().last().map(|c| c.value)
    }
}

// ── Paged lists ──────────────────────────────────────────────────────

/// One page of a list RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<V> {
    pub items: Vec<V>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub total_size: Option<u32>,
}

impl<V> ListPage<V> {
    pub fn new(items: Vec<V>, next_page_token: Option<&str>) -> Self {
        Self {
            items,
            next_page_token: next_page_token.map(String::from),
            total_size: None,
        }
    }

    /// Continuation cursor, with the empty string treated as "no more pages".
    pub fn continuation(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn has_more(&self) -> bool {
        self.continuation().is_some()
    }
}

/// Pagination parameters for a list call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageRequest {
    pub page_token: Option<String>,
    pub page_size: u32,
}

// ── Named requests ───────────────────────────────────────────────────

/// Request to stream updates for one named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequest {
    pub name: String,
    /// Skip the initial value and only send changes.
    pub updates_only: bool,
}

impl PullRequest {
    pub fn builder() -> PullRequestBuilder {
        PullRequestBuilder::default()
    }

    /// Shorthand for a full pull of `name`.
    pub fn named(name: impl Into<String>) -> Result<Self, Error> {
        Self::builder().name(name).build()
    }
}

#[derive(Debug, Default)]
pub struct PullRequestBuilder {
    name: Option<String>,
    updates_only: bool,
}

impl PullRequestBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn updates_only(mut self, updates_only: bool) -> Self {
        self.updates_only = updates_only;
        self
    }

    pub fn build(self) -> Result<PullRequest, Error> {
        Ok(PullRequest {
            name: require_name(self.name, "PullRequest")?,
            updates_only: self.updates_only,
        })
    }
}

/// Request to read one named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetRequest {
    pub name: String,
}

impl GetRequest {
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            name: require_name(Some(name.into()), "GetRequest")?,
        })
    }
}

/// Reject absent or blank names.
pub(crate) fn require_name(name: Option<String>, message: &'static str) -> Result<String, Error> {
    match name {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(Error::MissingField {
            message,
            field: "name",
        }),
    }
}
