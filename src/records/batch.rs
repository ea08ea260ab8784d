//! Feed message envelope and the tagged record union.
//!
//! Each batch element is a full-entity snapshot, a change record, or an
//! unknown tag kept as-is so new remote record kinds degrade to a log
//! line instead of a decode failure.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use serde_json::Value;
use strum::{Display, EnumString};

use super::entities::{EntityKind, EntityRecord};

/// Wire tag marking a change record rather than a snapshot.
const CHANGE_TAG: &str = "CHANGE";

/// Envelope tag marking a full window snapshot.
pub const INITIAL_DUMP_TAG: &str = "INITIAL_DUMP";

/// Envelope tag marking an incremental change batch.
pub const UPDATE_TAG: &str = "UPDATE";

/// Kind of change carried by a [`ChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// A new entity; carries the full snapshot.
    Create,
    /// A partial mutation; carries changed fields only.
    Update,
    /// Removal of an existing entity.
    Delete,
}

impl<'de> Deserialize<'de> for ChangeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        ChangeKind::from_str(&tag)
            .map_err(|_| de::Error::custom(format!("unknown change type: {tag}")))
    }
}

/// An incremental instruction describing how one entity changed.
///
/// `entity_type` stays a raw tag: a change may target a kind this build
/// does not know, and that must survive decoding so the applier can log
/// and skip it.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// What happened to the entity.
    pub change_type: ChangeKind,
    /// Raw entity kind tag.
    pub entity_type: String,
    /// Target entity id.
    pub id: String,
    /// Full snapshot, present for CREATE.
    #[serde(default)]
    pub entity: Option<Value>,
    /// Changed fields by wire name, present for UPDATE.
    #[serde(default)]
    pub changed_fields: Option<serde_json::Map<String, Value>>,
}

impl ChangeRecord {
    /// Resolve the entity kind, if this build knows the tag.
    pub fn kind(&self) -> Option<EntityKind> {
        EntityKind::from_str(&self.entity_type).ok()
    }

    /// Decode the carried snapshot as its resolved kind.
    pub fn entity_record(&self) -> Option<serde_json::Result<EntityRecord>> {
        let kind = self.kind()?;
        let value = self.entity.clone()?;
        Some(EntityRecord::from_tagged_value(kind, value))
    }
}

/// One element of a feed batch.
#[derive(Debug, Clone)]
pub enum FeedRecord {
    /// Full snapshot of a known entity kind.
    Entity(EntityRecord),
    /// Incremental change instruction.
    Change(ChangeRecord),
    /// A record tagged with a kind this build does not know.
    Unknown(String),
}

impl<'de> Deserialize<'de> for FeedRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let tag = value
            .get("_type")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("_type"))?;

        if tag == CHANGE_TAG {
            let change = ChangeRecord::deserialize(&value).map_err(de::Error::custom)?;
            return Ok(FeedRecord::Change(change));
        }

        match EntityKind::from_str(tag) {
            Ok(kind) => {
                let tag = tag.to_owned();
                EntityRecord::from_tagged_value(kind, value)
                    .map(FeedRecord::Entity)
                    .map_err(|err| de::Error::custom(format!("bad {tag} record: {err}")))
            }
            Err(_) => Ok(FeedRecord::Unknown(tag.to_owned())),
        }
    }
}

/// Ordered set of records delivered in one feed message.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBatch {
    /// Protocol version advertised by the remote.
    #[serde(default)]
    pub version: Option<String>,
    /// Message type tag from the envelope.
    #[serde(default)]
    pub message_type: Option<String>,
    /// Records in delivery order.
    #[serde(default)]
    pub records: Vec<FeedRecord>,
}

impl RecordBatch {
    /// Batch containing the given records and no envelope metadata.
    pub fn of(records: Vec<FeedRecord>) -> Self {
        Self {
            version: None,
            message_type: None,
            records,
        }
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the envelope marks this batch as a full window snapshot.
    pub fn is_initial_dump(&self) -> bool {
        self.message_type.as_deref() == Some(INITIAL_DUMP_TAG)
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch of {} records", self.records.len())
    }
}
