//! Core types for the annotation store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// What kind of slot an annotation target is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Image,
    Note,
}

impl TargetKind {
    /// The backup collection holding records of this kind.
    pub fn collection(self) -> Collection {
        match self {
            TargetKind::Image => Collection::Images,
            TargetKind::Note => Collection::Notes,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Image => f.write_str("image"),
            TargetKind::Note => f.write_str("note"),
        }
    }
}

/// Improvement priority. "None" is modeled as an absent value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::P1, Priority::P2, Priority::P3];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "P1" | "p1" => Ok(Priority::P1),
            "P2" | "p2" => Ok(Priority::P2),
            "P3" | "p3" => Ok(Priority::P3),
            other => Err(format!("unknown priority: {other:?}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated effort. "None" is modeled as an absent value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effort {
    S,
    M,
    L,
}

impl Effort {
    pub const ALL: [Effort; 3] = [Effort::S, Effort::M, Effort::L];

    pub fn as_str(self) -> &'static str {
        match self {
            Effort::S => "S",
            Effort::M => "M",
            Effort::L => "L",
        }
    }
}

impl FromStr for Effort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "S" | "s" => Ok(Effort::S),
            "M" | "m" => Ok(Effort::M),
            "L" | "l" => Ok(Effort::L),
            other => Err(format!("unknown effort: {other:?}")),
        }
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named collections in the backup store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Images,
    Notes,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Images, Collection::Notes];

    /// Directory name of the collection.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Images => "images",
            Collection::Notes => "notes",
        }
    }

    /// Schema version that first created this collection.
    pub fn introduced_in(self) -> u8 {
        match self {
            Collection::Images => 1,
            Collection::Notes => 2,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A record that lives in one backup collection under a string key.
pub trait CollectionRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn key(&self) -> &str;
}

/// A pasted image attached to an image slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Derived target key.
    pub id: String,

    /// Encoded image (`data:<mime>;base64,...`).
    pub data: String,

    /// When the image was saved.
    #[serde(rename = "timestamp")]
    pub saved_at: Timestamp,
}

impl CollectionRecord for ImageRecord {
    const COLLECTION: Collection = Collection::Images;

    fn key(&self) -> &str {
        &self.id
    }
}

/// Improvement note attached to a note slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    /// Derived target key.
    pub id: String,

    pub content: String,

    #[serde(default)]
    pub priority: Option<Priority>,

    #[serde(default)]
    pub effort: Option<Effort>,
}

impl CollectionRecord for NoteRecord {
    const COLLECTION: Collection = Collection::Notes;

    fn key(&self) -> &str {
        &self.id
    }
}

/// Backup store counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub open_attempts: u64,
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
    pub clears: u64,
}

impl StoreStats {
    /// Total record-level calls (get/put/delete/clear).
    pub fn total_calls(&self) -> u64 {
        self.gets + self.puts + self.deletes + self.clears
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse() {
        assert_eq!("P1".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!(" p3 ".parse::<Priority>().unwrap(), Priority::P3);
        assert!("P9".parse::<Priority>().is_err());
        assert!("".parse::<Priority>().is_err());
    }

    #[test]
    fn test_effort_parse() {
        assert_eq!("M".parse::<Effort>().unwrap(), Effort::M);
        assert!("XL".parse::<Effort>().is_err());
    }

    #[test]
    fn test_collection_schema_versions() {
        assert_eq!(Collection::Images.introduced_in(), 1);
        assert_eq!(Collection::Notes.introduced_in(), 2);
        assert_eq!(TargetKind::Note.collection(), Collection::Notes);
    }

    #[test]
    fn test_image_record_field_names() {
        let record = ImageRecord {
            id: "home-1920x1080-layout-0".into(),
            data: "data:image/png;base64,AAAA".into(),
            saved_at: Timestamp(42),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["id"], "home-1920x1080-layout-0");
    }
}
