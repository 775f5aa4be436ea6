use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A stored trend entry. Immutable once upserted.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// Record payload. Keywords are stored as one comma-joined string in every
/// backing store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(
        default,
        serialize_with = "serialize_keywords",
        deserialize_with = "deserialize_keywords"
    )]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub text: String,
}

impl RecordMetadata {
    pub fn new(keywords: &str, text: impl Into<String>) -> Self {
        Self {
            keywords: split_keywords(keywords),
            text: text.into(),
        }
    }

    pub fn joined_keywords(&self) -> String {
        self.keywords.join(", ")
    }
}

/// One similarity match. Scores follow the store's metric (cosine: -1..1).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

/// Split a comma-joined keyword string, trimming tokens and dropping empties.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn serialize_keywords<S: Serializer>(keywords: &[String], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&keywords.join(", "))
}

fn deserialize_keywords<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(d)? {
        Some(Raw::Joined(s)) => split_keywords(&s),
        Some(Raw::List(list)) => list
            .iter()
            .flat_map(|k| split_keywords(k))
            .collect(),
        None => Vec::new(),
    })
}
