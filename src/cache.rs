use anyhow::{Context, Result};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_pickle::{DeOptions, SerOptions};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Record synthesized for role keys that were never written: a degenerate
/// near-zero box with zero confidence
pub const DEFAULT_RECORD: [f64; 5] = [0.0, 0.0, 0.1, 0.1, 0.0];

/// Score synthesized for agent keys that were never written
pub const DEFAULT_SCORE: f64 = 0.0;

/// Kind of an action key, decided by its last `_`-delimited segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// `<verb>_agent`
    Agent,
    /// `<verb>_<role>` and anything else
    Role,
}

impl KeyKind {
    /// Classify a key. Only the last segment is compared against `agent`
    pub fn of(key: &str) -> Self {
        match key.rsplit('_').next() {
            Some("agent") => KeyKind::Agent,
            _ => KeyKind::Role,
        }
    }
}

/// Value stored under an action key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheValue {
    /// Confidence that the person performs the action
    Score(f64),
    /// `[x1, y1, x2, y2, score]` for the target of a semantic role
    Record([f64; 5]),
}

impl CacheValue {
    /// Default value synthesized on a read miss
    pub fn default_for(key: &str) -> Self {
        match KeyKind::of(key) {
            KeyKind::Agent => CacheValue::Score(DEFAULT_SCORE),
            KeyKind::Role => CacheValue::Record(DEFAULT_RECORD),
        }
    }

    /// Confidence carried by the value, the last element for records
    pub fn confidence(&self) -> f64 {
        match self {
            CacheValue::Score(score) => *score,
            CacheValue::Record(record) => record[4],
        }
    }

    /// Build a role record from an object box and its score
    pub fn record(bbox: [f64; 4], score: f64) -> Self {
        CacheValue::Record([bbox[0], bbox[1], bbox[2], bbox[3], score])
    }
}

impl Serialize for CacheValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CacheValue::Score(score) => serializer.serialize_f64(*score),
            CacheValue::Record(record) => {
                let mut seq = serializer.serialize_seq(Some(record.len()))?;
                for value in record {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

struct CacheValueVisitor;

impl<'de> Visitor<'de> for CacheValueVisitor {
    type Value = CacheValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a number or a sequence of five numbers")
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<CacheValue, E> {
        Ok(CacheValue::Score(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<CacheValue, E> {
        Ok(CacheValue::Score(value as f64))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<CacheValue, E> {
        Ok(CacheValue::Score(value as f64))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<CacheValue, A::Error> {
        let mut record = [0.0; 5];
        for (i, slot) in record.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| <A::Error as de::Error>::invalid_length(i, &self))?;
        }
        if seq.next_element::<f64>()?.is_some() {
            return Err(<A::Error as de::Error>::invalid_length(6, &self));
        }
        Ok(CacheValue::Record(record))
    }
}

impl<'de> Deserialize<'de> for CacheValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(CacheValueVisitor)
    }
}

/// Per-image action results with default-on-miss reads.
///
/// Reading a key that was never written does not fail: the default for the
/// key's kind is inserted and returned, so the key is present afterwards.
/// Use [`ResultCache::peek`] for a lookup without that side effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCache {
    entries: BTreeMap<String, CacheValue>,
}

impl ResultCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-populated with the given entries. Keys are not validated
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, CacheValue)>,
    {
        entries.into_iter().collect()
    }

    /// Read a key, storing and returning its default on a miss
    pub fn get(&mut self, key: &str) -> CacheValue {
        if let Some(value) = self.entries.get(key) {
            return *value;
        }
        let value = CacheValue::default_for(key);
        self.entries.insert(key.to_string(), value);
        value
    }

    /// Read a key without synthesizing a default
    pub fn peek(&self, key: &str) -> Option<&CacheValue> {
        self.entries.get(key)
    }

    /// Insert or overwrite a value
    pub fn set(&mut self, key: impl Into<String>, value: CacheValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheValue)> {
        self.entries.iter()
    }

    /// Serialize the cache as a pickled dict
    pub fn to_pickle(&self) -> Result<Vec<u8>> {
        serde_pickle::to_vec(self, SerOptions::new()).context("Failed to pickle result cache")
    }

    /// Restore a cache from a pickled dict
    pub fn from_pickle(bytes: &[u8]) -> Result<Self> {
        serde_pickle::from_slice(bytes, DeOptions::new())
            .context("Failed to unpickle result cache")
    }
}

impl<K: Into<String>> FromIterator<(K, CacheValue)> for ResultCache {
    fn from_iter<I: IntoIterator<Item = (K, CacheValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Persisted artifact for the external V-COCO evaluator: image id to result cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultArtifact {
    images: BTreeMap<u64, ResultCache>,
}

impl ResultArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the cache of an image, replacing any previous one
    pub fn insert(&mut self, image_id: u64, cache: ResultCache) {
        self.images.insert(image_id, cache);
    }

    pub fn get(&self, image_id: u64) -> Option<&ResultCache> {
        self.images.get(&image_id)
    }

    /// Cache of an image, created empty if absent
    pub fn entry(&mut self, image_id: u64) -> &mut ResultCache {
        self.images.entry(image_id).or_default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &ResultCache)> {
        self.images.iter()
    }

    /// Total number of action entries across all images
    pub fn total_entries(&self) -> usize {
        self.images.values().map(ResultCache::len).sum()
    }

    /// Serialize the artifact as a pickled dict of dicts
    pub fn to_pickle(&self) -> Result<Vec<u8>> {
        serde_pickle::to_vec(self, SerOptions::new()).context("Failed to pickle result artifact")
    }

    pub fn from_pickle(bytes: &[u8]) -> Result<Self> {
        serde_pickle::from_slice(bytes, DeOptions::new())
            .context("Failed to unpickle result artifact")
    }

    /// Write the pickled artifact, creating parent directories as needed
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_pickle()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write artifact to: {}", path.display()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
        Self::from_pickle(&bytes).with_context(|| format!("Invalid artifact: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_kind() {
        assert_eq!(KeyKind::of("run_agent"), KeyKind::Agent);
        assert_eq!(KeyKind::of("talk_on_phone_agent"), KeyKind::Agent);
        assert_eq!(KeyKind::of("hit_instr"), KeyKind::Role);
        assert_eq!(KeyKind::of("agent_obj"), KeyKind::Role);
        assert_eq!(KeyKind::of("run"), KeyKind::Role);
        assert_eq!(KeyKind::of("run_Agent"), KeyKind::Role);
        assert_eq!(KeyKind::of(""), KeyKind::Role);
    }

    #[test]
    fn test_agent_default_is_stable() {
        let mut cache = ResultCache::new();
        assert_eq!(cache.get("run_agent"), CacheValue::Score(0.0));
        assert_eq!(cache.get("run_agent"), CacheValue::Score(0.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_role_default() {
        let mut cache = ResultCache::new();
        assert_eq!(
            cache.get("cut_instr"),
            CacheValue::Record([0.0, 0.0, 0.1, 0.1, 0.0])
        );
    }

    #[test]
    fn test_key_without_underscore_gets_record() {
        let mut cache = ResultCache::new();
        assert_eq!(cache.get("stand"), CacheValue::Record(DEFAULT_RECORD));
    }

    #[test]
    fn test_miss_inserts_key() {
        let mut cache = ResultCache::new();
        assert!(!cache.contains_key("eat_obj"));
        assert!(cache.peek("eat_obj").is_none());

        cache.get("eat_obj");
        assert!(cache.contains_key("eat_obj"));
        assert_eq!(cache.peek("eat_obj"), Some(&CacheValue::Record(DEFAULT_RECORD)));
    }

    #[test]
    fn test_set_then_get_ignores_suffix() {
        let mut cache = ResultCache::new();
        cache.set("run_agent", CacheValue::Record([1.0, 2.0, 3.0, 4.0, 0.5]));
        cache.set("hit_obj", CacheValue::Score(0.25));

        assert_eq!(
            cache.get("run_agent"),
            CacheValue::Record([1.0, 2.0, 3.0, 4.0, 0.5])
        );
        assert_eq!(cache.get("hit_obj"), CacheValue::Score(0.25));
    }

    #[test]
    fn test_from_entries() {
        let cache = ResultCache::from_entries([
            ("ride_agent", CacheValue::Score(0.7)),
            ("ride_instr", CacheValue::record([1.0, 1.0, 5.0, 5.0], 0.7)),
        ]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek("ride_agent"), Some(&CacheValue::Score(0.7)));
    }

    #[test]
    fn test_confidence() {
        assert_eq!(CacheValue::Score(0.3).confidence(), 0.3);
        assert_eq!(CacheValue::record([0.0, 0.0, 1.0, 1.0], 0.6).confidence(), 0.6);
    }

    #[test]
    fn test_cache_pickle_round_trip() {
        let mut cache = ResultCache::new();
        cache.set("jump_agent", CacheValue::Score(0.9));
        cache.set("jump_instr", CacheValue::record([10.0, 20.0, 30.0, 40.0], 0.9));
        cache.get("sit_agent");
        cache.get("sit_instr");

        let bytes = cache.to_pickle().unwrap();
        let restored = ResultCache::from_pickle(&bytes).unwrap();
        assert_eq!(restored, cache);
    }

    #[test]
    fn test_record_pickles_as_list() {
        let cache = ResultCache::from_entries([(
            "kick_obj",
            CacheValue::Record([1.0, 2.0, 3.0, 4.0, 0.5]),
        )]);
        let bytes = cache.to_pickle().unwrap();

        let value: serde_pickle::Value =
            serde_pickle::value_from_slice(&bytes, DeOptions::new()).unwrap();
        match value {
            serde_pickle::Value::Dict(dict) => {
                let key = serde_pickle::HashableValue::String("kick_obj".to_string());
                match dict.get(&key) {
                    Some(serde_pickle::Value::List(items)) => assert_eq!(items.len(), 5),
                    other => panic!("unexpected record encoding: {:?}", other),
                }
            }
            other => panic!("unexpected cache encoding: {:?}", other),
        }
    }

    #[test]
    fn test_unpickle_rejects_short_record() {
        let bytes = serde_pickle::to_vec(
            &BTreeMap::from([("kick_obj".to_string(), vec![1.0, 2.0])]),
            SerOptions::new(),
        )
        .unwrap();
        assert!(ResultCache::from_pickle(&bytes).is_err());
    }

    #[test]
    fn test_end_to_end() {
        let mut cache = ResultCache::new();
        assert_eq!(cache.get("run_agent"), CacheValue::Score(0.0));
        assert_eq!(
            cache.get("run_obj"),
            CacheValue::Record([0.0, 0.0, 0.1, 0.1, 0.0])
        );
        cache.set("run_obj", CacheValue::Record([1.0, 2.0, 3.0, 4.0, 0.9]));
        assert_eq!(
            cache.get("run_obj"),
            CacheValue::Record([1.0, 2.0, 3.0, 4.0, 0.9])
        );

        let mut artifact = ResultArtifact::new();
        artifact.insert(42, cache.clone());
        let restored = ResultArtifact::from_pickle(&artifact.to_pickle().unwrap()).unwrap();

        let restored_cache = restored.get(42).unwrap();
        assert_eq!(restored_cache, &cache);
        assert_eq!(restored_cache.peek("run_agent"), Some(&CacheValue::Score(0.0)));
        assert_eq!(
            restored_cache.peek("run_obj"),
            Some(&CacheValue::Record([1.0, 2.0, 3.0, 4.0, 0.9]))
        );
    }

    #[test]
    fn test_artifact_write_and_read() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("cache.pkl");

        let mut artifact = ResultArtifact::new();
        artifact.entry(1).set("hold_obj", CacheValue::record([0.0, 0.0, 2.0, 2.0], 0.4));
        artifact.entry(1).get("hold_agent");
        artifact.entry(7).get("smile_agent");

        artifact.write(&path).unwrap();
        assert!(path.exists());

        let restored = ResultArtifact::read(&path).unwrap();
        assert_eq!(restored, artifact);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.total_entries(), 3);
    }

    #[test]
    fn test_artifact_read_missing_file() {
        let temp_dir = tempdir().unwrap();
        let result = ResultArtifact::read(&temp_dir.path().join("absent.pkl"));
        assert!(result.is_err());
    }
}
