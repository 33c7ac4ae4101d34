//! Intent record for multi-key operations.
//!
//! The store cannot commit several keys at once, so a recursive rename or delete first
//! stores what it is about to do. If the process dies halfway, the record survives and
//! the next startup rolls the operation forward.

use serde::{Deserialize, Serialize};

use crate::core::{KvStore, StoreResult};
use crate::error::{VfsError, VfsResult};

const INTENT_SUFFIX: &str = "#intent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum Intent {
    Rename { from: String, to: String },
    Delete { path: String },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Rename { .. } => "rename",
            Intent::Delete { .. } => "delete",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Intent::Rename { from, .. } => from,
            Intent::Delete { path } => path,
        }
    }
}

/// Storage key of the intent record. Never starts with `namespace + "/"`, so it is
/// invisible to path scans.
pub(crate) fn key(namespace: &str) -> String {
    format!("{namespace}{INTENT_SUFFIX}")
}

pub(crate) fn record<S: KvStore>(store: &mut S, namespace: &str, intent: &Intent) -> VfsResult<()> {
    let value = serde_json::to_string(intent)?;
    store
        .set(&key(namespace), &value)
        .map_err(|e| VfsError::from_store(e, intent.path()))
}

/// Returns the pending intent, if any. An unreadable record is discarded.
pub(crate) fn pending<S: KvStore>(store: &S, namespace: &str) -> StoreResult<Option<Intent>> {
    let Some(raw) = store.get(&key(namespace))? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(intent) => Ok(Some(intent)),
        Err(e) => {
            tracing::warn!("discarding unreadable intent record: {}", e);
            Ok(None)
        }
    }
}

pub(crate) fn clear<S: KvStore>(store: &mut S, namespace: &str) -> StoreResult<()> {
    store.remove(&key(namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapStore;

    #[test]
    fn test_record_and_clear() {
        let mut store = MapStore::new();
        let intent = Intent::Rename {
            from: "/a".to_string(),
            to: "/z".to_string(),
        };

        record(&mut store, "vfs:", &intent).unwrap();
        assert_eq!(store.get("vfs:#intent").unwrap().unwrap(), r#"{"op":"rename","from":"/a","to":"/z"}"#);
        assert_eq!(pending(&store, "vfs:").unwrap(), Some(intent));

        clear(&mut store, "vfs:").unwrap();
        assert_eq!(pending(&store, "vfs:").unwrap(), None);
    }

    #[test]
    fn test_unreadable_record_is_ignored() {
        let mut store = MapStore::new();
        store.set("vfs:#intent", "{broken").unwrap();
        assert_eq!(pending(&store, "vfs:").unwrap(), None);
    }

    #[test]
    fn test_namespaces_do_not_share_intents() {
        let mut store = MapStore::new();
        let intent = Intent::Delete {
            path: "/a".to_string(),
        };
        record(&mut store, "one:", &intent).unwrap();
        assert_eq!(pending(&store, "two:").unwrap(), None);
    }
}
