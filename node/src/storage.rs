use chainlib::store::{ChainSnapshot, ChainStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Chain + UTXO snapshot persisted as one pretty-printed JSON document
/// with sorted keys.
pub struct JsonChainStore {
    path: PathBuf,
}

impl JsonChainStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonChainStore {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ChainStore for JsonChainStore {
    fn save(&self, snapshot: &ChainSnapshot) -> IoResult<()> {
        // Round-tripping through Value sorts every object's keys
        let value = serde_json::to_value(snapshot)
            .map_err(|_| IoError::new(IoErrorKind::InvalidData, "Failed to serialize snapshot"))?;
        let text = serde_json::to_string_pretty(&value)
            .map_err(|_| IoError::new(IoErrorKind::InvalidData, "Failed to serialize snapshot"))?;
        fs::write(&self.path, text)
    }

    fn load(&self) -> IoResult<Option<ChainSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&text)
            .map_err(|_| IoError::new(IoErrorKind::InvalidData, "Failed to deserialize snapshot"))?;
        Ok(Some(snapshot))
    }
}

#[derive(Serialize, Deserialize, Default)]
struct NodesDoc {
    nodes: Vec<String>,
}

/// The known-peer list file: `{"nodes": ["host:port", ...]}`.
pub struct NodesFile {
    path: PathBuf,
}

impl NodesFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        NodesFile {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> IoResult<Vec<String>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let text = fs::read_to_string(&self.path)?;
        let doc: NodesDoc = serde_json::from_str(&text)
            .map_err(|_| IoError::new(IoErrorKind::InvalidData, "Failed to parse peer list"))?;
        Ok(doc.nodes)
    }

    pub fn save(&self, nodes: &[String]) -> IoResult<()> {
        let mut sorted = nodes.to_vec();
        sorted.sort();
        let doc = NodesDoc { nodes: sorted };
        let text = serde_json::to_string_pretty(&doc)
            .map_err(|_| IoError::new(IoErrorKind::InvalidData, "Failed to serialize peer list"))?;
        fs::write(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlib::types::Chain;

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("node-test-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn test_chain_store_round_trip() {
        let path = temp_path("chain.json");
        let store = JsonChainStore::new(&path);

        let mut chain = Chain::new();
        chain.create_genesis().unwrap();
        store.save(&chain.snapshot()).unwrap();

        let loaded = store.load().unwrap().expect("snapshot saved");
        assert_eq!(loaded.chain, chain.blocks());

        let restored = Chain::restore(loaded.chain);
        assert_eq!(restored.blocks(), chain.blocks());
        assert_eq!(restored.utxo_set(), chain.utxo_set());

        fs::remove_file(path).ok();
    }

    #[test]
    fn test_chain_store_missing_file_is_none() {
        let store = JsonChainStore::new(temp_path("missing-chain.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_nodes_file_round_trip() {
        let path = temp_path("nodes.json");
        let file = NodesFile::new(&path);

        let peers = vec!["127.0.0.1:5001".to_string(), "127.0.0.1:5002".to_string()];
        file.save(&peers).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded, peers);

        fs::remove_file(path).ok();
    }

    #[test]
    fn test_nodes_file_missing_is_empty() {
        let file = NodesFile::new(temp_path("missing-nodes.json"));
        assert!(file.load().unwrap().is_empty());
    }
}
