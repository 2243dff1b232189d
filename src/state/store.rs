//! State persistence port and JSON file implementation

use super::Position;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Per-account persisted document: positions keyed by symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountDocument {
    #[serde(default)]
    pub positions: BTreeMap<String, Position>,
}

/// Port for loading and saving account state documents.
///
/// The in-memory state is the source of truth during a session; a failed
/// save is logged and the mutation stands.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, account: &str) -> anyhow::Result<Option<AccountDocument>>;
    async fn save(&self, account: &str, doc: &AccountDocument) -> anyhow::Result<()>;
}

/// JSON file store, one file per account at `account-data-<name>.json`.
///
/// The on-disk shape nests the document under the account name:
/// `{ "<account>": { "positions": { .. } } }`. Writes go through a temp
/// file and rename so a crashed save never truncates the previous state.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, account: &str) -> PathBuf {
        self.dir.join(format!("account-data-{account}.json"))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self, account: &str) -> anyhow::Result<Option<AccountDocument>> {
        let path = self.path_for(account);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let mut wrapper: HashMap<String, AccountDocument> = serde_json::from_str(&content)?;
        Ok(wrapper.remove(account))
    }

    async fn save(&self, account: &str, doc: &AccountDocument) -> anyhow::Result<()> {
        let mut wrapper = HashMap::new();
        wrapper.insert(account.to_string(), doc);
        let content = serde_json::to_string_pretty(&wrapper)?;

        let path = self.path_for(account);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
