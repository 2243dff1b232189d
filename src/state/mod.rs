//! Account state: guarded ownership of every position record
//!
//! All position reads and writes go through [`AccountState`]. Reads return
//! snapshots, never live references; writes are applied under a single
//! writer lock and written through to the [`StateStore`].

mod position;
mod store;

pub use position::{Position, PositionStatus, TriggerSide};
pub use store::{AccountDocument, FileStore, StateStore};

use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory per-(account, symbol) position records with write-through
/// persistence.
///
/// The in-memory copy is the source of truth for the session; persistence
/// failures are logged and do not fail the mutation. State is reconciled
/// against the exchange on restart via the user stream.
pub struct AccountState {
    store: Arc<dyn StateStore>,
    inner: RwLock<HashMap<String, AccountDocument>>,
}

impl AccountState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Load the persisted document for an account and create idle positions
    /// for any configured symbol it does not yet track. Persists once if
    /// anything was new.
    pub async fn initialize(&self, account: &str, symbols: &[String]) -> Result<()> {
        let mut doc = match self.store.load(account).await {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(account, error = %e, "failed to load persisted state, starting fresh");
                AccountDocument::default()
            }
        };

        let mut created = false;
        for symbol in symbols {
            if !doc.positions.contains_key(symbol) {
                doc.positions.insert(symbol.clone(), Position::idle());
                created = true;
            }
        }

        if created {
            if let Err(e) = self.store.save(account, &doc).await {
                tracing::warn!(account, error = %e, "failed to persist initialized state");
            }
        }

        let mut inner = self.inner.write().await;
        inner.insert(account.to_string(), doc);
        Ok(())
    }

    /// Snapshot of one position; `None` when the key is untracked
    pub async fn get_position(&self, account: &str, symbol: &str) -> Option<Position> {
        let inner = self.inner.read().await;
        inner
            .get(account)
            .and_then(|doc| doc.positions.get(symbol))
            .cloned()
    }

    /// Apply a mutation to one position and write the document through to
    /// the store. Returns the post-mutation snapshot.
    ///
    /// If the mutation leaves the record violating its invariants, the
    /// position is forced back to cleared idle, persisted, and an
    /// `InvariantViolation` is returned so the caller can reconcile
    /// against the exchange.
    pub async fn update_position<F>(&self, account: &str, symbol: &str, mutate: F) -> Result<Position>
    where
        F: FnOnce(&mut Position),
    {
        let (snapshot, doc, violation) = {
            let mut inner = self.inner.write().await;
            let doc = inner
                .get_mut(account)
                .ok_or_else(|| EngineError::UnknownSymbol(format!("{account}/{symbol}")))?;
            let position = doc
                .positions
                .get_mut(symbol)
                .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))?;

            mutate(position);

            let violation = match position.check_invariants() {
                Ok(()) => None,
                Err(detail) => {
                    tracing::error!(account, symbol, detail, "position invariant violated, forcing idle");
                    position.clear();
                    Some(detail)
                }
            };
            (position.clone(), doc.clone(), violation)
        };

        if let Err(e) = self.store.save(account, &doc).await {
            tracing::warn!(account, symbol, error = %e, "state save failed, keeping in-memory state");
        }

        match violation {
            Some(detail) => Err(EngineError::InvariantViolation {
                account: account.to_string(),
                symbol: symbol.to_string(),
                detail,
            }),
            None => Ok(snapshot),
        }
    }

    /// Arm a position around a lock price unless it is already entering or
    /// open. Returns the updated snapshot when the account was armed.
    pub async fn arm_if_eligible(
        &self,
        account: &str,
        symbol: &str,
        lock_close_price: Decimal,
        movement_threshold: Decimal,
    ) -> Result<Option<Position>> {
        let current = self
            .get_position(account, symbol)
            .await
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))?;
        if matches!(
            current.status,
            PositionStatus::Entering | PositionStatus::Open
        ) {
            return Ok(None);
        }

        let updated = self
            .update_position(account, symbol, |p| {
                p.status = PositionStatus::Armed;
                p.lock_close_price = Some(lock_close_price);
                p.movement_threshold = Some(movement_threshold);
                p.triggers.clear();
                p.stop_prices.clear();
            })
            .await?;
        Ok(Some(updated))
    }

    /// Reset a position to fully cleared idle (exchange reported flat)
    pub async fn reset_to_idle(&self, account: &str, symbol: &str) -> Result<Position> {
        self.update_position(account, symbol, |p| p.clear()).await
    }
}
