use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::rooms::UserId;

pub const UNKNOWN_VENDOR: &str = "UNKNOWN VENDOR";
pub const DEFAULT_VERIFIER: &str = "Julian";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "amountGBP")]
    pub amount_gbp: f64,
    pub allocation: String,
    pub merchant: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    pub verified_by: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewLedgerEntry {
    pub amount_gbp: f64,
    pub allocation: String,
    pub merchant: Option<String>,
    pub date: String,
    pub scan_id: Option<String>,
    pub verified_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignOutcome {
    Signed(LedgerEntry),
    /// The entry already carried a signature; nothing was changed.
    AlreadySigned(LedgerEntry),
}

impl SignOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            SignOutcome::Signed(entry) | SignOutcome::AlreadySigned(entry) => entry,
        }
    }
}

/// Append-only spend records. Entries are never rewritten except to add a
/// signature once.
pub trait LedgerStore: Send + Sync {
    fn log_spend(&self, user: &UserId, entry: NewLedgerEntry) -> StoreResult<LedgerEntry>;

    fn sign_entry(&self, id: &str, signer: &UserId) -> StoreResult<SignOutcome>;

    fn get_entry(&self, id: &str) -> StoreResult<Option<LedgerEntry>>;

    /// Newest first.
    fn recent(&self, user: &UserId, limit: usize) -> StoreResult<Vec<LedgerEntry>>;
}

type Entries = IndexMap<String, LedgerEntry>;

/// Ledger kept as one JSON object of entries in insertion order.
#[derive(Debug)]
pub struct JsonLedgerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_entries<T>(
        &self,
        write: bool,
        apply: impl FnOnce(&mut Entries) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Poisoned("ledger"))?;
        let mut entries = read_entries(&self.path)?;
        let out = apply(&mut entries)?;
        if write {
            write_entries(&self.path, &entries)?;
        }
        Ok(out)
    }
}

impl LedgerStore for JsonLedgerStore {
    fn log_spend(&self, user: &UserId, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        let record = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user.clone(),
            amount_gbp: entry.amount_gbp,
            allocation: entry.allocation,
            merchant: entry
                .merchant
                .filter(|merchant| !merchant.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_VENDOR.to_string()),
            date: entry.date,
            scan_id: entry.scan_id,
            verified_by: entry
                .verified_by
                .unwrap_or_else(|| DEFAULT_VERIFIER.to_string()),
            created_at: chrono::Utc::now().timestamp_millis(),
            signed_at: None,
            signed_by: None,
        };
        self.with_entries(true, |entries| {
            entries.insert(record.id.clone(), record.clone());
            Ok(())
        })?;
        tracing::info!(
            id = %record.id,
            amount_gbp = record.amount_gbp,
            allocation = %record.allocation,
            "ledger entry logged"
        );
        Ok(record)
    }

    fn sign_entry(&self, id: &str, signer: &UserId) -> StoreResult<SignOutcome> {
        self.with_entries(true, |entries| {
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| StoreError::UnknownEntry(id.to_string()))?;
            if entry.signed_at.is_some() {
                return Ok(SignOutcome::AlreadySigned(entry.clone()));
            }
            entry.signed_at = Some(chrono::Utc::now().timestamp_millis());
            entry.signed_by = Some(signer.as_str().to_string());
            Ok(SignOutcome::Signed(entry.clone()))
        })
    }

    fn get_entry(&self, id: &str) -> StoreResult<Option<LedgerEntry>> {
        self.with_entries(false, |entries| Ok(entries.get(id).cloned()))
    }

    fn recent(&self, user: &UserId, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        self.with_entries(false, |entries| {
            Ok(entries
                .values()
                .rev()
                .filter(|entry| &entry.user_id == user)
                .take(limit)
                .cloned()
                .collect())
        })
    }
}

fn read_entries(path: &Path) -> StoreResult<Entries> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
        Err(err) => return Err(StoreError::io(path, err)),
    };
    if raw.trim().is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

fn write_entries(path: &Path, entries: &Entries) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
    }
    let rendered = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, rendered).map_err(|err| StoreError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend(amount: f64, allocation: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            amount_gbp: amount,
            allocation: allocation.to_string(),
            date: "2026-10-16".to_string(),
            ..NewLedgerEntry::default()
        }
    }

    #[test]
    fn log_spend_applies_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = JsonLedgerStore::new(temp.path().join("ledger.json"));
        let entry = ledger.log_spend(&UserId::guest(), spend(45.0, "Provisions"))?;
        assert_eq!(entry.merchant, UNKNOWN_VENDOR);
        assert_eq!(entry.verified_by, DEFAULT_VERIFIER);
        assert_eq!(ledger.get_entry(&entry.id)?, Some(entry));
        Ok(())
    }

    #[test]
    fn recent_is_newest_first_and_per_user() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = JsonLedgerStore::new(temp.path().join("ledger.json"));
        let guest = UserId::guest();
        ledger.log_spend(&guest, spend(1.0, "first"))?;
        ledger.log_spend(&UserId::new("other"), spend(2.0, "theirs"))?;
        ledger.log_spend(&guest, spend(3.0, "second"))?;
        ledger.log_spend(&guest, spend(4.0, "third"))?;

        let allocations: Vec<String> = ledger
            .recent(&guest, 2)?
            .into_iter()
            .map(|entry| entry.allocation)
            .collect();
        assert_eq!(allocations, vec!["third".to_string(), "second".to_string()]);
        Ok(())
    }

    #[test]
    fn signing_is_one_shot() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = JsonLedgerStore::new(temp.path().join("ledger.json"));
        let entry = ledger.log_spend(&UserId::guest(), spend(10.0, "Fuel"))?;

        let first = ledger.sign_entry(&entry.id, &UserId::new("eleanor"))?;
        assert!(matches!(first, SignOutcome::Signed(_)));
        assert_eq!(first.entry().signed_by.as_deref(), Some("eleanor"));

        let second = ledger.sign_entry(&entry.id, &UserId::new("julian"))?;
        assert!(matches!(second, SignOutcome::AlreadySigned(_)));
        assert_eq!(second.entry().signed_by.as_deref(), Some("eleanor"));
        assert_eq!(second.entry().signed_at, first.entry().signed_at);
        Ok(())
    }

    #[test]
    fn signing_unknown_entry_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = JsonLedgerStore::new(temp.path().join("ledger.json"));
        assert!(matches!(
            ledger.sign_entry("missing", &UserId::guest()),
            Err(StoreError::UnknownEntry(_))
        ));
        Ok(())
    }
}
