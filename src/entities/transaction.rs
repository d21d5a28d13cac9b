use crate::{NuGetError, NuGetProjectAction, PackageIdentity};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for TransactionId {
    type Error = NuGetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let uuid = Uuid::parse_str(value)
            .map_err(|e| NuGetError::invalid_argument(format!("Invalid transaction ID: {}", e)))?;
        Ok(Self(uuid))
    }
}

/// An action that was applied to the project, with enough data to invert it.
#[derive(Debug, Clone)]
pub struct AppliedAction {
    pub action: NuGetProjectAction,
    pub applied_at: DateTime<Utc>,
}

/// Ordered record of applied actions plus the package directories queued for deletion.
///
/// Deletions are only performed once the whole batch, including any rollback, is over.
#[derive(Debug)]
pub struct TransactionLog {
    id: TransactionId,
    started_at: DateTime<Utc>,
    applied: Vec<AppliedAction>,
    pending_deletions: BTreeSet<PackageIdentity>,
    extracted: BTreeSet<PackageIdentity>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            started_at: Utc::now(),
            applied: Vec::new(),
            pending_deletions: BTreeSet::new(),
            extracted: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record(&mut self, action: NuGetProjectAction) {
        self.applied.push(AppliedAction {
            action,
            applied_at: Utc::now(),
        });
    }

    /// Pops the most recently applied action.
    pub fn pop(&mut self) -> Option<AppliedAction> {
        self.applied.pop()
    }

    pub fn applied(&self) -> &[AppliedAction] {
        &self.applied
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn queue_deletion(&mut self, identity: PackageIdentity) {
        self.pending_deletions.insert(identity);
    }

    pub fn cancel_deletion(&mut self, identity: &PackageIdentity) {
        self.pending_deletions.remove(identity);
    }

    pub fn is_deletion_queued(&self, identity: &PackageIdentity) -> bool {
        self.pending_deletions.contains(identity)
    }

    /// Packages this batch added to the packages folder.
    pub fn mark_extracted(&mut self, identity: PackageIdentity) {
        self.extracted.insert(identity);
    }

    pub fn was_extracted(&self, identity: &PackageIdentity) -> bool {
        self.extracted.contains(identity)
    }

    pub fn take_deletions(&mut self) -> Vec<PackageIdentity> {
        std::mem::take(&mut self.pending_deletions)
            .into_iter()
            .collect()
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_returns_reverse_order() {
        let mut log = TransactionLog::new();
        log.record(NuGetProjectAction::uninstall(
            PackageIdentity::parse("A", "1.0").unwrap(),
        ));
        log.record(NuGetProjectAction::uninstall(
            PackageIdentity::parse("B", "1.0").unwrap(),
        ));

        assert_eq!(log.pop().unwrap().action.identity().id.as_str(), "B");
        assert_eq!(log.pop().unwrap().action.identity().id.as_str(), "A");
        assert!(log.pop().is_none());
    }

    #[test]
    fn test_cancelled_deletion_is_not_taken() {
        let mut log = TransactionLog::new();
        let a = PackageIdentity::parse("A", "1.0").unwrap();
        let b = PackageIdentity::parse("B", "1.0").unwrap();
        log.queue_deletion(a.clone());
        log.queue_deletion(b.clone());
        log.cancel_deletion(&a);

        assert_eq!(log.take_deletions(), vec![b]);
        assert!(!log.is_deletion_queued(&a));
    }

    #[test]
    fn test_transaction_id_round_trips_through_str() {
        let id = TransactionId::new();
        let parsed = TransactionId::try_from(id.to_string().as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(TransactionId::try_from("not-a-uuid").is_err());
    }
}
