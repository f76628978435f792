use std::collections::HashMap;

use crate::storage::{Cid, ItemPointer, TxnId, MAX_CID};

use super::rw_type::{ResultType, RwType};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Per-transaction context: snapshot id and the versions it wrote.
///
/// Created by `TransactionManager::begin_transaction`; finished through
/// `commit_transaction` or `abort_transaction`.
#[derive(Debug)]
pub struct Transaction {
    txn_id: TxnId,
    /// Snapshot: versions committed at or before this id are visible
    read_id: Cid,
    commit_id: Cid,
    /// Write set keyed by the version the operation applied to
    rw_set: HashMap<ItemPointer, RwType>,
    result: ResultType,
    state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(txn_id: TxnId, read_id: Cid) -> Self {
        Self {
            txn_id,
            read_id,
            commit_id: MAX_CID,
            rw_set: HashMap::new(),
            result: ResultType::Success,
            state: TransactionState::Active,
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn read_id(&self) -> Cid {
        self.read_id
    }

    /// Commit id, `MAX_CID` until committed.
    pub fn commit_id(&self) -> Cid {
        self.commit_id
    }

    pub(crate) fn set_commit_id(&mut self, cid: Cid) {
        self.commit_id = cid;
    }

    pub fn rw_type(&self, location: &ItemPointer) -> Option<RwType> {
        self.rw_set.get(location).copied()
    }

    pub fn rw_set(&self) -> &HashMap<ItemPointer, RwType> {
        &self.rw_set
    }

    pub(crate) fn take_rw_set(&mut self) -> HashMap<ItemPointer, RwType> {
        std::mem::take(&mut self.rw_set)
    }

    pub(crate) fn record_insert(&mut self, location: ItemPointer) {
        self.rw_set.insert(location, RwType::Insert);
    }

    /// Records an update of a committed version. Re-updating is a no-op.
    pub(crate) fn record_update(&mut self, location: ItemPointer) {
        self.rw_set.entry(location).or_insert(RwType::Update);
    }

    /// Records a delete; deleting an own insert turns it into `InsDel`.
    pub(crate) fn record_delete(&mut self, location: ItemPointer) {
        let next = match self.rw_set.get(&location) {
            Some(RwType::Insert) | Some(RwType::InsDel) => RwType::InsDel,
            _ => RwType::Delete,
        };
        self.rw_set.insert(location, next);
    }

    pub fn result(&self) -> ResultType {
        self.result
    }

    pub(crate) fn set_result(&mut self, result: ResultType) {
        self.result = result;
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    pub fn is_committed(&self) -> bool {
        self.state == TransactionState::Committed
    }

    pub fn is_aborted(&self) -> bool {
        self.state == TransactionState::Aborted
    }

    /// Returns `true` if the transaction wrote anything.
    pub fn has_writes(&self) -> bool {
        !self.rw_set.is_empty()
    }
}
