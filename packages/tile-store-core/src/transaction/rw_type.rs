/// What a transaction did to a tuple version it recorded in its write set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RwType {
    /// Inserted a new row
    Insert,
    /// Replaced this committed version with a newer one
    Update,
    /// Ended this committed version with a tombstone
    Delete,
    /// Inserted and then deleted the row in the same transaction
    InsDel,
}

/// Outcome reported by or to the transaction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultType {
    Success,
    /// An operation failed; commit will abort instead
    Failure,
    Aborted,
}

/// Result of a visibility check on one tuple version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityType {
    /// Not part of the transaction's snapshot; keep walking the chain
    Invisible,
    /// The row is deleted as far as the transaction can see
    Deleted,
    /// This is the version the transaction reads
    Ok,
}
