//! Core logging types: summary entries and their status.

/// Operation result for summary reporting.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    /// Human-readable operation name.
    pub name: String,
    /// Final status of the operation.
    pub status: TaskStatus,
    /// Optional detail message (e.g., counts or error description).
    pub message: Option<String>,
}

/// Status of a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Operation completed successfully.
    Ok,
    /// Operation had nothing to do (e.g. compiled cache already fresh).
    Skipped,
    /// Operation ran in dry-run mode; no changes were applied.
    DryRun,
    /// Operation finished with partial success: some files failed.
    Partial,
    /// Operation encountered an error and could not complete.
    Failed,
}
