//! Planning: from two graphs to an ordered list of operations.
//!
//! This module handles the comparison between the last applied graph and the
//! desired one, import matching against unmanaged remote objects, and plan
//! construction.

mod diff;
mod import;
mod plan;

pub use diff::{Diff, PropertyDiff, PropertyDiffs, ResourceDiff, compare_maps, compute_diff};
pub use import::{
    ImportCandidate, ImportIndex, NamedRemote, RemoteData, UnmanagedResource, apply_imports,
    mark_importable, match_candidates,
};
pub use plan::{Operation, OperationType, PlanSummary, plan};
