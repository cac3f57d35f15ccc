mod conflicts;
mod dispatcher;
mod gate;

pub use conflicts::{
    detect_conflicts, ApplicantConflict, ConflictApplication, ConflictImpact, ConflictReport,
};
pub use dispatcher::{
    BulkSendOutcome, BulkSendReport, BulkSendRequest, DispatchError, NotificationDispatcher,
    NotificationEligibility, SingleSendReceipt, SkipReason, SkippedRecord,
};
pub use gate::{can_notify, BlockReason, GateDecision};
