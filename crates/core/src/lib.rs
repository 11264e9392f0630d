pub mod audit;
pub mod clock;
pub mod code;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{generate_code, generate_unique_code, is_well_formed, parse_code};
pub use domain::approval::{
    ApprovalCode, ApprovalId, ApprovalRecord, ApprovalStatus, Decision, NewApproval, Party,
    UserSnapshot,
};
pub use errors::{ApprovalError, ErrorKind};
