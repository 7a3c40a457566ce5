//! Shared data models.

pub mod lab;
pub mod query;

// Re-export commonly used types
pub use lab::{Branch, BranchInput, Doctor, DoctorInput, Patient, PatientInput};
pub use query::{
    DegradeReason, Degraded, QueryInvocation, QueryOutcome, QueryRequest, QueryResult, Row,
    StatementKind, WriteAck,
};
