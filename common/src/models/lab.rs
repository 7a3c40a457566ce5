//! Laboratory catalog models.
//!
//! Row shapes for the `patients`, `doctors` and `branches` tables and the
//! request bodies used to create or update them. Dates travel as strings in
//! the `YYYY-MM-DD` form the row decoder produces.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// A patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: Option<String>,
}

/// Body for creating or updating a patient.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PatientInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub address: Option<String>,
}

/// A referring doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Referral commission in percent.
    pub commission: Option<f64>,
}

/// Body for creating or updating a doctor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DoctorInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub specialty: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(range(min = 0.0, max = 100.0, message = "Commission must be 0-100"))]
    pub commission: Option<f64>,
}

/// A laboratory branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Body for creating or updating a branch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BranchInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub address: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}
