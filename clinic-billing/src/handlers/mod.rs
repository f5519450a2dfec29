//! HTTP handlers for clinic-billing.

pub mod health;
pub mod patients;
pub mod sessions;
