//! Clinic Billing - treatment and pharmacy bill composition for the clinic POS.

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

use services::BillingService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(billing: Arc<BillingService>) -> Self {
        Self { billing }
    }
}
