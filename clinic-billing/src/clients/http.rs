//! HTTP client for the clinic backend REST API.

use super::{BillingStore, CatalogService, CreditSalesService, PatientService, WalkinService};
use crate::config::ClinicApiConfig;
use crate::models::{
    Branch, CreditSaleRecord, Doctor, ItemType, MedicineStock, NewPatient, NewPharmacySale,
    NewTreatmentBill, Patient, PharmacySaleRecord, TreatmentBillRecord, TreatmentCatalogEntry,
    Walkin, WALKIN_WAITING,
};
use crate::services::metrics::BACKEND_REQUEST_DURATION;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use service_core::middleware::current_request_id;
use service_core::observability::inject_trace_headers;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Item type name under which treatments are kept in the item master.
pub const TREATMENT_ITEM_TYPE: &str = "Treatment";

#[derive(Clone)]
pub struct ClinicApiClient {
    client: Client,
    base_url: String,
    token: Option<Secret<String>>,
}

impl ClinicApiClient {
    pub fn new(config: &ClinicApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build clinic API client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .headers(inject_trace_headers(current_request_id().as_deref()));

        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and check the status, timing it under `operation`.
    async fn send(&self, operation: &'static str, builder: RequestBuilder) -> Result<reqwest::Response> {
        let timer = BACKEND_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let response = builder
            .send()
            .await
            .with_context(|| format!("{} request failed", operation));
        timer.observe_duration();

        let response = response?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(operation = operation, status = %status, "Clinic backend returned an error");
            anyhow::bail!("clinic backend returned {}: {}", status, body);
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, operation: &'static str, path: &str) -> Result<T> {
        let response = self
            .send(operation, self.request(Method::GET, path))
            .await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse {} response", operation))
    }
}

#[async_trait]
impl CatalogService for ClinicApiClient {
    #[instrument(skip(self))]
    async fn list_treatments(&self) -> Result<Vec<TreatmentCatalogEntry>> {
        let (item_types, items) = futures::try_join!(
            self.fetch::<Vec<ItemType>>("list_item_types", "/item-types"),
            self.fetch::<Vec<TreatmentCatalogEntry>>("list_item_master", "/item-master"),
        )?;

        let Some(treatment_type) = item_types
            .into_iter()
            .find(|item_type| item_type.name == TREATMENT_ITEM_TYPE)
        else {
            debug!("No treatment item type configured");
            return Ok(Vec::new());
        };

        Ok(items
            .into_iter()
            .filter(|item| item.item_type_id.as_deref() == Some(treatment_type.id.as_str()))
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_medicines(&self, branch_id: Option<&str>) -> Result<Vec<MedicineStock>> {
        let stock: Vec<MedicineStock> = self.fetch("list_pharmacy_stock", "/pharmacy-stock").await?;

        Ok(match branch_id {
            Some(branch) => stock
                .into_iter()
                .filter(|medicine| {
                    medicine
                        .branch_id
                        .as_deref()
                        .map_or(true, |stock_branch| stock_branch == branch)
                })
                .collect(),
            None => stock,
        })
    }

    #[instrument(skip(self))]
    async fn list_branches(&self) -> Result<Vec<Branch>> {
        self.fetch("list_branches", "/branches").await
    }

    #[instrument(skip(self))]
    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        self.fetch("list_doctors", "/doctors").await
    }
}

#[async_trait]
impl PatientService for ClinicApiClient {
    #[instrument(skip(self))]
    async fn list_patients(&self) -> Result<Vec<Patient>> {
        self.fetch("list_patients", "/patients").await
    }

    #[instrument(skip(self, patient), fields(patient_name = %patient.name))]
    async fn create_patient(&self, patient: &NewPatient) -> Result<Patient> {
        let response = self
            .send(
                "create_patient",
                self.request(Method::POST, "/patients").json(patient),
            )
            .await?;
        response
            .json()
            .await
            .context("Failed to parse create_patient response")
    }
}

#[async_trait]
impl BillingStore for ClinicApiClient {
    #[instrument(skip(self, bill), fields(patient_id = %bill.patient_id, temporary = bill.is_temporary))]
    async fn create_treatment_bill(&self, bill: &NewTreatmentBill) -> Result<TreatmentBillRecord> {
        let response = self
            .send(
                "create_treatment_bill",
                self.request(Method::POST, "/bills").json(bill),
            )
            .await?;
        response
            .json()
            .await
            .context("Failed to parse create_treatment_bill response")
    }

    #[instrument(skip(self))]
    async fn list_treatment_bills(&self) -> Result<Vec<TreatmentBillRecord>> {
        self.fetch("list_treatment_bills", "/bills").await
    }

    #[instrument(skip(self))]
    async fn delete_treatment_bill(&self, bill_id: &str) -> Result<()> {
        self.send(
            "delete_treatment_bill",
            self.request(Method::DELETE, &format!("/bills/{}", bill_id)),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, sale), fields(patient_id = %sale.patient_id))]
    async fn create_pharmacy_sale(&self, sale: &NewPharmacySale) -> Result<PharmacySaleRecord> {
        let response = self
            .send(
                "create_pharmacy_sale",
                self.request(Method::POST, "/pharmacy-sales").json(sale),
            )
            .await?;
        response
            .json()
            .await
            .context("Failed to parse create_pharmacy_sale response")
    }

    #[instrument(skip(self))]
    async fn list_pharmacy_sales(&self) -> Result<Vec<PharmacySaleRecord>> {
        self.fetch("list_pharmacy_sales", "/pharmacy-sales").await
    }
}

#[async_trait]
impl CreditSalesService for ClinicApiClient {
    #[instrument(skip(self))]
    async fn list_credit_sales(&self) -> Result<Vec<CreditSaleRecord>> {
        self.fetch("list_credit_sales", "/credit-sales").await
    }
}

#[async_trait]
impl WalkinService for ClinicApiClient {
    #[instrument(skip(self))]
    async fn list_waiting_walkins(&self, branch_id: &str) -> Result<Vec<Walkin>> {
        let request = self
            .request(Method::GET, "/walkins")
            .query(&[("branch_id", branch_id), ("status", WALKIN_WAITING)]);
        let response = self.send("list_walkins", request).await?;
        response
            .json()
            .await
            .context("Failed to parse list_walkins response")
    }
}
