//! Postal-code enrichment.
//!
//! `AddressLookup` is the seam to the external address service;
//! `ViaCepClient` is the bundled implementation. Lookups carry no
//! cancellation: every trigger takes a `LookupTicket` from a
//! `LookupTracker`, and only the newest ticket's result may be merged.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::FormConfig;
use crate::models::{LookupResult, Record};
use crate::normalize::{self, POSTAL_CODE_DIGITS};
use crate::schema::AddressFields;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Postal code not found: {0}")]
    NotFound(String),

    #[error("Cannot reach address service at {0}")]
    Connection(String),

    #[error("Address lookup timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Address service error {status}")]
    Http { status: u16 },

    #[error("Unreadable address service response: {0}")]
    ResponseParsing(String),
}

/// External address service keyed by an 8-digit postal code.
#[allow(async_fn_in_trait)]
pub trait AddressLookup {
    async fn lookup(&self, postal_code: &str) -> Result<LookupResult, LookupError>;
}

// ─── ViaCEP ───────────────────────────────────────────────────────────────────

/// HTTP client for the ViaCEP API (`GET {base}/ws/{cep}/json/`).
pub struct ViaCepClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ViaCepClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Connection(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    pub fn from_config(config: &FormConfig) -> Result<Self, LookupError> {
        Self::new(&config.lookup_base_url, config.lookup_timeout)
    }
}

#[derive(Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    cep: String,
    #[serde(default)]
    logradouro: String,
    #[serde(default)]
    bairro: String,
    #[serde(default)]
    localidade: String,
    #[serde(default)]
    uf: String,
    /// `true` (older deployments send `"true"`) when the code is unknown.
    #[serde(default)]
    erro: Option<serde_json::Value>,
}

impl ViaCepResponse {
    fn is_unknown_code(&self) -> bool {
        match &self.erro {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(s)) => s != "false",
            Some(_) => true,
        }
    }
}

impl AddressLookup for ViaCepClient {
    async fn lookup(&self, postal_code: &str) -> Result<LookupResult, LookupError> {
        let code = normalize::digits_only(postal_code, POSTAL_CODE_DIGITS);
        if code.len() != POSTAL_CODE_DIGITS {
            return Err(LookupError::NotFound(postal_code.to_string()));
        }

        let url = format!("{}/ws/{}/json/", self.base_url, code);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout(self.timeout)
            } else if e.is_connect() {
                LookupError::Connection(self.base_url.clone())
            } else {
                LookupError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Http {
                status: status.as_u16(),
            });
        }

        let parsed: ViaCepResponse = response
            .json()
            .await
            .map_err(|e| LookupError::ResponseParsing(e.to_string()))?;

        if parsed.is_unknown_code() {
            return Err(LookupError::NotFound(code));
        }

        let returned = normalize::digits_only(&parsed.cep, POSTAL_CODE_DIGITS);
        Ok(LookupResult {
            postal_code: if returned.len() == POSTAL_CODE_DIGITS { returned } else { code },
            street: parsed.logradouro,
            neighborhood: parsed.bairro,
            city: parsed.localidade,
            region: parsed.uf,
        })
    }
}

/// Bounded wait around any lookup. Expiry is reported as a network failure.
pub async fn lookup_with_timeout<L: AddressLookup>(
    lookup: &L,
    postal_code: &str,
    timeout: Duration,
) -> Result<LookupResult, LookupError> {
    match tokio::time::timeout(timeout, lookup.lookup(postal_code)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Address lookup timed out");
            Err(LookupError::Timeout(timeout))
        }
    }
}

// ─── Staleness ────────────────────────────────────────────────────────────────

/// Proof of which trigger a lookup result belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    pub generation: u64,
    pub postal_code: String,
}

/// Monotonic generation counter. Issuing a ticket supersedes every earlier one.
#[derive(Debug, Default)]
pub struct LookupTracker {
    generation: u64,
}

impl LookupTracker {
    pub fn issue(&mut self, postal_code: &str) -> LookupTicket {
        self.generation += 1;
        LookupTicket {
            generation: self.generation,
            postal_code: postal_code.to_string(),
        }
    }

    pub fn is_current(&self, ticket: &LookupTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Supersede all outstanding tickets without issuing a new one.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }
}

/// Overwrite the record's address fields with a lookup result. Returns the
/// fields that changed value.
pub fn merge_address(
    record: &mut Record,
    fields: &AddressFields,
    result: &LookupResult,
) -> Vec<&'static str> {
    let updates = [
        (fields.postal_code, result.postal_code.as_str()),
        (fields.street, result.street.as_str()),
        (fields.neighborhood, result.neighborhood.as_str()),
        (fields.city, result.city.as_str()),
        (fields.region, result.region.as_str()),
    ];

    let mut changed = Vec::new();
    for (field, value) in updates {
        if record.text(field) != value {
            record.set(field, value);
            changed.push(field);
        }
    }
    changed
}
