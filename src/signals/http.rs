// src/signals/http.rs
//! Live HTTP clients for the lookup-style signals (carrier, national spam
//! database, DNC registry). Thin reqwest wrappers with their own request
//! timeout; base URLs come from environment variables so deployments can
//! point at whichever upstream they subscribe to.
//!
//! The DNC client honors the trait contract and swallows its own failures
//! into "not registered".

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::{CarrierLookup, CarrierRecord, DncCheck, DncResult, SpamDatabaseCheck, SpamDbResult};

fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("build http client")
}

pub struct HttpCarrierLookup {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCarrierLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            http: client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CarrierDto {
    carrier: Option<String>,
    line_type: Option<String>,
    country: Option<String>,
    #[serde(default)]
    mobile: bool,
}

#[async_trait::async_trait]
impl CarrierLookup for HttpCarrierLookup {
    async fn lookup(&self, number: &str) -> Result<Option<CarrierRecord>> {
        let url = format!("{}/v1/carrier", self.base_url);
        let dto: CarrierDto = self
            .http
            .get(url)
            .query(&[("number", number)])
            .send()
            .await
            .context("carrier lookup request")?
            .error_for_status()
            .context("carrier lookup status")?
            .json()
            .await
            .context("carrier lookup body")?;

        let Some(name) = dto.carrier else {
            return Ok(None);
        };
        Ok(Some(CarrierRecord {
            name,
            line_type: dto.line_type.unwrap_or_else(|| "unknown".to_string()),
            country: dto.country.unwrap_or_else(|| "ZZ".to_string()),
            is_mobile: dto.mobile,
        }))
    }

    fn name(&self) -> &'static str {
        "carrier-http"
    }
}

pub struct HttpSpamDatabase {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSpamDatabase {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            http: client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SpamDbDto {
    listed: bool,
    details: Option<String>,
}

#[async_trait::async_trait]
impl SpamDatabaseCheck for HttpSpamDatabase {
    async fn check(&self, number: &str) -> Result<SpamDbResult> {
        let url = format!("{}/v1/spam", self.base_url);
        let dto: SpamDbDto = self
            .http
            .get(url)
            .query(&[("number", number)])
            .send()
            .await
            .context("spam-db request")?
            .error_for_status()
            .context("spam-db status")?
            .json()
            .await
            .context("spam-db body")?;
        Ok(SpamDbResult {
            is_spam: dto.listed,
            details: dto.details,
        })
    }

    fn name(&self) -> &'static str {
        "spam-db-http"
    }
}

pub struct HttpDncRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDncRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            http: client(timeout)?,
        })
    }

    async fn check_inner(&self, number: &str) -> Result<DncResult> {
        #[derive(Debug, Deserialize)]
        struct DncDto {
            registered: bool,
            registration_date: Option<DateTime<Utc>>,
        }

        let url = format!("{}/v1/dnc", self.base_url);
        let dto: DncDto = self
            .http
            .get(url)
            .query(&[("number", number)])
            .send()
            .await
            .context("dnc request")?
            .error_for_status()
            .context("dnc status")?
            .json()
            .await
            .context("dnc body")?;
        Ok(DncResult {
            is_registered: dto.registered,
            registration_date: dto.registration_date,
        })
    }
}

#[async_trait::async_trait]
impl DncCheck for HttpDncRegistry {
    async fn check(&self, number: &str) -> DncResult {
        match self.check_inner(number).await {
            Ok(res) => res,
            Err(err) => {
                warn!(target: "signals", error = ?err, "dnc check failed, defaulting to not registered");
                DncResult::not_registered()
            }
        }
    }

    fn name(&self) -> &'static str {
        "dnc-http"
    }
}
