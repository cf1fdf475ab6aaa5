use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Remote service an [`ApiRequest`] is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiService {
    Ec2,
    DirectConnect,
}

/// One read-only remote call: service, operation name and JSON parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub service: ApiService,
    pub operation: &'static str,
    pub params: Value,
}

impl ApiRequest {
    pub fn ec2(operation: &'static str, params: Value) -> Self {
        Self {
            service: ApiService::Ec2,
            operation,
            params,
        }
    }

    pub fn direct_connect(operation: &'static str, params: Value) -> Self {
        Self {
            service: ApiService::DirectConnect,
            operation,
            params,
        }
    }

    /// EC2 request carrying a single `Filters` entry.
    pub fn ec2_filtered(operation: &'static str, name: &str, value: &str) -> Self {
        Self::ec2(
            operation,
            json!({ "Filters": [{ "Name": name, "Values": [value] }] }),
        )
    }

    /// Copy of this request continuing from a pagination token.
    pub fn with_next_token(&self, token: &str) -> Self {
        let mut params = match &self.params {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        params.insert("NextToken".to_string(), Value::String(token.to_string()));
        Self {
            service: self.service,
            operation: self.operation,
            params: Value::Object(params),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Request throttled: {0}")]
    Throttled(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Service error ({code}): {message}")]
    Service { code: String, message: String },
}

/// Authenticated, region-aware client for the read-only remote API.
///
/// Credentials are resolved by whoever builds the client; the collector only
/// ever sees this capability.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Issues `request` against `region` and returns the raw JSON response.
    async fn call(&self, region: &str, request: &ApiRequest) -> Result<Value, ApiError>;
}

/// Source of wall-clock time for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
