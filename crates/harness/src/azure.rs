//! Azure Resource Manager client
//!
//! Reads virtual machine metadata through the Compute REST API. Tokens come
//! either from `AZURE_ACCESS_TOKEN` or from the client-credentials flow with
//! the same `ARM_*` variables the azurerm Terraform provider reads.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cloud::{CloudQuery, VmImage};
use crate::config::AzureConfig;
use crate::error::{HarnessError, HarnessResult, QueryError};

/// Scope requested for management-plane tokens
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Refresh tokens this long before they expire
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// How the client authenticates against ARM
#[derive(Clone)]
pub enum Credentials {
    /// Pre-issued bearer token
    AccessToken(String),

    /// Service principal with a client secret
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::AccessToken(_) => f.write_str("AccessToken(..)"),
            Credentials::ClientSecret { tenant_id, client_id, .. } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(token) = get("AZURE_ACCESS_TOKEN") {
            return Ok(Credentials::AccessToken(token));
        }

        match (get("ARM_TENANT_ID"), get("ARM_CLIENT_ID"), get("ARM_CLIENT_SECRET")) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                Ok(Credentials::ClientSecret {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            _ => Err(HarnessError::Config(
                "no Azure credentials: set AZURE_ACCESS_TOKEN or ARM_TENANT_ID, ARM_CLIENT_ID and ARM_CLIENT_SECRET"
                    .to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < expires_at
            }
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    // v1 endpoints send this as a string
    #[serde(default)]
    expires_in: Option<Value>,
}

/// Thin ARM client scoped to a single subscription
pub struct AzureClient {
    http: reqwest::Client,
    management: Url,
    authority: Url,
    api_version: String,
    subscription_id: String,
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
}

impl AzureClient {
    pub fn new(
        config: &AzureConfig,
        subscription_id: impl Into<String>,
        credentials: Credentials,
    ) -> HarnessResult<Self> {
        let management = parse_endpoint(&config.management_endpoint)?;
        let authority = parse_endpoint(&config.authority_host)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| HarnessError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            management,
            authority,
            api_version: config.compute_api_version.clone(),
            subscription_id: subscription_id.into(),
            credentials,
            token: Mutex::new(None),
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Resource URL of a virtual machine
    pub fn vm_url(&self, vm_name: &str, resource_group: &str) -> Result<Url, QueryError> {
        let mut url = self.management.clone();
        url.path_segments_mut()
            .map_err(|_| QueryError::Decode(format!("invalid endpoint {}", self.management)))?
            .pop_if_empty()
            .extend([
                "subscriptions",
                self.subscription_id.as_str(),
                "resourceGroups",
                resource_group,
                "providers",
                "Microsoft.Compute",
                "virtualMachines",
                vm_name,
            ]);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<String, QueryError> {
        let (tenant_id, client_id, client_secret) = match &self.credentials {
            Credentials::AccessToken(token) => return Ok(token.clone()),
            Credentials::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => (tenant_id, client_id, client_secret),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let mut url = self.authority.clone();
        url.path_segments_mut()
            .map_err(|_| QueryError::Decode(format!("invalid authority {}", self.authority)))?
            .pop_if_empty()
            .extend([tenant_id.as_str(), "oauth2", "v2.0", "token"]);

        info!("Requesting ARM token for client {}", client_id);
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Auth(format!(
                "token request returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = token
            .expires_in
            .as_ref()
            .and_then(expires_in_secs)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    async fn get_vm(&self, vm_name: &str, resource_group: &str) -> Result<VirtualMachine, QueryError> {
        let url = self.vm_url(vm_name, resource_group)?;
        let token = self.bearer_token().await?;

        debug!("GET {}", url);
        let response = self.http.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let what = format!(
                "virtual machine {} in resource group {}",
                vm_name, resource_group
            );
            return Err(classify_status(status, &what, body));
        }

        response
            .json::<VirtualMachine>()
            .await
            .map_err(|e| QueryError::Decode(format!("virtual machine {}: {}", vm_name, e)))
    }
}

#[async_trait]
impl CloudQuery for AzureClient {
    async fn vm_exists(&self, vm_name: &str, resource_group: &str) -> Result<bool, QueryError> {
        match self.get_vm(vm_name, resource_group).await {
            Ok(_) => Ok(true),
            Err(QueryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn vm_image(&self, vm_name: &str, resource_group: &str) -> Result<VmImage, QueryError> {
        let vm = self.get_vm(vm_name, resource_group).await?;
        vm.image().ok_or_else(|| {
            QueryError::Decode(format!(
                "virtual machine {} has no marketplace image reference",
                vm_name
            ))
        })
    }

    async fn vm_nics(
        &self,
        vm_name: &str,
        resource_group: &str,
    ) -> Result<Vec<String>, QueryError> {
        let vm = self.get_vm(vm_name, resource_group).await?;
        Ok(vm.nic_names())
    }
}

/// Map a non-success ARM status to a query error
pub fn classify_status(status: StatusCode, what: &str, body: String) -> QueryError {
    match status {
        StatusCode::NOT_FOUND => QueryError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            QueryError::Auth(format!("{} ({}): {}", what, status, arm_error_message(&body)))
        }
        _ => QueryError::Api {
            status: status.as_u16(),
            body: arm_error_message(&body),
        },
    }
}

/// Pull `error.message` out of an ARM error body, falling back to the raw text
fn arm_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn expires_in_secs(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_endpoint(endpoint: &str) -> HarnessResult<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| HarnessError::Config(format!("invalid endpoint '{}': {}", endpoint, e)))?;
    if url.cannot_be_a_base() {
        return Err(HarnessError::Config(format!("invalid endpoint '{}'", endpoint)));
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct VirtualMachine {
    #[serde(default)]
    properties: VmProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmProperties {
    #[serde(default)]
    storage_profile: Option<StorageProfile>,
    #[serde(default)]
    network_profile: Option<NetworkProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageProfile {
    #[serde(default)]
    image_reference: Option<ImageReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageReference {
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    offer: Option<String>,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    exact_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkProfile {
    #[serde(default)]
    network_interfaces: Vec<NetworkInterfaceReference>,
}

#[derive(Debug, Deserialize)]
struct NetworkInterfaceReference {
    id: String,
}

impl VirtualMachine {
    fn image(&self) -> Option<VmImage> {
        let reference = self.properties.storage_profile.as_ref()?.image_reference.as_ref()?;
        Some(VmImage {
            publisher: reference.publisher.clone().unwrap_or_default(),
            offer: reference.offer.clone().unwrap_or_default(),
            sku: reference.sku.clone().unwrap_or_default(),
            version: reference.version.clone()?,
            exact_version: reference.exact_version.clone(),
        })
    }

    fn nic_names(&self) -> Vec<String> {
        self.properties
            .network_profile
            .as_ref()
            .map(|profile| {
                profile
                    .network_interfaces
                    .iter()
                    .filter_map(|nic| nic.id.rsplit('/').find(|s| !s.is_empty()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
