mod api;

use std::time::Duration;

use harvest_core::CloudProvider;
use harvest_core::error::HarvestError;
use harvest_core::model::{
    InstanceHandle, InstanceRequest, TAG_CLUSTER, VolumeHandle, VolumeRequest, instance_name_prefix,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use api::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const VOLUME_SERVICE_TYPES: [&str; 3] = ["volumev3", "block-storage", "volumev2"];

/// Where and how to authenticate against the identity service.
#[derive(Debug, Clone)]
pub struct OpenStackConfig {
    pub region: String,
    /// Host of the identity endpoint, with or without a scheme.
    pub auth_host: String,
    pub auth_port: u16,
    pub auth_path: String,
    pub credential_id: String,
    pub credential_secret: String,
    pub verify_tls: bool,
}

impl OpenStackConfig {
    pub fn identity_url(&self) -> String {
        let host = self.auth_host.trim_end_matches('/');
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let path = self.auth_path.trim_matches('/');
        if path.is_empty() {
            format!("{}:{}", base, self.auth_port)
        } else {
            format!("{}:{}/{}", base, self.auth_port, path)
        }
    }
}

/// An authenticated session against one region of an OpenStack cloud.
pub struct OpenStack {
    client: Client,
    token: String,
    compute_url: String,
    volume_url: String,
}

impl OpenStack {
    /// Authenticate with an application credential and locate the compute
    /// and block-storage endpoints for the configured region.
    pub fn connect(config: &OpenStackConfig) -> Result<OpenStack, HarvestError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HarvestError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        let url = format!("{}/v3/auth/tokens", config.identity_url());
        let payload = AuthRequest::application_credential(&config.credential_id, &config.credential_secret);

        debug!(url = %url, region = %config.region, "authenticating");
        let response = client
            .post(&url)
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .map_err(|e| HarvestError::Connection(format!("Request failed: {}", e)))?;
        let response = check(response, HarvestError::Connection)?;

        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| HarvestError::Connection("No X-Subject-Token in auth response".into()))?
            .to_string();
        let auth: AuthResponse = parse(response, HarvestError::Connection)?;

        let compute_url = auth
            .token
            .endpoint(&["compute"], &config.region)
            .ok_or_else(|| {
                HarvestError::Connection(format!("No compute endpoint in region '{}'", config.region))
            })?;
        let volume_url = auth
            .token
            .endpoint(&VOLUME_SERVICE_TYPES, &config.region)
            .ok_or_else(|| {
                HarvestError::Connection(format!("No block-storage endpoint in region '{}'", config.region))
            })?;

        info!(compute = %compute_url, volume = %volume_url, "connected to OpenStack");
        Ok(OpenStack {
            client,
            token,
            compute_url,
            volume_url,
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header("X-Auth-Token", &self.token)
            .header("accept", "application/json")
    }

    fn post(&self, url: &str) -> RequestBuilder {
        self.client
            .post(url)
            .header("X-Auth-Token", &self.token)
            .header("accept", "application/json")
    }

    fn delete(&self, url: &str) -> RequestBuilder {
        self.client
            .delete(url)
            .header("X-Auth-Token", &self.token)
    }

    /// Nova wants a flavor id. Accept names too, falling back to the given
    /// value when no flavor carries that name.
    fn flavor_ref(&self, flavor: &str) -> Result<String, HarvestError> {
        let url = format!("{}/flavors", self.compute_url);
        let response = send(self.get(&url), HarvestError::Provision)?;
        let flavors: FlavorList = parse(response, HarvestError::Provision)?;
        Ok(resolve_flavor(&flavors.flavors, flavor))
    }
}

/// Send a request, classifying transport and HTTP failures with `kind`.
fn send(request: RequestBuilder, kind: fn(String) -> HarvestError) -> Result<Response, HarvestError> {
    let response = request
        .send()
        .map_err(|e| kind(format!("Request failed: {}", e)))?;
    check(response, kind)
}

fn check(response: Response, kind: fn(String) -> HarvestError) -> Result<Response, HarvestError> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().unwrap_or_default();
        return Err(kind(format!("API Error ({}): {}", status, text)));
    }
    Ok(response)
}

fn parse<T: DeserializeOwned>(response: Response, kind: fn(String) -> HarvestError) -> Result<T, HarvestError> {
    let text = response
        .text()
        .map_err(|e| kind(format!("Failed to read response body: {}", e)))?;
    serde_json::from_str(&text)
        .map_err(|e| kind(format!("Failed to parse response: {} - Response body: {}", e, text)))
}

impl CloudProvider for OpenStack {
    fn launch_instance(&self, request: &InstanceRequest) -> Result<InstanceHandle, HarvestError> {
        let payload = CreateServerRequest {
            server: NewServer {
                name: request.name.clone(),
                image_ref: request.image_id.clone(),
                flavor_ref: self.flavor_ref(&request.flavor)?,
                key_name: request.key_name.clone(),
                security_groups: request
                    .security_groups
                    .iter()
                    .map(|name| SecurityGroupRef { name: name.clone() })
                    .collect(),
                availability_zone: request.zone.clone(),
                metadata: request.tags.clone(),
            },
        };

        let url = format!("{}/servers", self.compute_url);
        let response = send(self.post(&url).json(&payload), HarvestError::Provision)?;
        let created: CreateServerResponse = parse(response, HarvestError::Provision)?;
        debug!(instance = %created.server.id, name = %request.name, "server accepted");
        Ok(created.server.into_handle(request))
    }

    fn describe_instance(&self, id: &str) -> Result<InstanceHandle, HarvestError> {
        let url = format!("{}/servers/{}", self.compute_url, id);
        let response = send(self.get(&url), HarvestError::Provision)?;
        let server: ServerResponse = parse(response, HarvestError::Provision)?;
        Ok(server.server.into_handle())
    }

    fn list_instances(&self, cluster_id: &str) -> Result<Vec<InstanceHandle>, HarvestError> {
        let url = format!("{}/servers/detail", self.compute_url);
        let query = cluster_server_query(&instance_name_prefix(cluster_id));
        let response = send(self.get(&url).query(&query), HarvestError::Provision)?;
        let servers: ServerList = parse(response, HarvestError::Provision)?;
        Ok(servers
            .servers
            .into_iter()
            .filter(|s| s.metadata.get(TAG_CLUSTER).map(String::as_str) == Some(cluster_id))
            .map(Server::into_handle)
            .collect())
    }

    fn terminate_instance(&self, id: &str) -> Result<(), HarvestError> {
        let url = format!("{}/servers/{}", self.compute_url, id);
        let response = self
            .delete(&url)
            .send()
            .map_err(|e| HarvestError::Teardown(format!("Request failed: {}", e)))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(instance = %id, "instance already gone");
            return Ok(());
        }
        check(response, HarvestError::Teardown)?;
        Ok(())
    }

    fn create_volume(&self, request: &VolumeRequest) -> Result<VolumeHandle, HarvestError> {
        let payload = CreateVolumeRequest {
            volume: NewVolume {
                name: request.name.clone(),
                size: request.size_gb,
                availability_zone: request.zone.clone(),
            },
        };
        let url = format!("{}/volumes", self.volume_url);
        let response = send(self.post(&url).json(&payload), HarvestError::Provision)?;
        let volume: VolumeResponse = parse(response, HarvestError::Provision)?;
        Ok(volume.volume.into_handle())
    }

    fn describe_volume(&self, id: &str) -> Result<VolumeHandle, HarvestError> {
        let url = format!("{}/volumes/{}", self.volume_url, id);
        let response = send(self.get(&url), HarvestError::Provision)?;
        let volume: VolumeResponse = parse(response, HarvestError::Provision)?;
        Ok(volume.volume.into_handle())
    }

    fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<(), HarvestError> {
        let payload = AttachRequest {
            volume_attachment: VolumeAttachment {
                volume_id: volume_id.to_string(),
                device: device.to_string(),
            },
        };
        let url = format!("{}/servers/{}/os-volume_attachments", self.compute_url, instance_id);
        send(self.post(&url).json(&payload), HarvestError::Attach)?;
        Ok(())
    }

    fn delete_volume(&self, id: &str) -> Result<(), HarvestError> {
        let url = format!("{}/volumes/{}", self.volume_url, id);
        let response = self
            .delete(&url)
            .send()
            .map_err(|e| HarvestError::Teardown(format!("Request failed: {}", e)))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(volume = %id, "volume already gone");
            return Ok(());
        }
        check(response, HarvestError::Teardown)?;
        Ok(())
    }
}
