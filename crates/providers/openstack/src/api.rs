//! Wire types for the Keystone, Nova and Cinder endpoints we call.

use std::collections::BTreeMap;

use harvest_core::model::{
    InstanceHandle, InstanceRequest, InstanceState, Tags, VolumeHandle, VolumeState,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct AuthRequest {
    auth: AuthBody,
}

#[derive(Serialize)]
struct AuthBody {
    identity: Identity,
}

#[derive(Serialize)]
struct Identity {
    methods: Vec<&'static str>,
    application_credential: ApplicationCredential,
}

#[derive(Serialize)]
struct ApplicationCredential {
    id: String,
    secret: String,
}

impl AuthRequest {
    pub fn application_credential(id: &str, secret: &str) -> AuthRequest {
        AuthRequest {
            auth: AuthBody {
                identity: Identity {
                    methods: vec!["application_credential"],
                    application_credential: ApplicationCredential {
                        id: id.to_string(),
                        secret: secret.to_string(),
                    },
                },
            },
        }
    }
}

#[derive(Deserialize)]
pub struct AuthResponse {
    pub token: Token,
}

#[derive(Deserialize)]
pub struct Token {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl Token {
    /// Public URL of the first listed service type present in `region`.
    pub fn endpoint(&self, service_types: &[&str], region: &str) -> Option<String> {
        service_types.iter().find_map(|wanted| {
            self.catalog
                .iter()
                .filter(|entry| entry.service_type == *wanted)
                .flat_map(|entry| entry.endpoints.iter())
                .find(|e| {
                    e.interface == "public"
                        && (e.region.as_deref() == Some(region) || e.region_id.as_deref() == Some(region))
                })
                .map(|e| e.url.trim_end_matches('/').to_string())
        })
    }
}

#[derive(Deserialize)]
pub struct FlavorList {
    pub flavors: Vec<Flavor>,
}

#[derive(Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
}

pub fn resolve_flavor(flavors: &[Flavor], wanted: &str) -> String {
    flavors
        .iter()
        .find(|f| f.name == wanted)
        .map(|f| f.id.clone())
        .unwrap_or_else(|| wanted.to_string())
}

#[derive(Serialize)]
pub struct CreateServerRequest {
    pub server: NewServer,
}

#[derive(Serialize)]
pub struct NewServer {
    pub name: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    pub key_name: String,
    pub security_groups: Vec<SecurityGroupRef>,
    pub availability_zone: String,
    pub metadata: Tags,
}

#[derive(Serialize)]
pub struct SecurityGroupRef {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateServerResponse {
    pub server: CreatedServer,
}

#[derive(Deserialize)]
pub struct CreatedServer {
    pub id: String,
}

impl CreatedServer {
    /// Nova only echoes the id on create; everything else comes from the request.
    pub fn into_handle(self, request: &InstanceRequest) -> InstanceHandle {
        InstanceHandle {
            id: self.id,
            name: request.name.clone(),
            state: InstanceState::Pending,
            ip: None,
            tags: request.tags.clone(),
        }
    }
}

/// Query for the servers of one cluster, oldest first. Nova treats `name`
/// as a regular expression.
pub fn cluster_server_query(name_prefix: &str) -> Vec<(&'static str, String)> {
    vec![
        ("name", format!("^{}", name_prefix)),
        ("sort_key", "created_at".to_string()),
        ("sort_dir", "asc".to_string()),
    ]
}

#[derive(Deserialize)]
pub struct ServerResponse {
    pub server: Server,
}

#[derive(Deserialize)]
pub struct ServerList {
    pub servers: Vec<Server>,
}

#[derive(Deserialize)]
pub struct Server {
    id: String,
    #[serde(default)]
    name: String,
    status: String,
    #[serde(default)]
    addresses: BTreeMap<String, Vec<Address>>,
    #[serde(default)]
    pub metadata: Tags,
}

#[derive(Deserialize)]
struct Address {
    addr: String,
    #[serde(default)]
    version: Option<u8>,
    #[serde(rename = "OS-EXT-IPS:type", default)]
    kind: Option<String>,
}

impl Server {
    /// First floating IPv4 address, else the first fixed one.
    fn ip(&self) -> Option<String> {
        let v4: Vec<&Address> = self
            .addresses
            .values()
            .flatten()
            .filter(|a| a.version.unwrap_or(4) == 4)
            .collect();
        v4.iter()
            .find(|a| a.kind.as_deref() == Some("floating"))
            .or_else(|| v4.first())
            .map(|a| a.addr.clone())
    }

    pub fn into_handle(self) -> InstanceHandle {
        let ip = self.ip();
        InstanceHandle {
            state: server_state(&self.status),
            id: self.id,
            name: self.name,
            ip,
            tags: self.metadata,
        }
    }
}

pub fn server_state(status: &str) -> InstanceState {
    match status {
        "ACTIVE" => InstanceState::Running,
        "ERROR" => InstanceState::Failed,
        "DELETED" | "SOFT_DELETED" | "SHELVED_OFFLOADED" | "SHUTOFF" => InstanceState::Terminated,
        _ => InstanceState::Pending,
    }
}

#[derive(Serialize)]
pub struct CreateVolumeRequest {
    pub volume: NewVolume,
}

#[derive(Serialize)]
pub struct NewVolume {
    pub name: String,
    pub size: u32,
    pub availability_zone: String,
}

#[derive(Deserialize)]
pub struct VolumeResponse {
    pub volume: Volume,
}

#[derive(Deserialize)]
pub struct Volume {
    id: String,
    status: String,
}

impl Volume {
    pub fn into_handle(self) -> VolumeHandle {
        VolumeHandle {
            state: volume_state(&self.status),
            id: self.id,
        }
    }
}

pub fn volume_state(status: &str) -> VolumeState {
    match status {
        "available" => VolumeState::Available,
        "in-use" | "attaching" | "detaching" | "reserved" => VolumeState::InUse,
        "deleting" => VolumeState::Deleting,
        s if s.starts_with("error") => VolumeState::Failed,
        _ => VolumeState::Creating,
    }
}

#[derive(Serialize)]
pub struct AttachRequest {
    #[serde(rename = "volumeAttachment")]
    pub volume_attachment: VolumeAttachment,
}

#[derive(Serialize)]
pub struct VolumeAttachment {
    #[serde(rename = "volumeId")]
    pub volume_id: String,
    pub device: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_public_endpoint_for_region() {
        let auth: AuthResponse = serde_json::from_value(json!({
            "token": {
                "catalog": [
                    {
                        "type": "compute",
                        "endpoints": [
                            { "interface": "internal", "region": "melbourne", "url": "http://nova.internal/v2.1" },
                            { "interface": "public", "region": "sydney", "url": "https://nova.syd/v2.1" },
                            { "interface": "public", "region_id": "melbourne", "url": "https://nova.rc.nectar.org.au:8774/v2.1/" }
                        ]
                    },
                    {
                        "type": "volumev3",
                        "endpoints": [
                            { "interface": "public", "region": "melbourne", "url": "https://cinder.rc.nectar.org.au:8776/v3/p1" }
                        ]
                    }
                ]
            }
        }))
        .unwrap();

        assert_eq!(
            auth.token.endpoint(&["compute"], "melbourne").as_deref(),
            Some("https://nova.rc.nectar.org.au:8774/v2.1")
        );
        assert_eq!(
            auth.token.endpoint(&["block-storage", "volumev3"], "melbourne").as_deref(),
            Some("https://cinder.rc.nectar.org.au:8776/v3/p1")
        );
        assert_eq!(auth.token.endpoint(&["compute"], "perth"), None);
    }

    #[test]
    fn server_prefers_floating_ipv4() {
        let server: Server = serde_json::from_value(json!({
            "id": "abc",
            "name": "harvest-1-main",
            "status": "ACTIVE",
            "addresses": {
                "private": [
                    { "addr": "fe80::1", "version": 6, "OS-EXT-IPS:type": "fixed" },
                    { "addr": "192.168.0.5", "version": 4, "OS-EXT-IPS:type": "fixed" },
                    { "addr": "203.0.113.7", "version": 4, "OS-EXT-IPS:type": "floating" }
                ]
            },
            "metadata": { "harvest-role": "main" }
        }))
        .unwrap();

        let handle = server.into_handle();

        assert_eq!(handle.state, InstanceState::Running);
        assert_eq!(handle.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(handle.role(), Some("main"));
    }

    #[test]
    fn building_server_has_no_address() {
        let server: Server = serde_json::from_value(json!({
            "id": "abc",
            "status": "BUILD",
            "addresses": {}
        }))
        .unwrap();

        let handle = server.into_handle();

        assert_eq!(handle.state, InstanceState::Pending);
        assert_eq!(handle.ip, None);
    }

    #[test]
    fn maps_server_statuses() {
        assert_eq!(server_state("ACTIVE"), InstanceState::Running);
        assert_eq!(server_state("BUILD"), InstanceState::Pending);
        assert_eq!(server_state("REBOOT"), InstanceState::Pending);
        assert_eq!(server_state("ERROR"), InstanceState::Failed);
        assert_eq!(server_state("SHUTOFF"), InstanceState::Terminated);
    }

    #[test]
    fn maps_volume_statuses() {
        assert_eq!(volume_state("creating"), VolumeState::Creating);
        assert_eq!(volume_state("available"), VolumeState::Available);
        assert_eq!(volume_state("attaching"), VolumeState::InUse);
        assert_eq!(volume_state("error_deleting"), VolumeState::Failed);
    }

    #[test]
    fn resolves_flavor_names_to_ids() {
        let flavors = vec![
            Flavor { id: "1".into(), name: "m1.small".into() },
            Flavor { id: "3".into(), name: "m1.large".into() },
        ];
        assert_eq!(resolve_flavor(&flavors, "m1.large"), "3");
        assert_eq!(resolve_flavor(&flavors, "885227de"), "885227de");
    }

    #[test]
    fn create_server_payload_uses_nova_field_names() {
        let mut metadata = Tags::new();
        metadata.insert("harvest-role".into(), "harvester".into());
        let payload = CreateServerRequest {
            server: NewServer {
                name: "h1".into(),
                image_ref: "img".into(),
                flavor_ref: "1".into(),
                key_name: "Cloud".into(),
                security_groups: vec![SecurityGroupRef { name: "SSH".into() }],
                availability_zone: "melbourne-np".into(),
                metadata,
            },
        };

        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["server"]["imageRef"], "img");
        assert_eq!(value["server"]["flavorRef"], "1");
        assert_eq!(value["server"]["security_groups"][0]["name"], "SSH");
        assert_eq!(value["server"]["metadata"]["harvest-role"], "harvester");
    }

    #[test]
    fn created_server_keeps_the_requested_name_and_tags() {
        let mut tags = Tags::new();
        tags.insert("harvest-cluster".into(), "c1".into());
        let request = InstanceRequest {
            name: "harvest-c1-main".into(),
            image_id: "img".into(),
            flavor: "m1.large".into(),
            key_name: "Cloud".into(),
            security_groups: vec!["SSH".into()],
            zone: "melbourne-np".into(),
            tags: tags.clone(),
        };
        let created: CreateServerResponse = serde_json::from_value(json!({
            "server": {
                "id": "f5dc173b",
                "adminPass": "secret",
                "links": [],
                "security_groups": [{ "name": "SSH" }]
            }
        }))
        .unwrap();

        let handle = created.server.into_handle(&request);

        assert_eq!(handle.id, "f5dc173b");
        assert_eq!(handle.name, "harvest-c1-main");
        assert_eq!(handle.state, InstanceState::Pending);
        assert_eq!(handle.ip, None);
        assert_eq!(handle.tags, tags);
    }

    #[test]
    fn cluster_query_anchors_the_name_prefix() {
        let query = cluster_server_query("harvest-ab12cd34-");
        assert_eq!(query[0], ("name", "^harvest-ab12cd34-".to_string()));
        assert!(query.contains(&("sort_key", "created_at".to_string())));
    }
}
