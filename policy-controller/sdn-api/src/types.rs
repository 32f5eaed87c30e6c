//! Wire representations of the SDN's JSON resources.
//!
//! Every list GET may answer with a single zero-valued element instead of an
//! empty list, so all fields default on deserialization and callers validate
//! natural keys explicitly.

use serde::{Deserialize, Serialize};

pub const ACTION_FORWARD: &str = "FORWARD";
pub const ACTION_DROP: &str = "DROP";
pub const ETHER_TYPE_IPV4: &str = "0x800";
pub const PROTOCOL_ANY: &str = "ANY";
pub const POLICY_STATE_LIVE: &str = "LIVE";
pub const ENTITY_SCOPE_ENTERPRISE: &str = "ENTERPRISE";

pub const LOCATION_ANY: &str = "ANY";
pub const LOCATION_ZONE: &str = "ZONE";
pub const NETWORK_ENDPOINT_ZONE: &str = "ENDPOINT_ZONE";
pub const NETWORK_ENDPOINT_DOMAIN: &str = "ENDPOINT_DOMAIN";
pub const NETWORK_MACRO_GROUP: &str = "NETWORK_MACRO_GROUP";

pub const IP_TYPE_V4: &str = "IPV4";
pub const PAT_ENABLED: &str = "ENABLED";
pub const PAT_INHERITED: &str = "INHERITED";

/// A named SDN object. Enterprises, domain templates, zones and macro groups
/// all share this shape on the wire.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Object {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "APIKey", default)]
    pub api_key: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "userName", default)]
    pub user_name: String,

    /// Hex-encoded SHA-1 digest; never returned by the SDN.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    #[serde(rename = "firstName", default)]
    pub first_name: String,

    #[serde(rename = "lastName", default)]
    pub last_name: String,

    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Group {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(default)]
    pub role: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct License {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub license: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Domain {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "templateID", default)]
    pub template_id: String,

    #[serde(rename = "PATEnabled", default, skip_serializing_if = "String::is_empty")]
    pub pat_enabled: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Subnet {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "IPType", default)]
    pub ip_type: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub netmask: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "PATEnabled", default, skip_serializing_if = "String::is_empty")]
    pub pat_enabled: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkMacro {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "IPType", default)]
    pub ip_type: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub netmask: String,
}

// === impl NetworkMacro ===

impl NetworkMacro {
    /// The macro's natural key is the whole (name, type, address, netmask)
    /// tuple; two services publishing the same endpoint stay distinct.
    pub(crate) fn filter(&self) -> String {
        format!(
            r#"name == "{}" and IPType == "{}" and address == "{}" and netmask == "{}""#,
            self.name, self.ip_type, self.address, self.netmask
        )
    }

    pub(crate) fn matches(&self, other: &NetworkMacro) -> bool {
        self.name == other.name
            && self.ip_type == other.ip_type
            && self.address == other.address
            && self.netmask == other.netmask
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AclTemplate {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "defaultAllowIP", default)]
    pub default_allow_ip: bool,

    #[serde(rename = "defaultAllowNonIP", default)]
    pub default_allow_non_ip: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AclEntry {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "entityScope", default)]
    pub entity_scope: String,

    #[serde(rename = "etherType", default)]
    pub ether_type: String,

    #[serde(rename = "locationType", default)]
    pub location_type: String,

    #[serde(rename = "locationID", default)]
    pub location_id: String,

    #[serde(rename = "networkType", default)]
    pub network_type: String,

    #[serde(rename = "networkID", default)]
    pub network_id: String,

    #[serde(rename = "policyState", default)]
    pub policy_state: String,

    #[serde(default)]
    pub priority: u32,

    #[serde(default)]
    pub protocol: String,

    #[serde(default)]
    pub reflexive: bool,
}

// === impl AclEntry ===

impl AclEntry {
    /// Filter selecting this entry by its semantic fields.
    ///
    /// Priority is deliberately excluded so entries written by a previous
    /// process (whose counter state is gone) still match.
    pub(crate) fn filter(&self) -> String {
        let mut filter = format!(
            r#"action == "{}" and etherType == "{}" and locationType == "{}" and networkType == "{}" and protocol == "{}""#,
            self.action, self.ether_type, self.location_type, self.network_type, self.protocol
        );
        if !self.location_id.is_empty() {
            filter.push_str(&format!(r#" and locationID == "{}""#, self.location_id));
        }
        if !self.network_id.is_empty() {
            filter.push_str(&format!(r#" and networkID == "{}""#, self.network_id));
        }
        filter
    }

    pub(crate) fn matches(&self, other: &AclEntry) -> bool {
        self.action == other.action
            && self.ether_type == other.ether_type
            && self.location_type == other.location_type
            && self.location_id == other.location_id
            && self.network_type == other.network_type
            && self.network_id == other.network_id
            && self.protocol == other.protocol
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RestError {
    #[serde(rename = "internalErrorCode", default)]
    pub internal_error_code: Option<i64>,

    #[serde(default)]
    pub errors: Vec<RestErrorDetail>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RestErrorDetail {
    #[serde(default)]
    pub property: String,

    #[serde(default)]
    pub descriptions: Vec<RestErrorDescription>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RestErrorDescription {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,
}

// === impl RestError ===

impl RestError {
    pub(crate) fn summary(&self) -> String {
        let mut parts = Vec::new();
        for detail in &self.errors {
            for d in &detail.descriptions {
                if d.description.is_empty() {
                    parts.push(d.title.clone());
                } else {
                    parts.push(format!("{}: {}", d.title, d.description));
                }
            }
        }
        parts.join("; ")
    }
}
