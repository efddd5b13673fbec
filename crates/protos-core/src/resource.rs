//! Resource records exchanged with the host
//!
//! A resource is a typed record owned by a provider. On the wire it looks
//! like:
//!
//! ```json
//! {"id": "r-1", "type": "dns", "value": {"host": "www", "value": "10.0.0.1", "type": "A", "ttl": 300}, "status": "requested"}
//! ```
//!
//! The `type` field selects the shape of `value`. Types this crate does not
//! know are kept as [`ResourceValue::Unknown`] so newer hosts do not break
//! older providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Resources keyed by resource id
pub type Resources = HashMap<String, Resource>;

/// A typed record owned by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResource", into = "RawResource")]
pub struct Resource {
    /// Host-assigned identifier (empty until created)
    pub id: String,
    /// Typed payload
    pub value: ResourceValue,
    /// Fulfilment status
    pub status: ResourceStatus,
}

impl Resource {
    /// Create a new, not yet created, resource request
    pub fn new(value: ResourceValue) -> Self {
        Self {
            id: String::new(),
            value,
            status: ResourceStatus::Requested,
        }
    }

    /// The resource type discriminant (e.g. `dns`)
    pub fn resource_type(&self) -> &str {
        self.value.resource_type()
    }
}

/// Payload of a resource, keyed by resource type
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    /// DNS record
    Dns(DnsRecord),
    /// TLS certificate
    Certificate(Certificate),
    /// A resource type this crate does not model
    Unknown {
        /// The `type` discriminant as sent by the host
        rtype: String,
        /// The raw `value` field
        value: Value,
    },
}

impl ResourceValue {
    /// The resource type discriminant
    pub fn resource_type(&self) -> &str {
        match self {
            ResourceValue::Dns(_) => "dns",
            ResourceValue::Certificate(_) => "certificate",
            ResourceValue::Unknown { rtype, .. } => rtype,
        }
    }

    /// Build a typed value from its wire discriminant and raw payload
    pub fn from_parts(rtype: &str, value: Value) -> serde_json::Result<Self> {
        Ok(match rtype {
            "dns" => ResourceValue::Dns(serde_json::from_value(value)?),
            "certificate" => ResourceValue::Certificate(serde_json::from_value(value)?),
            other => ResourceValue::Unknown {
                rtype: other.to_string(),
                value,
            },
        })
    }

    /// Serialize into the raw `value` field
    pub fn to_json(&self) -> serde_json::Result<Value> {
        match self {
            ResourceValue::Dns(record) => serde_json::to_value(record),
            ResourceValue::Certificate(cert) => serde_json::to_value(cert),
            ResourceValue::Unknown { value, .. } => Ok(value.clone()),
        }
    }
}

/// A DNS record resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Host label (e.g. `www`)
    pub host: String,
    /// Record content (e.g. an IP address)
    pub value: String,
    /// Record type (A, AAAA, MX, ...)
    #[serde(rename = "type")]
    pub rtype: String,
    /// Time-to-live in seconds
    #[serde(default)]
    pub ttl: u32,
}

/// A TLS certificate resource
///
/// Binary fields are carried base64-encoded, exactly as the host sends them.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Certificate {
    /// Domains the certificate covers
    pub domains: Vec<String>,
    #[serde(default, rename = "privatekey")]
    pub private_key: String,
    #[serde(default)]
    pub certificate: String,
    #[serde(default, rename = "issuercertificate")]
    pub issuer_certificate: String,
    #[serde(default)]
    pub csr: String,
}

// Keep key material out of logs
impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("domains", &self.domains)
            .field("private_key", &"<REDACTED>")
            .field("certificate_len", &self.certificate.len())
            .finish()
    }
}

/// Fulfilment status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Requested by an app, not yet fulfilled by the provider
    Requested,
    /// Fulfilled by the provider
    Created,
    /// Anything else
    #[default]
    #[serde(other)]
    Unknown,
}

impl ResourceStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Requested => "requested",
            ResourceStatus::Created => "created",
            ResourceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire representation of a resource
#[derive(Serialize, Deserialize)]
struct RawResource {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    rtype: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    status: ResourceStatus,
}

impl TryFrom<RawResource> for Resource {
    type Error = serde_json::Error;

    fn try_from(raw: RawResource) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw.id,
            value: ResourceValue::from_parts(&raw.rtype, raw.value)?,
            status: raw.status,
        })
    }
}

impl From<Resource> for RawResource {
    fn from(resource: Resource) -> Self {
        let rtype = resource.resource_type().to_string();
        Self {
            id: resource.id,
            // Typed values always serialize; fall back to null rather than panic
            value: resource.value.to_json().unwrap_or(Value::Null),
            rtype,
            status: resource.status,
        }
    }
}
