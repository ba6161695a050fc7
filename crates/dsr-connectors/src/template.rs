//! Declarative SaaS connector templates.
//!
//! A template describes a SaaS connector type without any imperative code:
//! the parameters it must be configured with, the external references it can
//! join through, and which request kinds its endpoints support. The engine
//! uses templates only to build the graph model and to answer "what secret
//! fields does this type need" - actual secret values never pass through
//! here.

use serde::{Deserialize, Serialize};

/// A configuration parameter a SaaS connector type requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorParam {
    /// Parameter name, e.g. "api_key".
    pub name: String,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Whether the value is a secret.
    #[serde(default)]
    pub sensitive: bool,
}

/// A cross-system reference a SaaS connector can be joined through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    /// Reference name.
    pub name: String,
}

/// Which request kinds one endpoint supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointRequests {
    /// Endpoint can read rows (access).
    #[serde(default)]
    pub read: bool,
    /// Endpoint can update rows (erasure).
    #[serde(default)]
    pub update: bool,
    /// Endpoint can delete rows (erasure).
    #[serde(default)]
    pub delete: bool,
}

/// One endpoint (resource) of a SaaS connector type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaasEndpoint {
    /// Endpoint name; becomes a collection name in the graph model.
    pub name: String,
    /// Supported request kinds.
    pub requests: EndpointRequests,
}

/// The declarative config of one SaaS connector type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaasTemplateConfig {
    /// Ordered connector parameters.
    pub connector_params: Vec<ConnectorParam>,
    /// Ordered external references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_references: Vec<ExternalReference>,
    /// Declared endpoints.
    pub endpoints: Vec<SaasEndpoint>,
    /// Whether the vendor offers a dedicated data-protection request flow.
    #[serde(default)]
    pub data_protection_request: bool,
    /// Whether the vendor supports consent propagation.
    #[serde(default)]
    pub consent_requests: bool,
}

impl SaasTemplateConfig {
    /// Any endpoint can read.
    pub fn supports_access(&self) -> bool {
        self.endpoints.iter().any(|e| e.requests.read)
    }

    /// Any endpoint can update/delete, or a data-protection flow exists.
    pub fn supports_erasure(&self) -> bool {
        self.data_protection_request
            || self
                .endpoints
                .iter()
                .any(|e| e.requests.update || e.requests.delete)
    }

    /// Consent propagation is declared.
    pub fn supports_consent(&self) -> bool {
        self.consent_requests
    }

    /// Secret field names in declared order: connector params first, then
    /// external references.
    pub fn secret_field_order(&self) -> Vec<String> {
        let mut order: Vec<String> = self.connector_params.iter().map(|p| p.name.clone()).collect();
        order.extend(self.external_references.iter().map(|r| r.name.clone()));
        order
    }
}

/// Registry entry for one SaaS connector type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorTemplate {
    /// Type identifier, e.g. "mailchimp".
    pub identifier: String,
    /// Human-readable name, e.g. "Mailchimp".
    pub human_readable: String,
    /// Base64-encoded icon, if the vendor ships one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Declarative config.
    pub config: SaasTemplateConfig,
}
