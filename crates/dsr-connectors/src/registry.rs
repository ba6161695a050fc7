//! Read-only catalog of connection types.
//!
//! Built-in database/manual/email types are a closed enum; SaaS types are
//! registered as declarative [`ConnectorTemplate`]s, loaded once at process
//! start. Lookups answer which types exist, which action types each
//! supports, and what secret *fields* (never values) a type needs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use dsr_types::ActionType;

use crate::template::ConnectorTemplate;

/// Closed set of built-in connection types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// PostgreSQL database.
    Postgres,
    /// MySQL database.
    Mysql,
    /// Microsoft SQL Server database.
    Mssql,
    /// MongoDB document store.
    Mongodb,
    /// Snowflake warehouse.
    Snowflake,
    /// BigQuery warehouse.
    Bigquery,
    /// SaaS connector (typed further by template identifier).
    Saas,
    /// Human-fulfilled manual process.
    Manual,
    /// Erasure fulfilled by emailing the vendor.
    GenericErasureEmail,
    /// Consent propagated by emailing the vendor.
    GenericConsentEmail,
}

impl ConnectionType {
    /// Stable string identifier (matches the serde form).
    pub fn identifier(&self) -> &'static str {
        match self {
            ConnectionType::Postgres => "postgres",
            ConnectionType::Mysql => "mysql",
            ConnectionType::Mssql => "mssql",
            ConnectionType::Mongodb => "mongodb",
            ConnectionType::Snowflake => "snowflake",
            ConnectionType::Bigquery => "bigquery",
            ConnectionType::Saas => "saas",
            ConnectionType::Manual => "manual",
            ConnectionType::GenericErasureEmail => "generic_erasure_email",
            ConnectionType::GenericConsentEmail => "generic_consent_email",
        }
    }

    /// Display name for operator-facing surfaces.
    pub fn human_readable(&self) -> &'static str {
        match self {
            ConnectionType::Postgres => "PostgreSQL",
            ConnectionType::Mysql => "MySQL",
            ConnectionType::Mssql => "Microsoft SQL Server",
            ConnectionType::Mongodb => "MongoDB",
            ConnectionType::Snowflake => "Snowflake",
            ConnectionType::Bigquery => "BigQuery",
            ConnectionType::Saas => "SaaS",
            ConnectionType::Manual => "Manual Process",
            ConnectionType::GenericErasureEmail => "Generic Erasure Email",
            ConnectionType::GenericConsentEmail => "Generic Consent Email",
        }
    }

    /// The database-backed types (excludes saas/manual/email).
    pub fn database_types() -> &'static [ConnectionType] {
        &[
            ConnectionType::Bigquery,
            ConnectionType::Mongodb,
            ConnectionType::Mssql,
            ConnectionType::Mysql,
            ConnectionType::Postgres,
            ConnectionType::Snowflake,
        ]
    }

    /// Secret field names a database type needs to authenticate, in display
    /// order.
    pub fn secret_fields(&self) -> &'static [&'static str] {
        match self {
            ConnectionType::Postgres | ConnectionType::Mysql | ConnectionType::Mssql => {
                &["host", "port", "username", "password", "dbname"]
            }
            ConnectionType::Mongodb => &["host", "port", "username", "password", "defaultauthdb"],
            ConnectionType::Snowflake => &[
                "account_identifier",
                "user_login_name",
                "password",
                "warehouse_name",
                "database_name",
            ],
            ConnectionType::Bigquery => &["keyfile_creds", "dataset"],
            ConnectionType::Saas
            | ConnectionType::Manual
            | ConnectionType::GenericErasureEmail
            | ConnectionType::GenericConsentEmail => &[],
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Broad category a connection type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
    /// Relational or document database.
    Database,
    /// SaaS API.
    Saas,
    /// Human-fulfilled process.
    Manual,
    /// Email-based request.
    Email,
}

/// One row of the connection-type listing exposed to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSystemTypeMap {
    /// Type identifier ("postgres", "mailchimp", ...).
    pub identifier: String,
    /// Category.
    pub system_type: SystemType,
    /// Display name.
    pub human_readable: String,
    /// Base64-encoded icon for SaaS types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_icon: Option<String>,
}

/// Requested connection type does not exist in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoSuchConnectionTypeError(pub String);

impl fmt::Display for NoSuchConnectionTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no connection type found with name '{}'", self.0)
    }
}

impl std::error::Error for NoSuchConnectionTypeError {}

/// The process-wide catalog of connector types.
#[derive(Debug, Default)]
pub struct ConnectorRegistry {
    templates: BTreeMap<String, ConnectorTemplate>,
}

impl ConnectorRegistry {
    /// An empty registry (built-in types only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a SaaS connector template, replacing any prior one with the
    /// same identifier.
    pub fn register_template(&mut self, template: ConnectorTemplate) {
        self.templates.insert(template.identifier.clone(), template);
    }

    /// Registered SaaS type identifiers, sorted ascending.
    pub fn connector_types(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    /// Look up one SaaS template.
    pub fn get_connector_template(&self, identifier: &str) -> Option<&ConnectorTemplate> {
        self.templates.get(identifier)
    }

    /// List available connection types, optionally filtered by a substring
    /// search, a system-type category, and the action types they must
    /// support. Ordering is deterministic: databases, then SaaS, then
    /// manual, then email, each section ascending by identifier.
    pub fn connection_types(
        &self,
        search: Option<&str>,
        system_type: Option<SystemType>,
        action_types: &BTreeSet<ActionType>,
    ) -> Vec<ConnectionSystemTypeMap> {
        let is_match = |identifier: &str| {
            search
                .map(|s| identifier.to_lowercase().contains(&s.to_lowercase()))
                .unwrap_or(true)
        };

        let mut out = Vec::new();

        let wants_database = matches!(system_type, None | Some(SystemType::Database));
        if wants_database
            && (action_types.contains(&ActionType::Access)
                || action_types.contains(&ActionType::Erasure))
        {
            for db_type in ConnectionType::database_types() {
                if is_match(db_type.identifier()) {
                    out.push(ConnectionSystemTypeMap {
                        identifier: db_type.identifier().to_string(),
                        system_type: SystemType::Database,
                        human_readable: db_type.human_readable().to_string(),
                        encoded_icon: None,
                    });
                }
            }
        }

        if matches!(system_type, None | Some(SystemType::Saas)) {
            for (identifier, template) in &self.templates {
                let supported = (action_types.contains(&ActionType::Access)
                    && template.config.supports_access())
                    || (action_types.contains(&ActionType::Erasure)
                        && template.config.supports_erasure())
                    || (action_types.contains(&ActionType::Consent)
                        && template.config.supports_consent());
                if supported && is_match(identifier) {
                    out.push(ConnectionSystemTypeMap {
                        identifier: identifier.clone(),
                        system_type: SystemType::Saas,
                        human_readable: template.human_readable.clone(),
                        encoded_icon: template.icon.clone(),
                    });
                }
            }
        }

        // Manual processes can only satisfy access-style retrieval.
        if matches!(system_type, None | Some(SystemType::Manual))
            && action_types.contains(&ActionType::Access)
            && is_match(ConnectionType::Manual.identifier())
        {
            out.push(ConnectionSystemTypeMap {
                identifier: ConnectionType::Manual.identifier().to_string(),
                system_type: SystemType::Manual,
                human_readable: ConnectionType::Manual.human_readable().to_string(),
                encoded_icon: None,
            });
        }

        if matches!(system_type, None | Some(SystemType::Email)) {
            let mut email_types = Vec::new();
            if action_types.contains(&ActionType::Consent) {
                email_types.push(ConnectionType::GenericConsentEmail);
            }
            if action_types.contains(&ActionType::Erasure) {
                email_types.push(ConnectionType::GenericErasureEmail);
            }
            email_types.sort_by_key(|t| t.identifier());
            for email_type in email_types {
                if is_match(email_type.identifier()) {
                    out.push(ConnectionSystemTypeMap {
                        identifier: email_type.identifier().to_string(),
                        system_type: SystemType::Email,
                        human_readable: email_type.human_readable().to_string(),
                        encoded_icon: None,
                    });
                }
            }
        }

        out
    }

    /// Secret field *names* a connection type needs, in display order. For
    /// SaaS types, connector params come before external references.
    pub fn secret_schema(
        &self,
        connection_type: &str,
    ) -> Result<Vec<String>, NoSuchConnectionTypeError> {
        for db_type in ConnectionType::database_types() {
            if db_type.identifier() == connection_type {
                return Ok(db_type
                    .secret_fields()
                    .iter()
                    .map(|s| s.to_string())
                    .collect());
            }
        }
        self.templates
            .get(connection_type)
            .map(|t| t.config.secret_field_order())
            .ok_or_else(|| NoSuchConnectionTypeError(connection_type.to_string()))
    }
}
