//! Reconciliation core for declaratively managed PAN-OS style firewall
//! configuration.
//!
//! Resources are declared as JSON values, validated against a built-in
//! schema, encoded to the device's XML configuration and reconciled against
//! what the device currently holds. The device configuration is shared with
//! other writers, so every reconciler only touches what its resource owns.
//!
//! # Architecture
//!
//! ## Schema & values
//!
//! - [`schema`] — Declarative attribute tables and the built-in resources
//! - [`value`] — Attribute paths and small helpers over declared values
//! - [`location`] — Polymorphic `location` to canonical scope and xpath
//! - [`codec`] — Declared values to wire XML and back, one-of unions included
//!
//! ## Planning
//!
//! - [`validate`] — Structural and value-domain checks, all failures collected
//! - [`plan`] — Default projection and the create/update/replace decision
//! - [`drift`] — Declared versus observed; which fields are authoritative
//! - [`import_id`] — Compose and parse `(type, scope, names)` identifiers
//!
//! ## Reconciliation
//!
//! - [`reconcile`] — Named entries, owned sub-lists (optionally uuid-keyed)
//!   and co-tenant singleton documents
//! - [`transport`] — The CRUD surface consumed from the device, plus an
//!   XML-file-backed [`transport::local::LocalTransport`]
//! - [`provider`] — The orchestrator-facing facade
//!
//! ## Ambient
//!
//! - [`config`] — Provider settings from TOML and the environment
//! - [`error`] — Error taxonomy
//!
//! # Examples
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use panos_reconcile::config::ProviderConfig;
//! use panos_reconcile::provider::Provider;
//! use panos_reconcile::transport::local::LocalTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! let transport = Arc::new(LocalTransport::from_file(Path::new("running-config.xml"))?);
//! let provider = Provider::configure(&ProviderConfig::load(None)?, transport.clone())?;
//! let desired = serde_json::json!({
//!     "name": "web", "location": {"vsys": {}}, "ip_netmask": "10.0.0.1/32"
//! });
//! let (plan, state) = provider.apply("address", Some(&desired), None, &CancellationToken::new())?;
//! println!("{}: {:?}", plan.action, state);
//! transport.save(Path::new("running-config.xml"))?;
//! ```
//!
//! # Built on xml-config-core
//!
//! XML parsing, writing, xpath addressing and tree diffing come from
//! `xml-config-core`. All firewall-specific knowledge lives in this crate.

pub mod codec;
pub mod config;
pub mod drift;
pub mod error;
pub mod import_id;
pub mod location;
pub mod plan;
pub mod provider;
pub mod reconcile;
pub mod schema;
pub mod transport;
pub mod validate;
pub mod value;
