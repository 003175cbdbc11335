//! Checked-in mirror of the Envoy message surface Gatescan speaks.
//!
//! Only the fields and services the gateway actually uses are mirrored; tags
//! and service paths match the upstream protos so the messages stay
//! wire-compatible with Envoy. Server glue follows the tonic generated
//! layout (server side only; the gateway never dials these services).
//!
//! Modules map to upstream proto packages:
//! - [`core`]: `envoy.config.core.v3` + `envoy.type.v3` fragments
//! - [`ext_proc`]: `envoy.service.ext_proc.v3`
//! - [`discovery`]: `envoy.service.discovery.v3` + `envoy.service.secret.v3`
//! - [`tls`]: `envoy.extensions.transport_sockets.tls.v3`

pub mod core;
pub mod discovery;
pub mod ext_proc;
pub mod tls;

/// `type_url` carried by SDS secret resources.
pub const SECRET_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";
