//! `envoy.extensions.transport_sockets.tls.v3` secret payloads.

use crate::core;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TlsCertificate {
    /// Leaf followed by the intermediate, PEM concatenated.
    #[prost(message, optional, tag = "1")]
    pub certificate_chain: ::core::option::Option<core::DataSource>,
    #[prost(message, optional, tag = "2")]
    pub private_key: ::core::option::Option<core::DataSource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Secret {
    /// SNI hostname the proxy asked for.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(oneof = "secret::Type", tags = "2")]
    pub r#type: ::core::option::Option<secret::Type>,
}
/// Nested message and enum types in `Secret`.
pub mod secret {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "2")]
        TlsCertificate(super::TlsCertificate),
    }
}
