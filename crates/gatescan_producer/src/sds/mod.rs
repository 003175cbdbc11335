//! On-demand secret discovery: per-SNI leaf certificates signed by the
//! intermediate CA, with an LRU+TTL cache in front of key generation.

mod issuer;
mod service;

pub use issuer::{CertAuthority, IssuedCert};
pub use service::SdsService;
