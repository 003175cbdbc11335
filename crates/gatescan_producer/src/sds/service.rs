//! Secret Discovery Service endpoints over the issuer.
//!
//! Supports the state-of-the-world stream, the incremental delta stream and
//! one-shot fetches. Resource names are SNI hostnames; a name that fails to
//! mint is skipped with a log line and never fails the whole response. Key
//! generation is CPU-bound, so responses are built on the blocking pool.

use std::sync::Arc;

use prost::Message;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info};

use gatescan_xds::core::{data_source, DataSource};
use gatescan_xds::discovery::secret_discovery_service_server::SecretDiscoveryService;
use gatescan_xds::discovery::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse, Resource,
};
use gatescan_xds::tls::{secret, Secret, TlsCertificate};
use gatescan_xds::SECRET_TYPE_URL;

use super::issuer::CertAuthority;

pub struct SdsService {
    authority: Arc<CertAuthority>,
}

impl SdsService {
    pub fn new(authority: Arc<CertAuthority>) -> Self {
        Self { authority }
    }
}

/// Packed secret for one SNI name, with the leaf serial as resource version.
fn packed_secret(authority: &CertAuthority, name: &str) -> Option<(prost_types::Any, String)> {
    let issued = match authority.certificate_for(name) {
        Ok(issued) => issued,
        Err(err) => {
            error!("failed to issue certificate for {name}: {err:#}");
            return None;
        }
    };
    let secret = Secret {
        name: name.to_string(),
        r#type: Some(secret::Type::TlsCertificate(TlsCertificate {
            certificate_chain: Some(DataSource {
                specifier: Some(data_source::Specifier::InlineBytes(
                    issued.chain_pem.clone().into_bytes(),
                )),
            }),
            private_key: Some(DataSource {
                specifier: Some(data_source::Specifier::InlineBytes(
                    issued.key_pem.clone().into_bytes(),
                )),
            }),
        })),
    };
    Some((
        prost_types::Any {
            type_url: SECRET_TYPE_URL.to_string(),
            value: secret.encode_to_vec(),
        },
        issued.serial_hex.clone(),
    ))
}

fn build_sotw(authority: &CertAuthority, request: &DiscoveryRequest) -> DiscoveryResponse {
    info!("SDS request for {:?}", request.resource_names);
    let resources = request
        .resource_names
        .iter()
        .filter_map(|name| packed_secret(authority, name).map(|(any, _)| any))
        .collect();
    DiscoveryResponse {
        version_info: "1".to_string(),
        resources,
        type_url: SECRET_TYPE_URL.to_string(),
        nonce: request.response_nonce.clone(),
    }
}

fn build_delta(authority: &CertAuthority, request: &DeltaDiscoveryRequest) -> DeltaDiscoveryResponse {
    info!(
        "SDS delta request for {:?} (unsubscribe {:?})",
        request.resource_names_subscribe, request.resource_names_unsubscribe
    );
    let resources = request
        .resource_names_subscribe
        .iter()
        .filter_map(|name| {
            packed_secret(authority, name).map(|(any, serial)| Resource {
                name: name.clone(),
                version: serial,
                resource: Some(any),
            })
        })
        .collect();
    DeltaDiscoveryResponse {
        system_version_info: "1".to_string(),
        resources,
        nonce: request.response_nonce.clone(),
        removed_resources: request.resource_names_unsubscribe.clone(),
    }
}

#[tonic::async_trait]
impl SecretDiscoveryService for SdsService {
    type StreamSecretsStream = ReceiverStream<Result<DiscoveryResponse, Status>>;
    type DeltaSecretsStream = ReceiverStream<Result<DeltaDiscoveryResponse, Status>>;

    async fn stream_secrets(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamSecretsStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(4);
        let authority = Arc::clone(&self.authority);
        tokio::spawn(async move {
            loop {
                let request = match inbound.message().await {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(status) => {
                        debug!("SDS stream error: {status}");
                        break;
                    }
                };
                let authority = Arc::clone(&authority);
                let built =
                    tokio::task::spawn_blocking(move || build_sotw(&authority, &request)).await;
                let Ok(response) = built else {
                    error!("SDS response build aborted");
                    break;
                };
                if tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn delta_secrets(
        &self,
        request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaSecretsStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(4);
        let authority = Arc::clone(&self.authority);
        tokio::spawn(async move {
            loop {
                let request = match inbound.message().await {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(status) => {
                        debug!("SDS delta stream error: {status}");
                        break;
                    }
                };
                let authority = Arc::clone(&authority);
                let built =
                    tokio::task::spawn_blocking(move || build_delta(&authority, &request)).await;
                let Ok(response) = built else {
                    error!("SDS delta response build aborted");
                    break;
                };
                if tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn fetch_secrets(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        let authority = Arc::clone(&self.authority);
        let request = request.into_inner();
        let response = tokio::task::spawn_blocking(move || build_sotw(&authority, &request))
            .await
            .map_err(|_| Status::internal("secret build failed"))?;
        Ok(Response::new(response))
    }
}
