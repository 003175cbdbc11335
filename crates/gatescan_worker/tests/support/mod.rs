//! Test support: an in-process INSTREAM daemon stub.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const EICAR_BODY: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

pub struct StubEngine {
    /// `tcp://…` URL for EngineClient::new.
    pub url: String,
    pub reloads: Arc<AtomicUsize>,
}

/// Spawn a daemon stub that speaks just enough INSTREAM/PING/RELOAD for the
/// worker: bodies containing the EICAR marker come back `FOUND`.
pub async fn spawn_stub_engine() -> StubEngine {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let reloads = Arc::new(AtomicUsize::new(0));

    let accept_reloads = Arc::clone(&reloads);
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(handle_conn(sock, Arc::clone(&accept_reloads)));
        }
    });

    StubEngine {
        url: format!("tcp://{addr}"),
        reloads,
    }
}

async fn handle_conn(mut sock: TcpStream, reloads: Arc<AtomicUsize>) {
    let mut command = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match sock.read(&mut byte).await {
            Ok(0) | Err(_) => return,
            Ok(_) if byte[0] == 0 => break,
            Ok(_) => command.push(byte[0]),
        }
    }

    match command.as_slice() {
        b"zPING" => {
            let _ = sock.write_all(b"PONG\0").await;
        }
        b"zRELOAD" => {
            reloads.fetch_add(1, Ordering::SeqCst);
            let _ = sock.write_all(b"RELOADING\0").await;
        }
        b"zINSTREAM" => {
            let mut body = Vec::new();
            loop {
                let mut len_buf = [0u8; 4];
                if sock.read_exact(&mut len_buf).await.is_err() {
                    return;
                }
                let len = u32::from_be_bytes(len_buf) as usize;
                if len == 0 {
                    break;
                }
                let mut chunk = vec![0u8; len];
                if sock.read_exact(&mut chunk).await.is_err() {
                    return;
                }
                body.extend_from_slice(&chunk);
            }
            let reply: &[u8] = if contains_eicar(&body) {
                b"stream: Eicar-Test-Signature FOUND\0"
            } else {
                b"stream: OK\0"
            };
            let _ = sock.write_all(reply).await;
        }
        _ => {}
    }
}

fn contains_eicar(body: &[u8]) -> bool {
    let marker = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";
    body.windows(marker.len()).any(|window| window == marker)
}
