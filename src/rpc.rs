//! Client side of the wire protocol: one TCP connection per call, request
//! then response, then close. Transient failures (timeout, refused, empty
//! read, undecodable reply) are retried with exponential backoff before a
//! typed error reaches the caller; the caller decides policy from there.

use std::io;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::protocol::{
    Command, FindSuccessorResponse, NotifyResponse, OpResponse, PingResponse,
    PredecessorResponse, RetrieveResponse, MAX_FRAME_BYTES,
};
use crate::utils::config::Config;
use crate::utils::types::{Address, HashPos};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("could not connect to {addr}: {source}")]
    Connect { addr: Address, source: io::Error },
    #[error("request to {addr} timed out")]
    Timeout { addr: Address },
    #[error("i/o error talking to {addr}: {source}")]
    Io { addr: Address, source: io::Error },
    #[error("empty response from {addr}")]
    EmptyResponse { addr: Address },
    #[error("malformed response from {addr}: {source}")]
    Decode {
        addr: Address,
        source: serde_json::Error,
    },
    #[error("could not encode request: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Sends `command` to `addr` and decodes the reply, retrying up to
/// `config.max_retries` attempts with exponential backoff in between.
pub async fn call<C, R>(addr: &Address, command: &C, config: &Config) -> Result<R, RpcError>
where
    C: Serialize,
    R: DeserializeOwned,
{
    let payload = serde_json::to_vec(command).map_err(RpcError::Encode)?;

    let mut delay = config.retry_delay;
    let mut last_error = RpcError::Timeout { addr: addr.clone() };

    for attempt in 1..=config.max_retries {
        match call_once(addr, &payload, config).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = RpcError::Decode {
                        addr: addr.clone(),
                        source: e,
                    }
                }
            },
            Err(e) => last_error = e,
        }
        debug!("Attempt {attempt} against {addr} failed: {last_error}");
        if attempt < config.max_retries {
            sleep(delay).await;
            delay *= config.backoff_factor;
        }
    }
    Err(last_error)
}

async fn call_once(addr: &Address, payload: &[u8], config: &Config) -> Result<Vec<u8>, RpcError> {
    let connect = TcpStream::connect((addr.host.as_str(), addr.port));
    let mut stream = match timeout(config.connection_timeout, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(RpcError::Connect {
                addr: addr.clone(),
                source: e,
            })
        }
        Err(_) => return Err(RpcError::Timeout { addr: addr.clone() }),
    };

    let exchange = async {
        stream.write_all(payload).await?;
        // half-close so the server sees the end of the request
        stream.shutdown().await?;
        read_frame(&mut stream).await
    };

    let bytes = match timeout(config.connection_timeout, exchange).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            return Err(RpcError::Io {
                addr: addr.clone(),
                source: e,
            })
        }
        Err(_) => return Err(RpcError::Timeout { addr: addr.clone() }),
    };

    if bytes.is_empty() {
        return Err(RpcError::EmptyResponse { addr: addr.clone() });
    }
    Ok(bytes)
}

/// Reads one frame: everything until EOF, capped at MAX_FRAME_BYTES.
pub(crate) async fn read_frame(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= MAX_FRAME_BYTES {
            buf.truncate(MAX_FRAME_BYTES);
            break;
        }
    }
    Ok(buf)
}

/// Liveness probe. A peer is alive iff it answers a ping with
/// `{"status": "alive"}` in time; probing yourself is always true. This is
/// the one call that swallows its errors, by contract.
pub async fn ping_node(addr: &Address, self_addr: &Address, config: &Config) -> bool {
    if addr == self_addr {
        return true;
    }
    match call::<_, PingResponse>(addr, &Command::Ping, config).await {
        Ok(response) => response.is_alive(),
        Err(e) => {
            debug!("Liveness probe of {addr} failed: {e}");
            false
        }
    }
}

pub async fn remote_find_successor(
    addr: &Address,
    id: HashPos,
    config: &Config,
) -> Result<Address, RpcError> {
    let response: FindSuccessorResponse =
        call(addr, &Command::FindSuccessor { id }, config).await?;
    Ok(response.successor)
}

pub async fn remote_get_predecessor(
    addr: &Address,
    config: &Config,
) -> Result<Option<Address>, RpcError> {
    let response: PredecessorResponse = call(addr, &Command::GetPredecessor, config).await?;
    Ok(response.predecessor)
}

pub async fn remote_notify(
    addr: &Address,
    candidate: &Address,
    config: &Config,
) -> Result<NotifyResponse, RpcError> {
    call(
        addr,
        &Command::Notify {
            predecessor: candidate.clone(),
        },
        config,
    )
    .await
}

pub async fn remote_store_key(
    addr: &Address,
    key: &str,
    value: &str,
    config: &Config,
) -> Result<OpResponse, RpcError> {
    call(
        addr,
        &Command::StoreKey {
            key: key.to_owned(),
            value: value.to_owned(),
        },
        config,
    )
    .await
}

pub async fn remote_retrieve_key(
    addr: &Address,
    key: &str,
    config: &Config,
) -> Result<RetrieveResponse, RpcError> {
    call(
        addr,
        &Command::RetrieveKey {
            key: key.to_owned(),
        },
        config,
    )
    .await
}

pub async fn remote_delete_key(
    addr: &Address,
    key: &str,
    config: &Config,
) -> Result<OpResponse, RpcError> {
    call(
        addr,
        &Command::DeleteKey {
            key: key.to_owned(),
        },
        config,
    )
    .await
}
