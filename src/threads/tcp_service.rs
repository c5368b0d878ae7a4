use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};

use crate::node::ChordNode;
use crate::protocol::{Command, OpResponse, Response};
use crate::rpc::read_frame;

/// Accept loop. Admission is bounded by a fixed pool of permits; when all
/// handlers are busy the connection is closed immediately with no
/// response, there is no queue. Runs until the process exits.
pub async fn serve(node: Arc<ChordNode>, listener: TcpListener) {
    let permits = Arc::new(Semaphore::new(node.config().max_concurrent_handlers));
    info!("Serving requests on {}", node.addr());

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Accept failed: {e}");
                sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        match permits.clone().try_acquire_owned() {
            Ok(permit) => {
                let node = node.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    handle_connection(socket, node).await;
                });
            }
            Err(_) => {
                debug!("Handler pool full, dropping connection from {peer}");
            }
        }
    }
}

/// One request, one response, close. The whole exchange runs under the
/// handler deadline. Empty reads are closed silently; anything that is not
/// a recognized command is answered with an Invalid command error.
async fn handle_connection(mut socket: TcpStream, node: Arc<ChordNode>) {
    let deadline = node.config().handler_deadline;
    let served = timeout(deadline, async {
        let bytes = match read_frame(&mut socket).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Failed to read request: {e}");
                return;
            }
        };
        if bytes.is_empty() {
            return;
        }

        let response = match serde_json::from_slice::<Command>(&bytes) {
            Ok(command) => node.handle(command).await,
            Err(e) => {
                debug!("Undecodable request: {e}");
                Response::Op(OpResponse::invalid_command())
            }
        };

        match serde_json::to_vec(&response) {
            Ok(encoded) => {
                if let Err(e) = socket.write_all(&encoded).await {
                    debug!("Failed to write response: {e}");
                    return;
                }
                let _ = socket.shutdown().await;
            }
            Err(e) => error!("Failed to encode response: {e}"),
        }
    })
    .await;

    if served.is_err() {
        warn!("Request handling timed out");
    }
}
