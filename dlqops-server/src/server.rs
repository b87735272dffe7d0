use crate::context::AppContext;
use crate::router;
use bytes::Bytes;
use dlqops_core::ipc::{OpsRequest, OpsResponse};
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub async fn run_unix_server(
    socket_path: &str,
    ctx: Arc<AppContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let ctx = ctx.clone();
                tokio::spawn(handle_connection(stream, ctx));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// Serve one client: 4-byte little-endian length prefix + MessagePack payload, one
/// response frame per request frame.
async fn handle_connection(stream: UnixStream, ctx: Arc<AppContext>) {
    let (read, write) = stream.into_split();
    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(bytes_mut) => bytes_mut,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<OpsRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &ctx).await,
            Err(e) => OpsResponse::err(format!("Deserialization error: {}", e)),
        };

        match rmp_serde::to_vec_named(&response) {
            Ok(resp_bytes) => {
                if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
                    tracing::error!("Failed to send response: {}", e);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                break;
            }
        }
    }
}
