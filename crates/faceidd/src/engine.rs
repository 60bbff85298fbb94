use axum::body::Bytes;
use faceid_core::{decode_image, Descriptor, EmbedderError, FaceEmbedder};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
    #[error("engine did not reply within {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Embed {
        image: Bytes,
        reply: oneshot::Sender<Result<Option<Descriptor>, EmbedderError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
    descriptor_len: usize,
}

impl EngineHandle {
    /// Decode an uploaded image and embed its first face.
    ///
    /// `Ok(None)` means the image decoded but contains no face.
    pub async fn embed(&self, image: Bytes) -> Result<Option<Descriptor>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Embed {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;

        let reply = tokio::time::timeout(self.timeout, reply_rx)
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply?)
    }

    /// Length of the descriptors the loaded provider produces.
    pub fn descriptor_len(&self) -> usize {
        self.descriptor_len
    }
}

/// Spawn the engine on a dedicated OS thread that owns the embedder.
///
/// Decoding and inference are CPU-bound, so they never run on the async
/// runtime; requests are processed one at a time in arrival order.
pub fn spawn_engine<E>(
    mut embedder: E,
    queue: usize,
    timeout: Duration,
) -> Result<EngineHandle, EngineError>
where
    E: FaceEmbedder + Send + 'static,
{
    let descriptor_len = embedder.descriptor_len();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue.max(1));

    std::thread::Builder::new()
        .name("faceid-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Embed { image, reply } => {
                        let result = decode_image(&image)
                            .and_then(|decoded| embedder.detect_and_embed(&decoded));
                        if reply.send(result).is_err() {
                            tracing::debug!("embed requester went away before the reply");
                        }
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        tx,
        timeout,
        descriptor_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png, FakeEmbedder, BLACK, RED};

    fn engine() -> EngineHandle {
        spawn_engine(FakeEmbedder, 4, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_embed_returns_descriptor() {
        let handle = engine();
        let descriptor = handle.embed(png(RED)).await.unwrap().unwrap();
        assert_eq!(descriptor.as_slice(), &[1.0, 0.0, 0.0]);
        assert_eq!(handle.descriptor_len(), 3);
    }

    #[tokio::test]
    async fn test_embed_no_face() {
        let handle = engine();
        assert!(handle.embed(png(BLACK)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_embed_rejects_undecodable_bytes() {
        let handle = engine();
        let err = handle.embed(Bytes::from_static(b"GIF? no")).await.unwrap_err();
        assert!(matches!(err, EngineError::Embedder(EmbedderError::Decode(_))));
    }

    #[tokio::test]
    async fn test_handles_share_one_engine() {
        let handle = engine();
        let clones: Vec<_> = (0..8).map(|_| handle.clone()).collect();
        let mut set = tokio::task::JoinSet::new();
        for h in clones {
            set.spawn(async move { h.embed(png(RED)).await });
        }
        while let Some(res) = set.join_next().await {
            assert!(res.unwrap().unwrap().is_some());
        }
    }
}
