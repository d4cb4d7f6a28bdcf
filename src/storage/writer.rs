//! Append writer — single async task that serialises all producers'
//! appends into one sequential write stream.
//!
//! ```text
//! producer ─┐
//! producer ─┤       mpsc
//! producer ─┼────→ channel ────→  append writer task
//! ...       ─┘                         │
//!                                      ▼
//!                             chunk files "1", "1001", …
//! ```
//!
//! The store itself is single-writer; this module is the serialisation
//! layer for applications with concurrent producers. Each producer sends
//! an [`AppendRequest`] through a bounded `mpsc` channel and the writer
//! drains it in order. Reads go through the [`SharedStore`] handle.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::storage::chunk::ChunkStore;
use crate::storage::chunked::ChunkedStore;

/// Payload sent by producers to the append writer.
#[derive(Debug)]
pub struct AppendRequest {
    pub value: Vec<u8>,
}

/// Shared handle through which producers and readers can query the store.
pub type SharedStore<C> = Arc<RwLock<ChunkedStore<C>>>;

/// Create the writer channel and spawn the writer task.
///
/// Returns:
///   - `mpsc::Sender<AppendRequest>` — hand out clones to each producer.
///   - [`SharedStore`] — handle for point/range reads and status.
///   - `JoinHandle` for the writer task; it exits once every sender is
///     dropped and the channel drains.
pub fn spawn_writer<C>(
    store: ChunkedStore<C>,
    channel_bound: usize,
) -> (
    mpsc::Sender<AppendRequest>,
    SharedStore<C>,
    tokio::task::JoinHandle<()>,
)
where
    C: ChunkStore + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel::<AppendRequest>(channel_bound);
    let shared = Arc::new(RwLock::new(store));
    let store_clone = shared.clone();

    let handle = tokio::spawn(async move {
        writer_loop(store_clone, rx).await;
    });

    (tx, shared, handle)
}

async fn writer_loop<C>(store: SharedStore<C>, mut rx: mpsc::Receiver<AppendRequest>)
where
    C: ChunkStore + Send + Sync + 'static,
{
    info!("append writer started");

    while let Some(req) = rx.recv().await {
        let mut guard = store.write();
        match guard.append(&req.value) {
            Ok(key) => {
                debug!(key, bytes = req.value.len(), "record appended");
            }
            Err(e) => {
                error!(error = %e, "failed to append record");
            }
        }
    }

    info!("append writer shutting down (channel closed)");
}
