use tokio::sync::mpsc;

use crate::background::BackgroundTasks;
use crate::upstream_client::UpstreamChunk;

pub const CLIENT_CHANNEL_CAPACITY: usize = 32;

/// Two independent readers over one upstream body.
#[derive(Debug)]
pub struct TeeReceivers {
    /// Bounded: a slow caller slows the upstream read, as without a tee.
    pub client: mpsc::Receiver<UpstreamChunk>,
    /// Unbounded: the observer can never hold up the client.
    pub observer: mpsc::UnboundedReceiver<UpstreamChunk>,
}

/// Reads `source` once and hands every chunk to both receivers.
///
/// Either side may be dropped early; the pump keeps feeding the other one
/// and stops only when both are gone or the source ends.
pub fn tee(mut source: mpsc::Receiver<UpstreamChunk>, tasks: &BackgroundTasks) -> TeeReceivers {
    let (client_tx, client_rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
    let (observer_tx, observer_rx) = mpsc::unbounded_channel();

    tasks.spawn(async move {
        let mut client_open = true;
        let mut observer_open = true;
        while let Some(chunk) = source.recv().await {
            if observer_open && observer_tx.send(chunk.clone()).is_err() {
                observer_open = false;
            }
            if client_open && client_tx.send(chunk).await.is_err() {
                client_open = false;
            }
            if !client_open && !observer_open {
                break;
            }
        }
    });

    TeeReceivers {
        client: client_rx,
        observer: observer_rx,
    }
}
