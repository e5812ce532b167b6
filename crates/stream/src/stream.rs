//! ElementStream - the consumer-facing lazy chunk sequence
//!
//! One stream handle per pipeline run. The consumer pulls chunks with
//! `next_chunk`; `None` means the stream has drained (HALT). Dropping the
//! handle tears the sink down best-effort; in-flight tasks may complete
//! into the dead sink and drop silently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

use contracts::{ChunkReply, Element, EmitFn, Emitter, NodeCtx, SinkMsg, SinkRef, StreamSettings};

use crate::metrics::StreamMetrics;
use crate::sink::SinkCore;

/// Stream pacing options
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Element tasks launched per pull
    pub chunk_size: usize,

    /// Quiet window after the last emitter drains before HALT
    pub done_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            done_timeout: Duration::from_millis(200),
        }
    }
}

impl From<&StreamSettings> for StreamOptions {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            done_timeout: Duration::from_millis(settings.done_timeout_ms),
        }
    }
}

/// Handle to a running stream
pub struct ElementStream {
    tx: mpsc::UnboundedSender<SinkMsg>,
    node: NodeCtx,
    sink: SinkRef,
    metrics: Arc<StreamMetrics>,
    halted: bool,
}

impl ElementStream {
    /// Launch a stream over `source` on `node`
    ///
    /// `emit_fn` runs once per element as an independent task; it is the
    /// sink's default routine for injected elements too.
    #[instrument(name = "stream_start", skip(node, source, emit_fn), fields(node = %node.id()))]
    pub fn start(
        node: NodeCtx,
        source: impl Iterator<Item = Element> + Send + 'static,
        emit_fn: Arc<dyn EmitFn>,
        options: StreamOptions,
    ) -> Self {
        assert!(options.chunk_size >= 1, "chunk_size must be >= 1");

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = node.register_sink(tx.clone());
        let metrics = Arc::new(StreamMetrics::new());

        let core = SinkCore::new(
            node.clone(),
            sink.clone(),
            emit_fn,
            Box::new(source),
            options.chunk_size,
            options.done_timeout,
            Arc::clone(&metrics),
        );
        tokio::spawn(core.run(rx));

        Self {
            tx,
            node,
            sink,
            metrics,
            halted: false,
        }
    }

    /// Pull the next chunk; `None` once the stream has halted
    pub async fn next_chunk(&mut self) -> Option<Vec<Element>> {
        if self.halted {
            return None;
        }
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SinkMsg::Next { reply }).is_err() {
            self.halted = true;
            return None;
        }
        match rx.await {
            Ok(ChunkReply::Chunk(chunk)) => Some(chunk),
            Ok(ChunkReply::Halt) | Err(_) => {
                self.halted = true;
                None
            }
        }
    }

    /// Inject additional elements; they run the sink's default emit routine
    pub fn emit(&self, elements: Vec<Element>) {
        let _ = self.tx.send(SinkMsg::InjectElems(elements));
    }

    /// Register an externally-constructed emitter as-is
    pub fn register_emitter(&self, emitter: Emitter) {
        let _ = self.tx.send(SinkMsg::RegisterEmitter(emitter));
    }

    /// Cluster-wide address of this stream's sink
    pub fn sink_ref(&self) -> &SinkRef {
        &self.sink
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    /// Drain the whole stream into one vector (tests and small runs)
    pub async fn collect_all(mut self) -> Vec<Element> {
        let mut all = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            all.extend(chunk);
        }
        all
    }
}

impl Drop for ElementStream {
    fn drop(&mut self) {
        if !self.halted {
            let _ = self.tx.send(SinkMsg::Shutdown);
        }
        self.node.unregister_sink(self.sink.sink);
    }
}
