//! Sink actor - the chunked pull engine
//!
//! The sink owns the active emitters and drives them on demand: one parked
//! consumer pull buys `chunk_size` element-task launches. Completions
//! accumulate until the chunk fills or the stream drains. Every launched
//! element carries an obligation guard, so the in-flight count stays
//! accurate across node hops, crashes and dropped worker queues.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use contracts::{ChunkReply, Element, EmitFn, EmitScope, Emitter, NodeCtx, SinkMsg, SinkRef};
use observability::{
    record_active_emitters, record_chunk_delivered, record_element_aborted, record_element_done,
};

use crate::metrics::StreamMetrics;

pub(crate) struct SinkCore {
    node: NodeCtx,
    sink_ref: SinkRef,
    default_emit: Arc<dyn EmitFn>,
    emitters: VecDeque<Emitter>,
    buffer: Vec<Element>,
    pending: Option<tokio::sync::oneshot::Sender<ChunkReply>>,
    /// Launches still owed to the parked pull
    launch_budget: usize,
    /// Launched element obligations not yet settled
    in_flight: usize,
    chunk_size: usize,
    done_timeout: Duration,
    /// Armed while a pull is parked and no emitter is active
    quiesce_at: Option<Instant>,
    metrics: Arc<StreamMetrics>,
}

impl SinkCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node: NodeCtx,
        sink_ref: SinkRef,
        default_emit: Arc<dyn EmitFn>,
        source: Box<dyn Iterator<Item = Element> + Send>,
        chunk_size: usize,
        done_timeout: Duration,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        let mut emitters = VecDeque::new();
        emitters.push_back(Emitter {
            source,
            emit_fn: None,
        });
        Self {
            node,
            sink_ref,
            default_emit,
            emitters,
            buffer: Vec::new(),
            pending: None,
            launch_budget: 0,
            in_flight: 0,
            chunk_size,
            done_timeout,
            quiesce_at: None,
            metrics,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SinkMsg>) {
        debug!(sink = ?self.sink_ref, chunk_size = self.chunk_size, "sink started");

        loop {
            let stop = tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => true,
                },
                _ = quiesce_wait(self.quiesce_at), if self.quiesce_at.is_some() => {
                    self.on_quiesce()
                }
            };
            if stop {
                break;
            }
        }

        self.node.unregister_sink(self.sink_ref.sink);
        debug!(sink = ?self.sink_ref, "sink stopped");
    }

    fn handle(&mut self, msg: SinkMsg) -> bool {
        match msg {
            SinkMsg::Next { reply } => {
                debug_assert!(self.pending.is_none(), "at most one outstanding pull");
                self.pending = Some(reply);
                self.launch_budget = self.chunk_size;
                self.drive();
                self.try_flush();
                self.update_quiesce();
                false
            }
            SinkMsg::InjectElems(elements) => {
                self.metrics.add_injected(elements.len() as u64);
                self.emitters.push_back(Emitter::from_elems(elements));
                self.drive();
                self.update_quiesce();
                false
            }
            SinkMsg::RegisterEmitter(emitter) => {
                self.emitters.push_back(emitter);
                self.drive();
                self.update_quiesce();
                false
            }
            SinkMsg::Done(element) => {
                self.metrics.inc_done();
                record_element_done();
                self.buffer.push(element);
                self.try_flush();
                self.update_quiesce();
                false
            }
            SinkMsg::TaskFinished { completed } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if !completed {
                    self.metrics.inc_aborted();
                    record_element_aborted();
                    warn!(sink = ?self.sink_ref, "element task aborted before completion");
                    if self.pending.is_some() {
                        // Refill the lost slot so the parked pull can still
                        // fill its chunk from the remaining source.
                        self.launch_budget += 1;
                        self.drive();
                    }
                }
                self.update_quiesce();
                false
            }
            SinkMsg::Shutdown => {
                debug!(sink = ?self.sink_ref, "consumer abandoned stream");
                true
            }
        }
    }

    /// Launch element tasks head-first until the pull's budget is spent or
    /// no emitter remains. An emitter producing less than asked is
    /// exhausted and removed.
    fn drive(&mut self) {
        if self.pending.is_none() {
            return;
        }
        while self.launch_budget > 0 {
            let Some(mut emitter) = self.emitters.pop_front() else {
                break;
            };
            let asked = self.launch_budget;
            let launched = self.launch_from(&mut emitter, asked);
            self.launch_budget -= launched;
            self.in_flight += launched;
            self.metrics.add_launched(launched as u64);
            if launched == asked {
                self.emitters.push_front(emitter);
            }
        }
    }

    fn launch_from(&self, emitter: &mut Emitter, n: usize) -> usize {
        let emit_fn = emitter
            .emit_fn
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.default_emit));
        for launched in 0..n {
            match emitter.source.next() {
                Some(element) => self.spawn_task(element, Arc::clone(&emit_fn)),
                None => return launched,
            }
        }
        n
    }

    /// Spawn one element task. The scope owns the element's obligation; a
    /// panicking routine drops it unsettled, which reports the abort.
    fn spawn_task(&self, element: Element, emit_fn: Arc<dyn EmitFn>) {
        let scope = EmitScope::new(self.node.clone(), self.sink_ref.clone());
        tokio::spawn(async move {
            match emit_fn.emit(&scope, element).await {
                Ok(()) => scope.settle(true),
                Err(e) => {
                    warn!(error = %e, "emit routine failed; element aborted");
                    scope.settle(false);
                }
            }
        });
    }

    fn try_flush(&mut self) {
        if self.buffer.len() < self.chunk_size {
            return;
        }
        if let Some(reply) = self.pending.take() {
            let chunk: Vec<Element> = self.buffer.drain(..self.chunk_size).collect();
            self.metrics.inc_chunks();
            record_chunk_delivered(chunk.len());
            let _ = reply.send(ChunkReply::Chunk(chunk));
        }
    }

    /// Arm the quiescence window exactly when a pull is parked with no
    /// active emitter; clear it otherwise.
    fn update_quiesce(&mut self) {
        record_active_emitters(self.emitters.len());
        if self.pending.is_some() && self.emitters.is_empty() {
            if self.quiesce_at.is_none() {
                self.quiesce_at = Some(Instant::now() + self.done_timeout);
            }
        } else {
            self.quiesce_at = None;
        }
    }

    /// The quiet window elapsed. Late emitters revive the stream; buffered
    /// completions go out as a partial chunk; outstanding obligations keep
    /// the stream alive (their settlement re-arms the window); otherwise
    /// the stream halts.
    fn on_quiesce(&mut self) -> bool {
        self.quiesce_at = None;
        if self.pending.is_none() {
            return false;
        }
        if !self.emitters.is_empty() {
            self.drive();
            self.update_quiesce();
            return false;
        }
        if !self.buffer.is_empty() {
            let reply = self.pending.take().expect("pull parked");
            let chunk: Vec<Element> = self.buffer.drain(..).collect();
            self.metrics.inc_chunks();
            record_chunk_delivered(chunk.len());
            let _ = reply.send(ChunkReply::Chunk(chunk));
            return false;
        }
        if self.in_flight > 0 {
            return false;
        }

        let reply = self.pending.take().expect("pull parked");
        let _ = reply.send(ChunkReply::Halt);
        info!(
            sink = ?self.sink_ref,
            done = self.metrics.done(),
            aborted = self.metrics.aborted(),
            "stream drained; halting"
        );
        true
    }
}

async fn quiesce_wait(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
