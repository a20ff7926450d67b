//! Isolated render thread
//!
//! The thread is spawned on the first submitted job and then parked between
//! jobs. Requests and responses travel through capacity-1 rings: the worker
//! has no queue, the caller is expected to wait for each response before
//! submitting again.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use rtrb::{Consumer, Producer, RingBuffer};

use super::{render, RenderFailure, RenderRequest, RenderResponse};
use crate::evaluator::Engine;

struct WorkerContext {
    requests: Producer<RenderRequest>,
    responses: Consumer<RenderResponse>,
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Handle to the offline render thread.
pub struct RenderWorker<E: Engine> {
    engine: Arc<E>,
    context: Option<WorkerContext>,
}

impl<E: Engine> RenderWorker<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            context: None,
        }
    }

    #[cfg(test)]
    fn is_started(&self) -> bool {
        self.context.is_some()
    }

    /// Hand a job to the render thread, starting it if needed.
    ///
    /// Fails if the thread cannot be spawned or a previous job is still
    /// waiting to be picked up.
    pub fn submit(&mut self, request: RenderRequest) -> Result<(), RenderFailure> {
        let context = match self.context.take() {
            Some(context) => context,
            None => spawn(self.engine.clone())?,
        };
        let context = self.context.insert(context);

        context
            .requests
            .push(request)
            .map_err(|_| RenderFailure::WorkerUnavailable("a render job is already pending".into()))?;
        context.thread.thread().unpark();
        Ok(())
    }

    /// Take the finished response, if one is ready.
    pub fn try_recv(&mut self) -> Option<RenderResponse> {
        self.context.as_mut()?.responses.pop().ok()
    }
}

impl<E: Engine> Drop for RenderWorker<E> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            context.shutdown.store(true, Ordering::Release);
            context.thread.thread().unpark();
            if context.thread.join().is_err() {
                tracing::warn!("render thread panicked");
            }
        }
    }
}

fn spawn<E: Engine>(engine: Arc<E>) -> Result<WorkerContext, RenderFailure> {
    let (requests, mut inbox) = RingBuffer::<RenderRequest>::new(1);
    let (mut outbox, responses) = RingBuffer::<RenderResponse>::new(1);
    let shutdown = Arc::new(AtomicBool::new(false));

    let thread = thread::Builder::new()
        .name("glitchbox-render".into())
        .spawn({
            let shutdown = shutdown.clone();
            move || {
                tracing::debug!("render thread started");
                while !shutdown.load(Ordering::Acquire) {
                    let Ok(request) = inbox.pop() else {
                        thread::park();
                        continue;
                    };

                    let job = panic::catch_unwind(AssertUnwindSafe(|| render(&*engine, &request)));
                    let response = match job {
                        Ok(result) => RenderResponse::from(result),
                        Err(_) => RenderResponse::Failed(RenderFailure::Panicked),
                    };
                    if let RenderResponse::Failed(failure) = &response {
                        tracing::warn!(%failure, "offline render failed");
                    }
                    if outbox.push(response).is_err() {
                        tracing::warn!("render response dropped, previous one was never collected");
                    }
                }
                tracing::debug!("render thread stopped");
            }
        })
        .map_err(|err| RenderFailure::WorkerUnavailable(err.to_string()))?;

    Ok(WorkerContext {
        requests,
        responses,
        shutdown,
        thread,
    })
}
