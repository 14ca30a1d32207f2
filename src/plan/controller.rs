//! The GC controller thread.
//!
//! Every plan manager owns one controller thread. Allocation-triggered collections are posted
//! to it without waiting; forced collections are posted and then waited for. The thread exits
//! once the manager drops its sending end, after finishing every request already queued.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use super::global::PlanState;
use super::CollectionPolicy;
use crate::error::HarnessError;

pub(crate) enum ControllerMessage {
    Collect {
        generation: usize,
        /// Signalled when the collection is over.
        done: Option<Sender<()>>,
    },
}

pub(crate) struct GCController {
    sender: Option<Sender<ControllerMessage>>,
    handle: Option<JoinHandle<()>>,
}

impl GCController {
    pub(crate) fn spawn<P: CollectionPolicy>(state: Arc<PlanState<P>>) -> Result<Self, HarnessError> {
        let (sender, receiver) = channel::unbounded();
        let handle = thread::Builder::new()
            .name(format!("{}-controller", state.name()))
            .spawn(move || Self::run(state, receiver))?;
        Ok(GCController {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn run<P: CollectionPolicy>(state: Arc<PlanState<P>>, receiver: Receiver<ControllerMessage>) {
        debug!("[{}Controller: Waiting for request...]", state.name());
        for message in receiver.iter() {
            match message {
                ControllerMessage::Collect { generation, done } => {
                    debug!("[{}Controller: Request received.]", state.name());
                    state.collect(generation);
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
            }
        }
        debug!("[{}Controller: Shut down.]", state.name());
    }

    fn post(&self, message: ControllerMessage) -> bool {
        match &self.sender {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Queue a collection and return immediately.
    pub(crate) fn request(&self, generation: usize) {
        if !self.post(ControllerMessage::Collect {
            generation,
            done: None,
        }) {
            warn!("GC controller is gone; dropping collection request");
        }
    }

    /// Queue a collection and wait until it has run.
    pub(crate) fn request_and_wait(&self, generation: usize) {
        let (done, finished) = channel::bounded(1);
        if self.post(ControllerMessage::Collect {
            generation,
            done: Some(done),
        }) {
            let _ = finished.recv();
        } else {
            warn!("GC controller is gone; cannot force a collection");
        }
    }
}

impl Drop for GCController {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("GC controller thread panicked");
            }
        }
    }
}
