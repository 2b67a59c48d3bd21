//! The queue coordinator.
//!
//! A single task owns the list of waiting jobs. Every read or write of that
//! list is a message into the task, so no lock guards it:
//!
//! - `enqueue`, `sync`, `len` and `for_each` send a command and wait for the
//!   reply.
//! - Consumers register an offer through [`Ready::recv`]. The coordinator
//!   keeps offers in arrival order, prunes the ones whose receiver is gone,
//!   and hands the head of the list to exactly one consumer.
//!
//! Stopping the coordinator drops whatever is still waiting. Those jobs are
//! never executed and never get a status.

use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, Result};
use crate::job::Job;

enum Command {
    Enqueue { job: Job, ack: oneshot::Sender<()> },
    Requeue(Job),
    Sync { ack: oneshot::Sender<()> },
    Len { reply: oneshot::Sender<usize> },
    Snapshot { reply: oneshot::Sender<Vec<Job>> },
    #[cfg(test)]
    Consumers { reply: oneshot::Sender<usize> },
}

type Offer = oneshot::Sender<Job>;

/// Handle to a queue coordinator.
///
/// Cheap to clone; all clones talk to the same coordinator.
#[derive(Clone)]
pub struct Queue {
    commands: mpsc::UnboundedSender<Command>,
    offers: mpsc::UnboundedSender<Offer>,
}

impl Queue {
    /// Start a coordinator that runs until `stop` is cancelled or every
    /// handle to it has been dropped.
    ///
    /// The returned join handle resolves once the coordinator has fully
    /// exited.
    pub fn spawn(stop: CancellationToken) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (offers_tx, offers_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator {
            waiting: VecDeque::new(),
            consumers: VecDeque::new(),
            commands: commands_rx,
            offers: offers_rx,
            stop,
        };
        let handle = tokio::spawn(coordinator.run());

        let queue = Self {
            commands: commands_tx,
            offers: offers_tx,
        };
        (queue, handle)
    }

    /// Submit a job, waiting until the coordinator has appended it to the
    /// waiting list.
    ///
    /// The backlog is unbounded. Fails only if the coordinator has stopped.
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Enqueue { job, ack })?;
        done.await.map_err(|_| QueueError::Stopped)
    }

    /// Get a handle consumers use to receive jobs in arrival order.
    pub fn ready(&self) -> Ready {
        Ready {
            offers: self.offers.clone(),
            commands: self.commands.clone(),
        }
    }

    /// Number of jobs waiting, as seen by the coordinator.
    pub async fn len(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Len { reply })?;
        rx.await.map_err(|_| QueueError::Stopped)
    }

    /// Whether no job is waiting.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Visit a snapshot of the waiting jobs in order.
    ///
    /// `visit` gets the position and the job, and returns `false` to stop
    /// early. Changes made to the queue after the snapshot was taken are not
    /// reflected.
    pub async fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &Job) -> bool,
    {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        let jobs = rx.await.map_err(|_| QueueError::Stopped)?;

        for (i, job) in jobs.iter().enumerate() {
            if !visit(i, job) {
                break;
            }
        }
        Ok(())
    }

    /// Wait until the coordinator has processed everything submitted before
    /// this call.
    ///
    /// Enqueues and hand-offs are otherwise only eventually visible through
    /// `len` and `for_each`.
    pub async fn sync(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Sync { ack })?;
        done.await.map_err(|_| QueueError::Stopped)
    }

    #[cfg(test)]
    async fn consumers(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Consumers { reply })?;
        rx.await.map_err(|_| QueueError::Stopped)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| QueueError::Stopped)
    }
}

/// Receiving side of a [`Queue`].
#[derive(Clone)]
pub struct Ready {
    offers: mpsc::UnboundedSender<Offer>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Ready {
    /// Wait for the next job.
    ///
    /// Returns `None` once the coordinator has stopped. Dropping the returned
    /// future after the coordinator handed it a job puts the job back at the
    /// head of the queue.
    pub async fn recv(&self) -> Option<Job> {
        let (offer, rx) = oneshot::channel();
        self.offers.send(offer).ok()?;

        let mut pending = PendingOffer {
            rx,
            commands: self.commands.clone(),
        };
        (&mut pending.rx).await.ok()
    }
}

struct PendingOffer {
    rx: oneshot::Receiver<Job>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Drop for PendingOffer {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(job) = self.rx.try_recv() {
            tracing::debug!(job_id = %job.id, "Receiver dropped after hand-off, requeuing job");
            let _ = self.commands.send(Command::Requeue(job));
        }
    }
}

struct Coordinator {
    waiting: VecDeque<Job>,
    consumers: VecDeque<Offer>,
    commands: mpsc::UnboundedReceiver<Command>,
    offers: mpsc::UnboundedReceiver<Offer>,
    stop: CancellationToken,
}

impl Coordinator {
    async fn run(mut self) {
        tracing::debug!("Queue coordinator started");

        loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => break,
                offer = self.offers.recv() => match offer {
                    Some(offer) => self.register(offer),
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
            self.dispatch();
        }

        if !self.waiting.is_empty() {
            tracing::info!(
                dropped = self.waiting.len(),
                "Queue stopped, discarding waiting jobs"
            );
        }
        tracing::debug!("Queue coordinator stopped");
    }

    fn register(&mut self, offer: Offer) {
        self.consumers.retain(|offer| !offer.is_closed());
        self.consumers.push_back(offer);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { job, ack } => {
                tracing::debug!(
                    job_id = %job.id,
                    waiting = self.waiting.len() + 1,
                    "Job enqueued"
                );
                self.waiting.push_back(job);
                let _ = ack.send(());
            }
            Command::Requeue(job) => self.waiting.push_front(job),
            Command::Sync { ack } => {
                let _ = ack.send(());
            }
            Command::Len { reply } => {
                let _ = reply.send(self.waiting.len());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.waiting.iter().cloned().collect());
            }
            #[cfg(test)]
            Command::Consumers { reply } => {
                let _ = reply.send(self.consumers.len());
            }
        }
    }

    /// Pair waiting jobs with registered consumers, head to head.
    fn dispatch(&mut self) {
        // Nothing leaves the queue once stop has fired.
        if self.stop.is_cancelled() {
            return;
        }

        while !self.waiting.is_empty() {
            let Some(offer) = self.consumers.pop_front() else {
                return;
            };
            let Some(job) = self.waiting.pop_front() else {
                return;
            };
            let job_id = job.id.clone();
            match offer.send(job) {
                Ok(()) => tracing::trace!(job_id = %job_id, "Job handed off"),
                // The consumer gave up waiting; keep the job at the head.
                Err(job) => self.waiting.push_front(job),
            }
        }
    }
}
