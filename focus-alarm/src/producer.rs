//! Background thread pulling samples from a blocking source.
//!
//! Sensor and classifier reads block, so the producer runs on its own OS
//! thread rather than a tokio worker. It sends every sample into a
//! bounded `mpsc` channel; the decision loop drains the channel at its
//! own cadence. When the channel is full the thread waits, so no sample
//! is dropped. Cancellation is cooperative and checked between pulls.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::source::SampleSource;
use crate::tracing::prelude::*;

const THREAD_NAME: &str = "sample-producer";

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running producer thread.
#[derive(Debug)]
pub struct SampleProducer {
    handle: JoinHandle<u64>,
    cancellation: CancellationToken,
}

impl SampleProducer {
    /// Start pulling from `source` and sending into `sample_tx`.
    ///
    /// The thread ends when the source is exhausted, fails, every
    /// receiver is gone, or `cancellation` fires. Dropping `sample_tx`
    /// on exit tells the decision loop no more samples are coming.
    pub fn spawn<S>(
        source: S,
        sample_tx: mpsc::Sender<f64>,
        cancellation: CancellationToken,
    ) -> Result<Self>
    where
        S: SampleSource + 'static,
    {
        let token = cancellation.clone();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || pull_samples(source, sample_tx, token))?;

        Ok(Self {
            handle,
            cancellation,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the thread to stop and wait up to `timeout` for it.
    ///
    /// Returns the number of samples it delivered. On timeout the
    /// thread is left detached; it holds no locks and exits after its
    /// current pull returns, or once the receiver is dropped if it is
    /// waiting for room in the channel.
    pub fn stop(self, timeout: Duration) -> Result<u64> {
        self.cancellation.cancel();

        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(timeout_ms = timeout.as_millis() as u64, "Sample producer did not stop in time");
                return Err(Error::ProducerJoinTimeout(timeout));
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        self.handle
            .join()
            .map_err(|_| Error::Other("sample producer thread panicked".to_string()))
    }
}

fn pull_samples<S: SampleSource>(
    mut source: S,
    sample_tx: mpsc::Sender<f64>,
    cancellation: CancellationToken,
) -> u64 {
    trace!("Sample producer started.");
    let mut published = 0u64;

    while !cancellation.is_cancelled() {
        match source.next_sample() {
            Ok(Some(sample)) => {
                if sample_tx.blocking_send(sample).is_err() {
                    debug!("Sample channel closed");
                    break;
                }
                published += 1;
            }
            Ok(None) => {
                info!(published, "Sample source exhausted");
                break;
            }
            Err(e @ (Error::Source(_) | Error::Json(_))) => {
                warn!(error = %e, "Skipping malformed sample");
            }
            Err(e) => {
                error!(error = %e, "Sample source failed");
                break;
            }
        }
    }

    trace!(published, "Sample producer stopped.");
    published
}
