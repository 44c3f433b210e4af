use super::{BlockStore, DiskAccessRequest, DiskChannel, DiskCompletion, DiskError, Direction};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, warn};
use std::thread::{self, JoinHandle};

/// Single-slot mailbox between a disk controller and its storage worker.
///
/// At most one request is in flight. A request submitted while another is
/// outstanding is rejected and handed back; the slot is freed when the
/// controller collects the completion with [`poll`](Self::poll) or
/// [`wait`](Self::wait).
pub struct DiskIoBridge {
    channel: DiskChannel,
    requests: Option<Sender<DiskAccessRequest>>,
    completions: Receiver<DiskCompletion>,
    in_flight: Option<(u8, u32, Direction)>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DiskIoBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskIoBridge")
            .field("channel", &self.channel)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

fn serve(
    mut store: impl BlockStore,
    requests: Receiver<DiskAccessRequest>,
    completions: Sender<DiskCompletion>,
) {
    for mut request in requests.iter() {
        let result = match request.direction {
            Direction::Read => store.read(request.unit, request.lba, &mut request.buffer),
            Direction::Write => store.write(request.unit, request.lba, &request.buffer),
        };

        let completion = DiskCompletion {
            unit: request.unit,
            lba: request.lba,
            direction: request.direction,
            buffer: request.buffer,
            success: result.is_ok(),
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
}

impl DiskIoBridge {
    /// Start the worker thread for `channel`, serving requests from `store`.
    pub fn spawn(channel: DiskChannel, store: impl BlockStore) -> Result<Self, DiskError> {
        let (request_tx, request_rx) = bounded::<DiskAccessRequest>(1);
        let (completion_tx, completion_rx) = bounded::<DiskCompletion>(1);

        let worker = thread::Builder::new()
            .name(format!("{}-disk-io", channel))
            .spawn(move || serve(store, request_rx, completion_tx))
            .map_err(|source| DiskError::WorkerSpawn { channel, source })?;

        Ok(Self {
            channel,
            requests: Some(request_tx),
            completions: completion_rx,
            in_flight: None,
            worker: Some(worker),
        })
    }

    pub fn channel(&self) -> DiskChannel {
        self.channel
    }

    /// True while a request is outstanding.
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Hand a request to the worker without waiting for it.
    ///
    /// Fails with [`DiskError::ChannelBusy`], carrying the request back, if
    /// the previous request has not been collected yet.
    pub fn submit(&mut self, request: DiskAccessRequest) -> Result<(), DiskError> {
        if let Some((unit, lba, _)) = self.in_flight {
            warn!(
                "{} disk request unit {} lba {} rejected, unit {} lba {} still pending",
                self.channel, request.unit, request.lba, unit, lba
            );
            return Err(DiskError::ChannelBusy {
                channel: self.channel,
                request: Box::new(request),
            });
        }

        let sender = self.requests.as_ref().ok_or(DiskError::WorkerGone {
            channel: self.channel,
        })?;

        let slot = (request.unit, request.lba, request.direction);
        debug!(
            "{} disk {:?} unit {} lba {}",
            self.channel, request.direction, request.unit, request.lba
        );
        sender.send(request).map_err(|_| DiskError::WorkerGone {
            channel: self.channel,
        })?;
        self.in_flight = Some(slot);
        Ok(())
    }

    /// Collect the completion of the outstanding request, if it has finished.
    pub fn poll(&mut self) -> Option<DiskCompletion> {
        self.in_flight?;
        match self.completions.try_recv() {
            Ok(completion) => {
                self.in_flight = None;
                Some(completion)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.worker_lost(),
        }
    }

    /// Block until the outstanding request finishes.
    pub fn wait(&mut self) -> Option<DiskCompletion> {
        self.in_flight?;
        match self.completions.recv() {
            Ok(completion) => {
                self.in_flight = None;
                Some(completion)
            }
            Err(_) => self.worker_lost(),
        }
    }

    // A dead worker still owes a completion; report it as a failed transfer
    // so the controller does not hang on BSY.
    fn worker_lost(&mut self) -> Option<DiskCompletion> {
        let (unit, lba, direction) = self.in_flight.take()?;
        warn!("{} disk worker stopped with a request pending", self.channel);
        self.requests = None;
        Some(DiskCompletion {
            unit,
            lba,
            direction,
            buffer: Vec::new(),
            success: false,
        })
    }
}

impl Drop for DiskIoBridge {
    fn drop(&mut self) {
        // Closing the request side ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("{} disk worker panicked", self.channel);
            }
        }
    }
}
