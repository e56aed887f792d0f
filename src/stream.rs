//! Callback-driven transmit streaming.
//!
//! A [`TxSession`] owns a transport thread that keeps a fixed number of bulk-out transfers in
//! flight. Every transfer is handed to a [`TxSource`] to be filled before it is submitted.

use std::{
    sync::{atomic::Ordering, Arc},
    thread::JoinHandle,
};

use futures_lite::future::block_on;
use log::{debug, error, warn};
use nusb::transfer::{Completion, ResponseBuffer};

use crate::{AtomicStreamState, Error, HackRf, Result, StreamState};

/// Bulk-out endpoint carrying transmit samples.
const TX_ENDPOINT: u8 = 0x02;

/// Transfers kept queued on the endpoint at once.
const IN_FLIGHT_TRANSFERS: usize = 3;

/// Outcome of a [`TxSource::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum FillStatus {
    /// Submit the transfer and keep streaming.
    Continue,
    /// Submit the transfer, then stop streaming.
    Stop,
}

/// A transmit buffer waiting to be filled.
///
/// The buffer starts empty. Sources append to it with [`Self::extend_from_slice`], or take
/// the whole valid region with [`Self::valid_mut`]. Bytes a source leaves unwritten are sent
/// as zeros.
pub struct Transfer<'a> {
    buffer: &'a mut Vec<u8>,
    valid_length: usize,
}

impl<'a> Transfer<'a> {
    /// Wraps `buffer`, discarding its contents, to be filled with `valid_length` bytes.
    pub fn new(buffer: &'a mut Vec<u8>, valid_length: usize) -> Self {
        buffer.clear();
        buffer.reserve(valid_length);
        Self {
            buffer,
            valid_length,
        }
    }

    /// Total size of the underlying allocation in bytes.
    pub fn buffer_length(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of bytes that must be filled.
    pub fn valid_length(&self) -> usize {
        self.valid_length
    }

    /// Bytes still to be written.
    pub fn remaining(&self) -> usize {
        self.valid_length - self.buffer.len()
    }

    /// Appends as much of `bytes` as fits, returning how many were taken.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.buffer.extend_from_slice(&bytes[..n]);
        n
    }

    /// The full valid region. Bytes not yet written are zeroed first.
    pub fn valid_mut(&mut self) -> &mut [u8] {
        self.finish();
        &mut self.buffer[..]
    }

    /// Pads the buffer with zeros up to the valid length.
    fn finish(&mut self) {
        self.buffer.resize(self.valid_length, 0);
    }
}

/// Fills transmit transfers.
///
/// Called from the transport thread, strictly sequentially. Implementations should write
/// [`Transfer::valid_length`] bytes and return quickly; the device drains the queue at the
/// sample rate.
pub trait TxSource: Send {
    /// Fills `transfer` and reports whether streaming should continue.
    fn fill(&mut self, transfer: &mut Transfer<'_>) -> FillStatus;
}

impl<F> TxSource for F
where
    F: FnMut(&mut Transfer<'_>) -> FillStatus + Send,
{
    fn fill(&mut self, transfer: &mut Transfer<'_>) -> FillStatus {
        self(transfer)
    }
}

/// A running transmit stream.
///
/// When the session is stopped or dropped, the transport thread is joined and the device is
/// returned to the `Off` state, meaning [`HackRf::start_tx`] will be required before
/// streaming again.
pub struct TxSession {
    hackrf: Arc<HackRf>,
    state: Arc<AtomicStreamState>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl TxSession {
    pub(crate) fn spawn<S>(
        hackrf: Arc<HackRf>,
        transfer_size: usize,
        mut source: S,
    ) -> Result<Self>
    where
        S: TxSource + 'static,
    {
        let state = Arc::new(AtomicStreamState::new(StreamState::Streaming));

        let thread = {
            let hackrf = Arc::clone(&hackrf);
            let state = Arc::clone(&state);
            std::thread::Builder::new()
                .name("hackrf-tx".into())
                .spawn(move || {
                    let res = transmit_loop(&hackrf, transfer_size, &mut source, &state);
                    if let Err(e) = &res {
                        error!("Transmit thread failed: {e:?}");
                        state.store(StreamState::ThreadError, Ordering::Release);
                    }
                    res
                })?
        };

        Ok(TxSession {
            hackrf,
            state,
            thread: Some(thread),
        })
    }

    /// Current state of the stream.
    pub fn state(&self) -> StreamState {
        self.state.load(Ordering::Acquire)
    }

    /// Returns true while transfers are still being filled and submitted.
    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// Stops streaming, waits for queued transfers, and turns the transceiver off.
    ///
    /// # Errors
    /// Returns the error that ended the transport thread, if any, or the error from turning
    /// the transceiver off.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let _ = self.state.compare_exchange(
            StreamState::Streaming,
            StreamState::Stopped,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let joined = match self.thread.take() {
            Some(thread) => thread.join().unwrap_or(Err(Error::ThreadPanicked)),
            None => Ok(()),
        };
        let stopped = self.hackrf.stop_streamer();

        joined.and(stopped)
    }
}

impl Drop for TxSession {
    fn drop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        if let Err(e) = self.shutdown() {
            warn!("Failed to stop tx session in drop: {e:?}");
        }
    }
}

fn transmit_loop(
    hackrf: &HackRf,
    transfer_size: usize,
    source: &mut dyn TxSource,
    state: &AtomicStreamState,
) -> Result<()> {
    let mut queue = hackrf.interface.bulk_out_queue(TX_ENDPOINT);
    let mut first = true;

    while state.load(Ordering::Acquire) == StreamState::Streaming {
        let mut buf = if queue.pending() < IN_FLIGHT_TRANSFERS {
            Vec::with_capacity(transfer_size)
        } else {
            reclaim(block_on(queue.next_complete()), transfer_size)?
        };

        let status = {
            let mut transfer = Transfer::new(&mut buf, transfer_size);
            if first {
                debug!(
                    "buffer_length={} valid_length={}",
                    transfer.buffer_length(),
                    transfer.valid_length()
                );
                first = false;
            }
            let status = source.fill(&mut transfer);
            transfer.finish();
            status
        };
        queue.submit(buf);

        if status == FillStatus::Stop {
            debug!("Fill routine requested stop");
            let _ = state.compare_exchange(
                StreamState::Streaming,
                StreamState::ExitCalled,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            break;
        }
    }

    // samples already queued are still sent before the transceiver is turned off
    while queue.pending() > 0 {
        reclaim(block_on(queue.next_complete()), transfer_size)?;
    }

    Ok(())
}

/// Checks a completed transfer and hands back its buffer for reuse.
fn reclaim(completion: Completion<ResponseBuffer>, expected: usize) -> Result<Vec<u8>> {
    let response = completion.into_result()?;
    if response.actual_length() != expected {
        return Err(Error::TransferTruncated {
            actual: response.actual_length(),
            expected,
        });
    }
    Ok(response.reuse())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transfer_starts_empty_and_reuses_allocation() {
        let mut buf = vec![0xAB; 64];
        let transfer = Transfer::new(&mut buf, 16);
        assert!(transfer.buffer_length() >= 64);
        assert_eq!(transfer.valid_length(), 16);
        assert_eq!(transfer.remaining(), 16);
    }

    #[test]
    fn extend_stops_at_valid_length() {
        let mut buf = Vec::new();
        let mut transfer = Transfer::new(&mut buf, 5);
        assert_eq!(transfer.extend_from_slice(&[1, 2, 3]), 3);
        assert_eq!(transfer.extend_from_slice(&[4, 5, 6]), 2);
        assert_eq!(transfer.remaining(), 0);
        assert_eq!(transfer.extend_from_slice(&[7]), 0);
        transfer.finish();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn unwritten_bytes_are_zero_padded() {
        let mut buf = vec![0xFF; 8];
        let mut transfer = Transfer::new(&mut buf, 6);
        transfer.extend_from_slice(&[9, 9]);
        transfer.finish();
        assert_eq!(buf, [9, 9, 0, 0, 0, 0]);
    }

    #[test]
    fn valid_mut_keeps_appended_prefix() {
        let mut buf = Vec::new();
        let mut transfer = Transfer::new(&mut buf, 4);
        transfer.extend_from_slice(&[1]);
        let valid = transfer.valid_mut();
        assert_eq!(valid, [1, 0, 0, 0]);
        valid[3] = 2;
        assert_eq!(buf, [1, 0, 0, 2]);
    }

    #[test]
    fn closures_are_sources() {
        let mut calls = 0;
        let mut source = |transfer: &mut Transfer<'_>| {
            calls += 1;
            transfer.valid_mut().fill(0x7F);
            if calls < 2 {
                FillStatus::Continue
            } else {
                FillStatus::Stop
            }
        };

        let mut buf = Vec::new();
        assert_eq!(source.fill(&mut Transfer::new(&mut buf, 4)), FillStatus::Continue);
        assert_eq!(source.fill(&mut Transfer::new(&mut buf, 4)), FillStatus::Stop);
        assert_eq!(buf, [0x7F; 4]);
    }

    #[test]
    fn sources_are_object_safe() {
        let mut boxed: Box<dyn TxSource> = Box::new(|transfer: &mut Transfer<'_>| {
            transfer.extend_from_slice(&[9, 9]);
            FillStatus::Stop
        });
        let mut buf = Vec::new();
        assert_eq!(boxed.fill(&mut Transfer::new(&mut buf, 2)), FillStatus::Stop);
        assert_eq!(buf, [9, 9]);
    }
}
