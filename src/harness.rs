//! Open, configure, stream, and tear down a single-tone transmission.
//!
//! [`run`] is the whole life of the test harness: it transmits until the termination signal
//! is raised or the stream ends on its own, and reports which stage failed otherwise.

use std::{fmt, sync::Arc, time::Duration};

use log::{info, warn};

use crate::{
    Error, HackRf, StreamState, TerminationSignal, ToneFeeder, TxConfig, WaveformTable,
};

/// Parameters for a tone transmission.
#[derive(Debug, Clone)]
pub struct ToneConfig {
    /// Radio configuration applied before streaming.
    pub tx: TxConfig,
    /// Tone offset from the center frequency, in Hz.
    pub tone_hz: u32,
    /// Size of each USB transfer in bytes. Must be a non-zero multiple of 512.
    pub transfer_size: usize,
    /// How often the stream and the termination signal are checked.
    pub poll_interval: Duration,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            tx: TxConfig::tx_default(),
            tone_hz: 1_000,
            // libhackrf's transfer size
            transfer_size: 256 * 1024,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Step of the harness that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Finding and opening the device.
    Open,
    /// Building the waveform or applying the radio configuration.
    Configure,
    /// Starting the transmit stream.
    StartTx,
    /// The transmit stream failed while running.
    Stream,
    /// Stopping the stream or turning the radio off.
    StopTx,
    /// Registering the termination signal handler.
    Signal,
}

impl Stage {
    /// Process exit status reported for a failure in this stage.
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Open => 1,
            Stage::Configure => 2,
            Stage::StartTx => 3,
            Stage::StopTx => 4,
            Stage::Signal => 5,
            Stage::Stream => 6,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Open => "open device",
            Stage::Configure => "configure",
            Stage::StartTx => "start tx",
            Stage::Stream => "stream",
            Stage::StopTx => "stop tx",
            Stage::Signal => "install signal handler",
        };
        f.write_str(name)
    }
}

/// A harness failure, tagged with the stage it happened in.
#[derive(thiserror::Error, Debug)]
#[error("{stage} failed")]
pub struct HarnessError {
    /// Where the failure happened.
    pub stage: Stage,
    /// The underlying error.
    #[source]
    pub source: Error,
}

impl HarnessError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        self.stage.exit_code()
    }
}

trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, HarnessError>;
}

impl<T> StageExt<T> for crate::Result<T> {
    fn stage(self, stage: Stage) -> Result<T, HarnessError> {
        self.map_err(|source| HarnessError { stage, source })
    }
}

/// Installs the process termination handler.
pub fn install_signal() -> Result<Arc<TerminationSignal>, HarnessError> {
    TerminationSignal::install().stage(Stage::Signal)
}

/// Opens the first HackRF One and transmits the configured tone until `stop` is raised.
///
/// Returns once the radio is off again.
pub fn run(config: &ToneConfig, stop: &TerminationSignal) -> Result<(), HarnessError> {
    let radio = Arc::new(open_first().stage(Stage::Open)?);

    let table = WaveformTable::new(config.tx.effective_sample_rate(), config.tone_hz)
        .stage(Stage::Configure)?;
    info!(
        "Tone table: {} samples per cycle, {} bytes",
        table.samples_per_cycle(),
        table.len()
    );

    radio.start_tx(&config.tx).stage(Stage::Configure)?;

    let session = radio
        .start_tx_session(config.transfer_size, ToneFeeder::new(table))
        .stage(Stage::StartTx)?;
    info!("Transmitting, interrupt to stop");

    while session.is_streaming() && !stop.is_raised() {
        std::thread::sleep(config.poll_interval);
    }

    if stop.is_raised() {
        match stop.last_signal() {
            Some(signal) => info!("Caught signal {signal}, stopping"),
            None => info!("Stop requested"),
        }
    } else {
        warn!("Stream ended: {:?}", session.state());
    }

    let stage = teardown_stage(session.state());
    session.stop().stage(stage)?;
    info!("Transmission stopped");

    Ok(())
}

/// Stage to blame for an error returned when stopping a session in `state`.
fn teardown_stage(state: StreamState) -> Stage {
    match state {
        StreamState::ThreadError => Stage::Stream,
        _ => Stage::StopTx,
    }
}

fn open_first() -> crate::Result<HackRf> {
    let devices = HackRf::list()?;
    if devices.is_empty() {
        return Err(Error::NotFound);
    }
    for device in &devices {
        info!(
            "Found hackrf at {}:{} S/N {}",
            device.bus_number,
            device.address,
            device.serial_number.as_deref().unwrap_or("unknown")
        );
    }

    let radio = HackRf::open_first()?;
    info!(
        "Opened hackrf, board id {}, firmware {}, usb {}",
        radio.board_id()?,
        radio.version()?,
        radio.device_version()
    );
    Ok(radio)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let stages = [
            Stage::Open,
            Stage::Configure,
            Stage::StartTx,
            Stage::StopTx,
            Stage::Signal,
            Stage::Stream,
        ];
        let mut codes: Vec<i32> = stages.iter().map(|s| s.exit_code()).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), stages.len());
    }

    #[test]
    fn stage_tags_errors() {
        let res: crate::Result<()> = Err(Error::NotFound);
        let err = res.stage(Stage::Open).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "open device failed");
        assert!(matches!(err.source, Error::NotFound));
    }

    #[test]
    fn transport_failure_is_not_a_stop_failure() {
        assert_eq!(teardown_stage(StreamState::ThreadError), Stage::Stream);
        assert_eq!(teardown_stage(StreamState::Stopped), Stage::StopTx);
        assert_eq!(teardown_stage(StreamState::ExitCalled), Stage::StopTx);
        assert_eq!(teardown_stage(StreamState::Streaming), Stage::StopTx);

        let res: crate::Result<()> = Err(Error::ThreadPanicked);
        let err = res.stage(teardown_stage(StreamState::ThreadError)).unwrap_err();
        assert_eq!(err.exit_code(), 6);
        assert_eq!(err.to_string(), "stream failed");
    }

    #[test]
    fn invalid_tone_is_a_configure_failure() {
        let config = ToneConfig {
            tone_hz: 0,
            ..ToneConfig::default()
        };
        let err = WaveformTable::new(config.tx.effective_sample_rate(), config.tone_hz)
            .stage(Stage::Configure)
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn default_config_streams_whole_transfers() {
        let config = ToneConfig::default();
        assert_eq!(config.transfer_size % 512, 0);
        let table = WaveformTable::new(config.tx.effective_sample_rate(), config.tone_hz).unwrap();
        assert_eq!(table.len(), 32_000);
    }
}
