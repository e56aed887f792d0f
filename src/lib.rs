#![deny(unsafe_code)]

//! # HackRF One tone transmitter
//!
//! This crate drives a [HackRF One](https://greatscottgadgets.com/hackrf/one/) as a
//! continuous single-tone transmitter in pure Rust. A [`WaveformTable`] holding two cycles of
//! the tone is built once, and a [`ToneFeeder`] repeats it into every USB transfer of a
//! [`TxSession`] until the session is stopped.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use anyhow::Result;
//! use hackrf_tone::{HackRf, ToneFeeder, TxConfig, WaveformTable};
//!
//! fn main() -> Result<()> {
//!     let radio = Arc::new(HackRf::open_first()?);
//!     let config = TxConfig::tx_default();
//!
//!     let table = WaveformTable::new(config.effective_sample_rate(), 1_000)?;
//!     radio.start_tx(&config)?;
//!     let session = radio.start_tx_session(256 * 1024, ToneFeeder::new(table))?;
//!
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     // The radio keeps transmitting until the session is stopped or dropped.
//!     session.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! ## License
//!
//! This crate is licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg))]
#![warn(missing_docs)]

mod feeder;
pub mod harness;
mod signal;
mod stream;
mod types;
mod waveform;

pub use feeder::ToneFeeder;
pub use signal::{TerminationSignal, TERMINATION_SIGNALS};
pub use stream::{FillStatus, Transfer, TxSession, TxSource};
pub use types::*;
pub use waveform::{WaveformTable, MIDSCALE, QUADRATURE_LEVEL};

use std::sync::{Arc, Mutex};

use futures_lite::future::block_on;
use log::{info, warn};
use nusb::{
    transfer::{ControlIn, ControlOut, ControlType, Recipient},
    DeviceInfo,
};

/// HackRF USB vendor ID.
const HACKRF_USB_VID: u16 = 0x1D50;
/// HackRF One USB product ID.
const HACKRF_ONE_USB_PID: u16 = 0x6089;

/// HackRF One software defined radio.
///
/// NOTE: The Hackrf may continue transmitting the latest samples it received if never dropped.
/// Be sure to stop the radio, or drop it, before the process exits.
pub struct HackRf {
    interface: nusb::Interface,
    version: UsbVersion,
    /// Synchronized state.
    /// Hackrf is half duplex, with one antenna, so we can only do one thing at a time.
    inner: Mutex<Inner>,
}

struct Inner {
    mode: Mode,
    streamer_active: bool,
}

impl Inner {
    fn ensure_mode(&self, expected: Mode) -> Result<()> {
        let actual = self.mode;
        if actual != expected {
            return Err(Error::WrongMode {
                required: expected,
                actual,
            });
        }
        Ok(())
    }
}

fn is_hackrf_one(info: &DeviceInfo) -> bool {
    info.vendor_id() == HACKRF_USB_VID && info.product_id() == HACKRF_ONE_USB_PID
}

impl HackRf {
    /// Opens `info` based on the result of a `nusb` scan.
    pub fn open(info: DeviceInfo) -> Result<Self> {
        let device = info.open()?;
        let interface = device.detach_and_claim_interface(0)?;

        Ok(HackRf {
            interface,
            version: UsbVersion::from_bcd(info.device_version()),
            inner: Mutex::new(Inner {
                mode: Mode::Off,
                streamer_active: false,
            }),
        })
    }

    /// Opens the first Hackrf One found via USB.
    pub fn open_first() -> Result<HackRf> {
        for device in nusb::list_devices()?.filter(is_hackrf_one) {
            match Self::open(device) {
                Ok(dev) => return Ok(dev),
                Err(e) => warn!("Skipping hackrf that failed to open: {e:?}"),
            }
        }

        Err(Error::NotFound)
    }

    /// Lists every HackRF One on the usb bus.
    pub fn list() -> Result<Vec<DeviceSummary>> {
        Ok(nusb::list_devices()?
            .filter(is_hackrf_one)
            .map(|device| DeviceSummary {
                bus_number: device.bus_number(),
                address: device.device_address(),
                serial_number: device.serial_number().map(String::from),
            })
            .collect())
    }

    /// Opens a hackrf with usb address `<bus_number>:<address>`
    pub fn open_bus(bus_number: u8, address: u8) -> Result<HackRf> {
        for device in nusb::list_devices()?.filter(is_hackrf_one) {
            if device.bus_number() == bus_number && device.device_address() == address {
                return Self::open(device);
            }
        }

        Err(Error::NotFound)
    }

    /// Returns the USB version of the device.
    pub fn device_version(&self) -> UsbVersion {
        self.version
    }

    /// Reads the board ID of the HackRF One device.
    pub fn board_id(&self) -> Result<u8> {
        let data: [u8; 1] = self.read_control(Request::BoardIdRead, 0, 0)?;
        Ok(data[0])
    }

    /// Read the firmware version.
    pub fn version(&self) -> Result<String> {
        let buf = block_on(self.interface.control_in(ControlIn {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: Request::VersionStringRead as u8,
            value: 0x0,
            index: 0x0,
            length: 64,
        }))
        .into_result()?;

        Ok(String::from_utf8_lossy(&buf).into())
    }

    fn apply_config(&self, config: &TxConfig) -> Result<()> {
        self.set_sample_rate(config.sample_rate_hz, config.sample_rate_div)?;
        self.set_freq(config.frequency_hz)?;
        self.set_txvga_gain(config.txvga_db)?;
        self.set_amp_enable(config.amp_enable)?;
        self.set_antenna_enable(config.antenna_enable)?;

        Ok(())
    }

    /// Transitions the radio into transmit mode.
    /// Call this function before calling [`Self::start_tx_session`].
    ///
    /// Previous state set via `set_xxx` functions will be overridden with the parameters set in `config`.
    ///
    /// # Errors
    /// This function will return an error if the radio is not off, if the configuration is
    /// rejected or if an I/O error occurs
    pub fn start_tx(&self, config: &TxConfig) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure_mode(Mode::Off)?;

        self.apply_config(config)?;
        info!(
            "Configured tx: {} Hz center, {}/{} Hz sample rate, {} dB txvga",
            config.frequency_hz, config.sample_rate_hz, config.sample_rate_div, config.txvga_db
        );

        self.write_control(Request::SetTransceiverMode, Mode::Transmit as u16, 0, &[])?;
        inner.mode = Mode::Transmit;

        Ok(())
    }

    /// Transitions the radio into off mode.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.write_control(Request::SetTransceiverMode, Mode::Off as u16, 0, &[])?;
        inner.mode = Mode::Off;

        Ok(())
    }

    /// Starts streaming samples produced by `source`.
    ///
    /// `source` is called from a dedicated thread for every `transfer_size` byte transfer,
    /// until it returns [`FillStatus::Stop`] or the returned session is stopped.
    ///
    /// When the session is dropped, the device will be reset to the `Off` state,
    /// meaning [`Self::start_tx`] will be required before using the device again.
    ///
    /// # Errors
    /// Fails if `transfer_size` is zero or not a multiple of 512, if the radio is not in
    /// transmit mode, or if a session is already running.
    pub fn start_tx_session<S>(
        self: &Arc<Self>,
        transfer_size: usize,
        source: S,
    ) -> Result<TxSession>
    where
        S: TxSource + 'static,
    {
        if transfer_size == 0 || transfer_size % 512 != 0 {
            return Err(Error::Argument(
                "transfer_size must be a non-zero multiple of 512",
            ));
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.ensure_mode(Mode::Transmit)?;
            if inner.streamer_active {
                return Err(Error::StreamerExists);
            }
            inner.streamer_active = true;
        }

        TxSession::spawn(Arc::clone(self), transfer_size, source).inspect_err(|_| {
            self.inner.lock().unwrap().streamer_active = false;
        })
    }

    fn stop_streamer(&self) -> Result<()> {
        let stopped = self.stop();
        if let Err(e) = &stopped {
            warn!("Failed to stop tx: {e:?}");
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.streamer_active {
            warn!("Streamer not active");
        }
        inner.streamer_active = false;

        stopped
    }
}

impl Drop for HackRf {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop tx: {e:?}");
        }
    }
}

impl HackRf {
    fn read_control<const N: usize>(
        &self,
        request: Request,
        value: u16,
        index: u16,
    ) -> Result<[u8; N]> {
        let mut res: [u8; N] = [0; N];
        let buf = block_on(self.interface.control_in(ControlIn {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: request as u8,
            value,
            index,
            length: N as u16,
        }))
        .into_result()?;

        if buf.len() != N {
            return Err(Error::TransferTruncated {
                actual: buf.len(),
                expected: N,
            });
        }

        res.copy_from_slice(&buf);
        Ok(res)
    }

    fn write_control(&self, request: Request, value: u16, index: u16, buf: &[u8]) -> Result<()> {
        let out = block_on(self.interface.control_out(ControlOut {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: request as u8,
            value,
            index,
            data: buf,
        }))
        .into_result()?;

        if out.actual_length() != buf.len() {
            Err(Error::TransferTruncated {
                actual: out.actual_length(),
                expected: buf.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Set the center frequency.
    pub fn set_freq(&self, hz: u64) -> Result<()> {
        let buf: [u8; 8] = freq_params(hz);
        self.write_control(Request::SetFreq, 0, 0, &buf)
    }

    /// Enable the TX RF amplifier.
    pub fn set_amp_enable(&self, enable: bool) -> Result<()> {
        self.write_control(Request::AmpEnable, enable.into(), 0, &[])
    }

    /// Set the baseband filter bandwidth.
    ///
    /// This is automatically set when the sample rate is changed with
    /// [`Self::set_sample_rate`].
    pub fn set_baseband_filter_bandwidth(&self, hz: u32) -> Result<()> {
        self.write_control(
            Request::BasebandFilterBandwidthSet,
            (hz & 0xFFFF) as u16,
            (hz >> 16) as u16,
            &[],
        )
    }

    /// Set the sample rate to `hz / div`.
    ///
    /// For anti-aliasing, the baseband filter bandwidth is set to 75% of the
    /// resulting sample rate every time the sample rate is set.
    /// If you want to override the baseband filter selection, you must do so
    /// after setting the sample rate.
    ///
    /// Limits are 2MHz - 20MHz.
    /// Preferred rates are 8, 10, 12.5, 16, 20MHz due to less jitter.
    pub fn set_sample_rate(&self, hz: u32, div: u32) -> Result<()> {
        if div == 0 {
            return Err(Error::Argument("sample rate divider must be non-zero"));
        }
        let buf: [u8; 8] = sample_rate_params(hz, div);
        self.write_control(Request::SampleRateSet, 0, 0, &buf)?;
        self.set_baseband_filter_bandwidth((0.75 * (hz as f32) / (div as f32)) as u32)
    }

    /// Set the transmit VGA gain.
    ///
    /// Range 0 to 47dB in 1db steps.
    pub fn set_txvga_gain(&self, gain: u16) -> Result<()> {
        if gain > 47 {
            Err(Error::Argument("gain parameter out of range. max is 47"))
        } else {
            let buf: [u8; 1] = self.read_control(Request::SetTxvgaGain, 0, gain)?;
            if buf[0] == 0 {
                Err(Error::Argument("txvga gain rejected by device"))
            } else {
                Ok(())
            }
        }
    }

    /// Antenna port power control.
    pub fn set_antenna_enable(&self, value: bool) -> Result<()> {
        self.write_control(Request::AntennaEnable, value.into(), 0, &[])
    }
}

// Helper for set_freq
fn freq_params(hz: u64) -> [u8; 8] {
    const MHZ: u64 = 1_000_000;

    let l_freq_mhz: u32 = u32::try_from(hz / MHZ).unwrap_or(u32::MAX);
    let l_freq_hz: u32 = u32::try_from(hz - u64::from(l_freq_mhz) * MHZ).unwrap_or(u32::MAX);

    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&l_freq_mhz.to_le_bytes());
    buf[4..].copy_from_slice(&l_freq_hz.to_le_bytes());
    buf
}

// Helper for set_sample_rate
fn sample_rate_params(hz: u32, div: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&hz.to_le_bytes());
    buf[4..].copy_from_slice(&div.to_le_bytes());
    buf
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_freq_params() {
        assert_eq!(freq_params(915_000_000), [0x93, 0x03, 0, 0, 0, 0, 0, 0]);
        assert_eq!(freq_params(915_000_001), [0x93, 0x03, 0, 0, 1, 0, 0, 0]);
        assert_eq!(
            freq_params(123456789),
            [0x7B, 0, 0, 0, 0x55, 0xF8, 0x06, 0x00]
        );
        assert_eq!(freq_params(144_750_000), [0x90, 0, 0, 0, 0xB0, 0x71, 0x0B, 0]);

        assert_eq!(freq_params(0), [0; 8]);

        assert_eq!(freq_params(u64::MAX), [0xFF; 8]);
    }

    #[test]
    fn test_sample_rate_params() {
        assert_eq!(
            sample_rate_params(8_000_000, 1),
            [0x00, 0x12, 0x7A, 0x00, 1, 0, 0, 0]
        );
        assert_eq!(
            sample_rate_params(20_000_000, 3),
            [0x00, 0x2D, 0x31, 0x01, 3, 0, 0, 0]
        );
    }

    // NOTE: make sure you can transmit on the frequency below and that you have the correct
    // antenna / attenuation before enabling!
    // #[test]
    #[allow(dead_code)]
    fn tone_session() {
        let radio = Arc::new(HackRf::open_first().expect("Failed to open hackrf"));
        let config = TxConfig {
            txvga_db: 0,
            ..TxConfig::tx_default()
        };
        let table = WaveformTable::new(config.effective_sample_rate(), 1_000).unwrap();

        radio.start_tx(&config).unwrap();
        assert!(radio.start_tx(&config).is_err());

        let session = radio
            .start_tx_session(256 * 1024, ToneFeeder::new(table))
            .unwrap();
        assert!(matches!(
            radio.start_tx_session(256 * 1024, |_: &mut Transfer<'_>| FillStatus::Stop),
            Err(Error::StreamerExists)
        ));
        std::thread::sleep(Duration::from_millis(50));
        assert!(session.is_streaming());

        session.stop().unwrap();
        assert!(matches!(
            radio.start_tx_session(256 * 1024, |_: &mut Transfer<'_>| FillStatus::Stop),
            Err(Error::WrongMode { .. })
        ));
    }
}
