#[repr(u8)]
pub(crate) enum Request {
    SetTransceiverMode = 1,
    SampleRateSet = 6,
    BasebandFilterBandwidthSet = 7,
    BoardIdRead = 14,
    VersionStringRead = 15,
    SetFreq = 16,
    AmpEnable = 17,
    SetTxvgaGain = 21,
    AntennaEnable = 23,
}

/// Operating modes of the HackRF One.
///
/// Values are the firmware's transceiver mode codes. `Receive` is never entered by this
/// crate but can still be reported back in [`Error::WrongMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Mode {
    /// Transceiver is off.
    Off = 0,
    /// Transceiver is in receive mode.
    Receive = 1,
    /// Transceiver is in transmit mode.
    Transmit = 2,
}

/// Lifecycle of a [`crate::TxSession`].
///
/// Shared between the transport thread and the session owner through an
/// [`AtomicStreamState`].
#[atomic_enum::atomic_enum]
#[derive(PartialEq)]
pub enum StreamState {
    /// Transfers are being filled and submitted.
    Streaming,
    /// The fill routine returned [`crate::FillStatus::Stop`].
    ExitCalled,
    /// The owner of the session requested a stop.
    Stopped,
    /// A USB transfer failed and the transport thread exited.
    ThreadError,
}

/// Transmit parameters applied by [`crate::HackRf::start_tx`].
#[derive(Debug, Clone)]
pub struct TxConfig {
    /// 0 - 47 dB in 1dB increments
    pub txvga_db: u16,
    /// RF amplifier (on/off)
    pub amp_enable: bool,
    /// Antenna power port control
    // Power enable on antenna
    pub antenna_enable: bool,
    /// Center frequency in hz
    pub frequency_hz: u64,
    /// Sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Sample rate divider.
    ///
    /// The device runs at `sample_rate_hz / sample_rate_div` samples per second.
    pub sample_rate_div: u32,
}

impl TxConfig {
    /// Returns the default configuration for transmitting.
    pub fn tx_default() -> Self {
        Self {
            txvga_db: 40,
            amp_enable: false,
            antenna_enable: false,
            frequency_hz: 144_750_000,
            sample_rate_hz: 8_000_000,
            sample_rate_div: 1,
        }
    }

    /// Effective sample rate after the divider, in samples per second.
    ///
    /// A divider of zero is treated as one.
    pub fn effective_sample_rate(&self) -> u32 {
        self.sample_rate_hz / self.sample_rate_div.max(1)
    }
}

/// A HackRF One found on the USB bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    /// USB bus number.
    pub bus_number: u8,
    /// Device address on the bus.
    pub address: u8,
    /// Serial number string, if the device reports one.
    pub serial_number: Option<String>,
}

/// HackRF One errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error occurred.
    #[error("io")]
    Io(#[from] std::io::Error),
    /// USB transfer error.
    #[error("transfer")]
    Transfer(#[from] nusb::transfer::TransferError),
    /// Transfer truncated.
    #[error("transfer truncated")]
    TransferTruncated {
        /// Actual amount of bytes transferred.
        actual: usize,
        /// Expected number of bytes transferred.
        expected: usize,
    },
    /// Invalid argument provided.
    #[error("{0}")]
    Argument(&'static str),
    /// HackRF is in an invalid mode.
    #[error("HackRF in invalid mode. Required: {required:?}, actual: {actual:?}")]
    WrongMode {
        /// The mode required for this operation.
        required: Mode,
        /// The actual mode of the device which differs from `required`.
        actual: Mode,
    },
    /// A transmit session is already running on this device.
    #[error("streamer already active")]
    StreamerExists,
    /// The transmit thread panicked.
    #[error("transmit thread panicked")]
    ThreadPanicked,
    /// Device not found.
    #[error("Device not found")]
    NotFound,
}

/// Result type for operations that may return an `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A three-part version consisting of major, minor, and sub minor components.
///
/// The intended use case of `Version` is to extract meaning from the version fields in USB
/// descriptors, such as `bcdUSB` and `bcdDevice` in device descriptors.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
// nusb doesnt currently have this
pub struct UsbVersion(pub u8, pub u8, pub u8);

impl UsbVersion {
    /// Extracts a version from a binary coded decimal (BCD) field, encoded as `0xJJMN` where
    /// `JJ` is the major version, `M` the minor version and `N` the sub minor version.
    pub fn from_bcd(mut raw: u16) -> Self {
        let sub_minor: u8 = (raw & 0x000F) as u8;
        raw >>= 4;

        let minor: u8 = (raw & 0x000F) as u8;
        raw >>= 4;

        let mut major: u8 = (raw & 0x000F) as u8;
        raw >>= 4;

        major += (10 * raw) as u8;

        UsbVersion(major, minor, sub_minor)
    }

    /// Returns the major version.
    pub fn major(self) -> u8 {
        self.0
    }

    /// Returns the minor version.
    pub fn minor(self) -> u8 {
        self.1
    }

    /// Returns the sub minor version.
    pub fn sub_minor(self) -> u8 {
        self.2
    }
}

impl std::fmt::Display for UsbVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.sub_minor())
    }
}
