//! Wire frame encoding, parsing and checksum computation.
//!
//! Every frame exchanged with the camera has the following structure:
//!
//! ```text
//! F0 LEN ADDR CLASS SUBCLASS RW [PAYLOAD...] CHECKSUM FF
//! ```
//!
//! The checksum is the 8-bit wrapping sum of `ADDR`, `CLASS`, `SUBCLASS`, `RW`
//! and all payload bytes. The `LEN` field is not authoritative and is always
//! written as [`LENGTH`].
//!
//! Some firmware revisions insert an additional data length byte in front of
//! the payload of their responses. [`FrameView::parse`] detects this per frame,
//! see [`Layout`].

use core::{
    fmt::{Display, Formatter},
    num::Wrapping,
};
use log::trace;
use strum::{EnumString, FromRepr, VariantNames};

/// Start-of-frame marker.
pub const HEADER: u8 = 0xf0;

/// End-of-frame marker.
pub const FOOTER: u8 = 0xff;

/// Bus address of the camera module.
pub const DEVICE_ADDR: u8 = 0x36;

/// Value of the length field in outbound frames.
pub const LENGTH: u8 = 0x05;

/// Maximum number of payload bytes in an outbound frame.
pub const MAX_PAYLOAD_LEN: usize = 9;

/// Number of bytes surrounding the payload (header, length, address, class,
/// subclass, flag, checksum and footer).
pub const FRAME_OVERHEAD: usize = 8;

/// Maximum length of an outbound frame.
pub const MAX_FRAME_LEN: usize = FRAME_OVERHEAD + MAX_PAYLOAD_LEN;

/// Minimum length of a response to be considered valid.
pub const MIN_FRAME_LEN: usize = 7;

// Index of the first byte after the flag field
const PAYLOAD_OFFSET: usize = 6;

/// Read/write flag of a frame.
///
/// Read commands are always answered by the camera,
/// while write and action commands are never acknowledged.
#[derive(FromRepr, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum RwFlag {
    /// Write a setting or trigger an action.
    Write = 0x00,
    /// Read a setting or information item.
    Read = 0x01,
}

impl RwFlag {
    /// Returns whether the camera replies to commands with this flag.
    #[must_use]
    pub const fn expects_response(self) -> bool {
        matches!(self, Self::Read)
    }
}

/// Command class, the first level of the command address.
#[derive(FromRepr, EnumString, VariantNames, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Class {
    /// Mirroring settings.
    Mirror = 0x70,
    /// Device information and configuration storage.
    Info = 0x74,
    /// Image processing settings and cursor control.
    Image = 0x78,
    /// Shutter control and camera status.
    Camera = 0x7c,
}

/// Subclass addresses, grouped by [`Class`].
pub mod subclass {
    /// Subclasses of [`Class::Info`](super::Class::Info).
    pub mod info {
        /// Module model name (ASCII).
        pub const MODEL: u8 = 0x02;
        /// FPGA version triple.
        pub const FPGA_VERSION: u8 = 0x03;
        /// FPGA build date.
        pub const FPGA_BUILD_DATE: u8 = 0x04;
        /// Software version triple.
        pub const SOFTWARE_VERSION: u8 = 0x05;
        /// Software build date.
        pub const SOFTWARE_BUILD_DATE: u8 = 0x06;
        /// Camera calibration version, encoded as a date.
        pub const CALIBRATION_VERSION: u8 = 0x0b;
        /// ISP parameter version.
        pub const ISP_VERSION: u8 = 0x0c;
        /// Restore factory configuration.
        pub const RESTORE_FACTORY: u8 = 0x0f;
        /// Persist the current configuration.
        pub const SAVE_CONFIGURATION: u8 = 0x10;
    }

    /// Subclasses of [`Class::Camera`](super::Class::Camera).
    pub mod camera {
        /// Manual shutter calibration (flat-field correction).
        pub const SHUTTER_CALIBRATION: u8 = 0x02;
        /// Manual background correction.
        pub const BACKGROUND_CORRECTION: u8 = 0x03;
        /// Automatic shutter mode.
        pub const SHUTTER_MODE: u8 = 0x04;
        /// Automatic shutter interval in minutes.
        pub const SHUTTER_INTERVAL: u8 = 0x05;
        /// Vignetting correction.
        pub const VIGNETTING_CORRECTION: u8 = 0x0c;
        /// Initialization status.
        pub const STATUS: u8 = 0x14;
    }

    /// Subclasses of [`Class::Image`](super::Class::Image).
    pub mod image {
        /// Brightness percentage.
        pub const BRIGHTNESS: u8 = 0x02;
        /// Contrast percentage.
        pub const CONTRAST: u8 = 0x03;
        /// Digital detail enhancement percentage.
        pub const DIGITAL_ENHANCEMENT: u8 = 0x10;
        /// Static noise reduction percentage.
        pub const STATIC_NOISE_REDUCTION: u8 = 0x15;
        /// Dynamic noise reduction percentage.
        pub const DYNAMIC_NOISE_REDUCTION: u8 = 0x16;
        /// Cursor control.
        pub const CURSOR: u8 = 0x1a;
        /// Color palette.
        pub const PALETTE: u8 = 0x20;
    }

    /// Subclasses of [`Class::Mirror`](super::Class::Mirror).
    pub mod mirror {
        /// Mirroring mode.
        pub const MODE: u8 = 0x11;
    }
}

/// Error returned when a payload does not fit into a frame.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct PayloadTooLong(pub usize);

impl Display for PayloadTooLong {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "payload of {} bytes exceeds maximum of {MAX_PAYLOAD_LEN} bytes",
            self.0
        )
    }
}

impl core::error::Error for PayloadTooLong {}

fn sum(data: &[u8]) -> Wrapping<u8> {
    data.iter().map(|&x| Wrapping(x)).sum()
}

/// Computes the frame checksum over the address fields and the payload.
#[must_use]
pub fn checksum(device: u8, class: u8, subclass: u8, rw: u8, payload: &[u8]) -> u8 {
    (sum(&[device, class, subclass, rw]) + sum(payload)).0
}

/// A logical command, prior to encoding.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Command {
    class: u8,
    subclass: u8,
    rw: RwFlag,
    payload: [u8; MAX_PAYLOAD_LEN],
    len: usize,
}

impl Command {
    /// Constructs a new command.
    ///
    /// # Errors
    ///
    /// - [`PayloadTooLong`] if the payload exceeds [`MAX_PAYLOAD_LEN`] bytes.
    pub fn new(class: u8, subclass: u8, rw: RwFlag, data: &[u8]) -> Result<Self, PayloadTooLong> {
        let mut payload = [0x00; MAX_PAYLOAD_LEN];

        payload
            .get_mut(..data.len())
            .ok_or(PayloadTooLong(data.len()))?
            .copy_from_slice(data);

        let cmd = Self {
            class,
            subclass,
            rw,
            payload,
            len: data.len(),
        };

        trace!("New command: {cmd:x?}");

        Ok(cmd)
    }

    /// Constructs a read command.
    ///
    /// The camera expects a single zero byte as payload for read requests.
    #[must_use]
    pub fn read(class: Class, subclass: u8) -> Self {
        Self {
            class: class as u8,
            subclass,
            rw: RwFlag::Read,
            payload: [0x00; MAX_PAYLOAD_LEN],
            len: 1,
        }
    }

    /// Constructs a write command with a single-byte payload.
    #[must_use]
    pub fn write(class: Class, subclass: u8, val: u8) -> Self {
        let mut payload = [0x00; MAX_PAYLOAD_LEN];

        payload[0] = val;

        Self {
            class: class as u8,
            subclass,
            rw: RwFlag::Write,
            payload,
            len: 1,
        }
    }

    /// Constructs an action command without parameters.
    ///
    /// Actions are sent as write commands with a zero byte as payload.
    #[must_use]
    pub fn action(class: Class, subclass: u8) -> Self {
        Self::write(class, subclass, 0x00)
    }

    /// Returns the command class.
    #[must_use]
    pub fn class(&self) -> u8 {
        self.class
    }

    /// Returns the command subclass.
    #[must_use]
    pub fn subclass(&self) -> u8 {
        self.subclass
    }

    /// Returns the read/write flag.
    #[must_use]
    pub fn rw(&self) -> RwFlag {
        self.rw
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Encodes the command into a frame addressed to [`DEVICE_ADDR`].
    #[must_use]
    pub fn encode(&self) -> Frame {
        Frame::build(
            DEVICE_ADDR,
            self.class,
            self.subclass,
            self.rw as u8,
            self.payload(),
        )
    }
}

/// An encoded outbound frame.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Frame {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    /// Encodes a frame from its individual fields.
    ///
    /// # Errors
    ///
    /// - [`PayloadTooLong`] if the payload exceeds [`MAX_PAYLOAD_LEN`] bytes.
    pub fn encode(
        device: u8,
        class: u8,
        subclass: u8,
        rw: u8,
        payload: &[u8],
    ) -> Result<Self, PayloadTooLong> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PayloadTooLong(payload.len()));
        }

        Ok(Self::build(device, class, subclass, rw, payload))
    }

    fn build(device: u8, class: u8, subclass: u8, rw: u8, payload: &[u8]) -> Self {
        let len = FRAME_OVERHEAD + payload.len();
        let mut buf = [0x00; MAX_FRAME_LEN];

        buf[..PAYLOAD_OFFSET].copy_from_slice(&[HEADER, LENGTH, device, class, subclass, rw]);
        buf[PAYLOAD_OFFSET..len - 2].copy_from_slice(payload);
        buf[len - 2] = checksum(device, class, subclass, rw, payload);
        buf[len - 1] = FOOTER;

        Self { buf, len }
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Payload layout of a received frame.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Layout {
    /// Payload directly follows the flag byte, as in outbound frames.
    Bare,
    /// A data length byte follows the flag byte, the payload starts after it.
    LengthPrefixed,
}

impl Layout {
    /// Detects the payload layout of a frame.
    ///
    /// The layout whose checksum matches wins. If both or neither match,
    /// the frame is length-prefixed only if the byte after the flag equals
    /// the number of bytes between it and the checksum.
    fn detect(bytes: &[u8]) -> Self {
        let len = bytes.len();

        if len <= FRAME_OVERHEAD {
            return Self::Bare;
        }

        let received = Wrapping(bytes[len - 2]);
        let addr = sum(&bytes[2..PAYLOAD_OFFSET]);
        let bare = addr + sum(&bytes[PAYLOAD_OFFSET..len - 2]) == received;
        let prefixed = addr + sum(&bytes[PAYLOAD_OFFSET + 1..len - 2]) == received;
        let declared_fits =
            len > FRAME_OVERHEAD + 1 && usize::from(bytes[PAYLOAD_OFFSET]) + FRAME_OVERHEAD + 1 == len;

        match (bare, prefixed) {
            (true, false) => Self::Bare,
            (false, true) => Self::LengthPrefixed,
            _ if declared_fits => Self::LengthPrefixed,
            _ => Self::Bare,
        }
    }
}

/// A borrowed view of a received frame.
///
/// The view does not verify the header, footer or checksum,
/// since the camera's replies are known to deviate from the outbound format.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
    layout: Layout,
}

impl<'a> FrameView<'a> {
    /// Parses a received frame.
    ///
    /// Returns `None` if the frame is shorter than [`MIN_FRAME_LEN`].
    #[must_use]
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < MIN_FRAME_LEN {
            return None;
        }

        Some(Self {
            bytes,
            layout: Layout::detect(bytes),
        })
    }

    /// Returns the raw frame bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Returns the detected payload layout.
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns the device address.
    #[must_use]
    pub fn device(&self) -> u8 {
        self.bytes[2]
    }

    /// Returns the command class.
    #[must_use]
    pub fn class(&self) -> u8 {
        self.bytes[3]
    }

    /// Returns the command subclass.
    #[must_use]
    pub fn subclass(&self) -> u8 {
        self.bytes[4]
    }

    /// Returns the raw read/write flag.
    ///
    /// Replies may carry values other than [`RwFlag::Read`] or [`RwFlag::Write`].
    #[must_use]
    pub fn flag(&self) -> u8 {
        self.bytes[5]
    }

    /// Returns the read/write flag, if it is a known value.
    #[must_use]
    pub fn rw(&self) -> Option<RwFlag> {
        RwFlag::from_repr(self.flag())
    }

    /// Returns the byte directly following the flag field.
    ///
    /// Depending on the layout this is either the first payload byte
    /// or the data length.
    #[must_use]
    pub fn first_data_byte(&self) -> u8 {
        self.bytes[PAYLOAD_OFFSET]
    }

    /// Returns the payload bytes according to the detected layout.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        let start = match self.layout {
            Layout::Bare => PAYLOAD_OFFSET,
            Layout::LengthPrefixed => PAYLOAD_OFFSET + 1,
        };

        self.bytes.get(start..self.bytes.len() - 2).unwrap_or(&[])
    }

    /// Returns whether the checksum field matches the frame contents.
    #[must_use]
    pub fn is_checksum_valid(&self) -> bool {
        let len = self.bytes.len();

        len > PAYLOAD_OFFSET
            && checksum(
                self.device(),
                self.class(),
                self.subclass(),
                self.flag(),
                self.payload(),
            ) == self.bytes[len - 2]
    }
}

impl<'a> From<&'a Frame> for FrameView<'a> {
    fn from(frame: &'a Frame) -> Self {
        Self {
            bytes: frame.as_bytes(),
            layout: Layout::Bare,
        }
    }
}
