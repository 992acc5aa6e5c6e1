//! Semantic decoding of camera responses.
//!
//! [`decode`] interprets a received frame based on its class and subclass.
//! Decoding never fails: frames that are unknown or too short for their
//! expected contents decode to [`DecodedValue::Unrecognized`].

use crate::frame::{
    Class, FrameView, Layout,
    subclass::{camera, image, info, mirror},
};
use alloc::string::String;
use core::fmt::{self, Formatter};
use log::debug;
use strum::{Display, EnumString, FromRepr, VariantNames};

/// Upper bound of percentage settings.
pub const MAX_PERCENTAGE: u8 = 100;

/// Color palette used to render the thermal image.
#[derive(FromRepr, Display, EnumString, VariantNames, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "title_case", ascii_case_insensitive)]
#[repr(u8)]
pub enum Palette {
    /// Hot objects are rendered white.
    WhiteHot,
    /// Hot objects are rendered black.
    BlackHot,
    /// Iron color gradient.
    Iron,
    /// Rainbow color gradient.
    Rainbow,
    /// Rain color gradient.
    Rain,
    /// Ice and fire color gradient.
    IceFire,
    /// Fusion color gradient.
    Fusion,
    /// Sepia tones.
    Sepia,
    /// Vendor palette 1.
    Color1,
    /// Vendor palette 2.
    Color2,
    /// Vendor palette 3.
    Color3,
    /// Vendor palette 4.
    Color4,
    /// Vendor palette 5.
    Color5,
    /// Vendor palette 6.
    Color6,
    /// Vendor palette 7.
    Color7,
}

/// Image mirroring mode.
#[derive(FromRepr, Display, EnumString, VariantNames, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "title_case", ascii_case_insensitive)]
#[repr(u8)]
pub enum MirrorMode {
    /// No mirroring.
    Disabled,
    /// Mirrored around the image center.
    Central,
    /// Mirrored horizontally.
    Horizontal,
    /// Mirrored vertically.
    Vertical,
}

/// Automatic shutter mode.
#[derive(FromRepr, Display, EnumString, VariantNames, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "title_case", ascii_case_insensitive)]
#[repr(u8)]
pub enum ShutterMode {
    /// Shutter is never triggered.
    Disabled,
    /// Shutter is only triggered on request.
    Manual,
    /// Shutter is triggered at the configured interval.
    Automatic,
    /// Shutter is triggered whenever the camera deems it necessary.
    FullyAutomatic,
}

/// Camera initialization status.
#[derive(FromRepr, Display, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum CameraStatus {
    /// The camera is still loading.
    Initializing,
    /// Video output is active.
    Active,
}

/// Cursor movement direction.
///
/// The discriminant is the single-step cursor code,
/// its value shifted by four bits selects multi-pixel movement.
#[derive(FromRepr, Display, EnumString, VariantNames, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum Direction {
    /// Move up.
    Up = 0x02,
    /// Move down.
    Down = 0x03,
    /// Move left.
    Left = 0x04,
    /// Move right.
    Right = 0x05,
}

/// Cursor control event.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum CursorEvent {
    /// The cursor was hidden.
    Hidden,
    /// The cursor was shown.
    Shown,
    /// The cursor was moved to the image center.
    Centered,
    /// The cursor was moved.
    Moved {
        /// Movement direction.
        direction: Direction,
        /// Number of pixels.
        pixels: u8,
    },
    /// The pixel under the cursor was marked as dead.
    DeadPixelAdded,
    /// The pixel under the cursor was unmarked.
    DeadPixelRemoved,
}

impl CursorEvent {
    const HIDE: u8 = 0x00;
    const CENTER: u8 = 0x06;
    const ADD_DEAD_PIXEL: u8 = 0x0d;
    const REMOVE_DEAD_PIXEL: u8 = 0x0e;
    const SHOW: u8 = 0x0f;

    /// Returns the wire code of the event.
    ///
    /// Single-pixel moves use the dedicated direction code,
    /// larger moves carry the pixel count in the lower nibble.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Hidden => Self::HIDE,
            Self::Shown => Self::SHOW,
            Self::Centered => Self::CENTER,
            Self::Moved {
                direction,
                pixels: 1,
            } => direction as u8,
            Self::Moved { direction, pixels } => ((direction as u8) << 4) | (pixels & 0x0f),
            Self::DeadPixelAdded => Self::ADD_DEAD_PIXEL,
            Self::DeadPixelRemoved => Self::REMOVE_DEAD_PIXEL,
        }
    }

    /// Interprets a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            Self::HIDE => Some(Self::Hidden),
            Self::SHOW => Some(Self::Shown),
            Self::CENTER => Some(Self::Centered),
            Self::ADD_DEAD_PIXEL => Some(Self::DeadPixelAdded),
            Self::REMOVE_DEAD_PIXEL => Some(Self::DeadPixelRemoved),
            0x02..=0x05 => Direction::from_repr(code).map(|direction| Self::Moved {
                direction,
                pixels: 1,
            }),
            _ => Direction::from_repr(code >> 4).map(|direction| Self::Moved {
                direction,
                pixels: code & 0x0f,
            }),
        }
    }
}

/// Completed action reported by the camera.
#[derive(Display, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "title_case")]
pub enum Event {
    /// The configuration was persisted.
    ConfigurationSaved,
    /// The factory configuration was restored.
    FactoryRestored,
    /// A manual shutter calibration was performed.
    ShutterCalibrated,
    /// A manual background correction was performed.
    BackgroundCorrected,
    /// A vignetting correction was performed.
    VignettingCorrected,
}

/// A version triple.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Version {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A simple date, consisting of year, month and day.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Date {
    /// Year value.
    pub year: u32,
    /// Month value.
    pub month: u8,
    /// Day value.
    pub day: u8,
}

impl Date {
    /// Unpacks a date stored as the decimal number `YYYYMMDD`.
    #[must_use]
    pub fn from_packed(val: u32) -> Self {
        // Both remainders are below 100
        let two_digits = |x: u32| u8::try_from(x % 100).unwrap_or_default();

        Self {
            year: val / 10000,
            month: two_digits(val / 100),
            day: two_digits(val),
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// The interpretation of a received frame.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum DecodedValue {
    /// A percentage setting between 0 and 100.
    Percentage(u8),
    /// The color palette.
    Palette(Palette),
    /// The mirroring mode.
    Mirror(MirrorMode),
    /// The automatic shutter mode.
    ShutterMode(ShutterMode),
    /// An automatic shutter mode outside the known range.
    RawShutterMode(u8),
    /// The automatic shutter interval in minutes.
    ShutterInterval(u16),
    /// The camera initialization status.
    Status(CameraStatus),
    /// A firmware version.
    Version(Version),
    /// A build or calibration date.
    Date(Date),
    /// The raw ISP parameter version.
    IspParameters([u8; 4]),
    /// The module model name.
    Model(String),
    /// A cursor control event.
    Cursor(CursorEvent),
    /// A completed action.
    Event(Event),
    /// The frame could not be interpreted.
    Unrecognized {
        /// Class of the frame.
        class: u8,
        /// Subclass of the frame.
        subclass: u8,
    },
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percentage(val) => write!(f, "{val}/100"),
            Self::Palette(palette) => write!(f, "{palette}"),
            Self::Mirror(mode) => write!(f, "{mode}"),
            Self::ShutterMode(mode) => write!(f, "{mode}"),
            Self::RawShutterMode(val) => write!(f, "unknown shutter mode {val:#04x}"),
            Self::ShutterInterval(mins) => write!(f, "{mins} min"),
            Self::Status(status) => write!(f, "{status}"),
            Self::Version(ver) => write!(f, "{ver}"),
            Self::Date(date) => write!(f, "{date}"),
            Self::IspParameters(params) => write!(
                f,
                "{:02x}{:02x}{:02x}{:02x}",
                params[0], params[1], params[2], params[3]
            ),
            Self::Model(model) => write!(f, "{model}"),
            Self::Cursor(ev) => write!(f, "{ev:?}"),
            Self::Event(ev) => write!(f, "{ev}"),
            Self::Unrecognized { class, subclass } => {
                write!(f, "unrecognized frame {class:#04x}/{subclass:#04x}")
            }
        }
    }
}

fn percentage(payload: &[u8]) -> Option<DecodedValue> {
    payload
        .first()
        .filter(|&&val| val <= MAX_PERCENTAGE)
        .map(|&val| DecodedValue::Percentage(val))
}

fn version(payload: &[u8]) -> Option<DecodedValue> {
    match *payload {
        [major, minor, patch, ..] => Some(DecodedValue::Version(Version {
            major,
            minor,
            patch,
        })),
        _ => None,
    }
}

fn packed(payload: &[u8]) -> Option<[u8; 4]> {
    payload.get(..4)?.try_into().ok()
}

fn model(frame: &FrameView<'_>) -> DecodedValue {
    let payload = frame.payload();
    let text = match frame.layout() {
        // Bounded by the declared data length
        Layout::LengthPrefixed => payload
            .get(..usize::from(frame.first_data_byte()))
            .unwrap_or(payload),
        Layout::Bare => payload,
    };
    let name: String = text.iter().map(|&b| char::from(b)).collect();
    let trimmed = name.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());

    DecodedValue::Model(trimmed.into())
}

fn decode_info(sub: u8, frame: &FrameView<'_>) -> Option<DecodedValue> {
    let payload = frame.payload();

    match sub {
        info::MODEL => Some(model(frame)),
        info::FPGA_VERSION | info::SOFTWARE_VERSION => version(payload),
        info::FPGA_BUILD_DATE | info::SOFTWARE_BUILD_DATE | info::CALIBRATION_VERSION => {
            packed(payload).map(|b| DecodedValue::Date(Date::from_packed(u32::from_be_bytes(b))))
        }
        info::ISP_VERSION => packed(payload).map(DecodedValue::IspParameters),
        info::SAVE_CONFIGURATION => Some(DecodedValue::Event(Event::ConfigurationSaved)),
        info::RESTORE_FACTORY => Some(DecodedValue::Event(Event::FactoryRestored)),
        _ => None,
    }
}

fn decode_camera(sub: u8, payload: &[u8]) -> Option<DecodedValue> {
    match sub {
        camera::STATUS => payload
            .first()
            .and_then(|&val| CameraStatus::from_repr(val))
            .map(DecodedValue::Status),
        camera::SHUTTER_CALIBRATION => Some(DecodedValue::Event(Event::ShutterCalibrated)),
        camera::BACKGROUND_CORRECTION => Some(DecodedValue::Event(Event::BackgroundCorrected)),
        camera::SHUTTER_MODE => payload.first().map(|&val| {
            ShutterMode::from_repr(val)
                .map_or(DecodedValue::RawShutterMode(val), DecodedValue::ShutterMode)
        }),
        camera::SHUTTER_INTERVAL => match *payload {
            [hi, lo, ..] => Some(DecodedValue::ShutterInterval(u16::from_be_bytes([hi, lo]))),
            [val] => Some(DecodedValue::ShutterInterval(val.into())),
            [] => None,
        },
        camera::VIGNETTING_CORRECTION => Some(DecodedValue::Event(Event::VignettingCorrected)),
        _ => None,
    }
}

fn decode_image(sub: u8, frame: &FrameView<'_>) -> Option<DecodedValue> {
    let payload = frame.payload();

    match sub {
        image::BRIGHTNESS
        | image::CONTRAST
        | image::DIGITAL_ENHANCEMENT
        | image::STATIC_NOISE_REDUCTION
        | image::DYNAMIC_NOISE_REDUCTION => percentage(payload),
        // The camera reports the palette right after the flag in both layouts
        image::PALETTE => Palette::from_repr(frame.first_data_byte()).map(DecodedValue::Palette),
        image::CURSOR => payload
            .first()
            .and_then(|&code| CursorEvent::from_code(code))
            .map(DecodedValue::Cursor),
        _ => None,
    }
}

/// Decodes a received frame.
///
/// Returns [`DecodedValue::Unrecognized`] if the class and subclass are unknown
/// or if the payload does not contain a valid value.
#[must_use]
pub fn decode(frame: &FrameView<'_>) -> DecodedValue {
    let (class, sub) = (frame.class(), frame.subclass());
    let payload = frame.payload();
    let val = match Class::from_repr(class) {
        Some(Class::Info) => decode_info(sub, frame),
        Some(Class::Camera) => decode_camera(sub, payload),
        Some(Class::Image) => decode_image(sub, frame),
        Some(Class::Mirror) if sub == mirror::MODE => payload
            .first()
            .and_then(|&val| MirrorMode::from_repr(val))
            .map(DecodedValue::Mirror),
        _ => None,
    };

    val.unwrap_or_else(|| {
        debug!("Unrecognized frame: {:02x?}", frame.as_bytes());

        DecodedValue::Unrecognized {
            class,
            subclass: sub,
        }
    })
}
