//! Typed access to camera settings and actions.
//!
//! [`Camera`] wraps an [`Interface`] and provides one method per setting.
//! Arguments are validated before anything is sent to the camera.

use crate::{
    Error, Interface, Read, Result, Write,
    decode::{
        CameraStatus, CursorEvent, Date, DecodedValue, Direction, MAX_PERCENTAGE, MirrorMode,
        Palette, ShutterMode, Version,
    },
    frame::{
        Class, Command, RwFlag,
        subclass::{camera, image, info, mirror},
    },
};
use alloc::string::String;
use log::{debug, warn};

/// Maximum number of pixels the cursor can be moved at once.
pub const MAX_CURSOR_STEP: u8 = 15;

/// Vignetting correction mode expected by the firmware.
const VIGNETTING_MODE: u8 = 0x02;

/// Identification and status of a camera module.
///
/// Queried using [`Camera::query_device_info`].
/// Only the model is mandatory, all other items are queried on a best-effort basis
/// and are `None` if the camera did not provide them.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DeviceInfo {
    /// Module model name.
    pub model: String,
    /// FPGA version.
    pub fpga_version: Option<Version>,
    /// FPGA build date.
    pub fpga_build_date: Option<Date>,
    /// Software version.
    pub software_version: Option<Version>,
    /// Software build date.
    pub software_build_date: Option<Date>,
    /// Calibration version, encoded as a date.
    pub calibration_version: Option<Date>,
    /// ISP parameter version.
    pub isp_version: Option<[u8; 4]>,
    /// Initialization status.
    pub status: Option<CameraStatus>,
}

/// JS-MINI256 camera module.
///
/// # Examples
///
/// ```no_run
/// use mini256::{camera::Camera, decode::{Direction, MirrorMode}, embedded_io_async::{Read, Write}};
///
/// # async fn example<P: Read + Write>(port: P) -> mini256::Result<(), P::Error> {
/// let mut camera = Camera::new(port);
///
/// if camera.is_connected().await {
///     camera.set_mirror(MirrorMode::Horizontal).await?;
///     camera.show_cursor().await?;
///     camera.move_cursor(Direction::Left, 10).await?;
///
///     println!("Brightness: {}", camera.query_brightness().await?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Camera<P> {
    intf: Interface<P>,
}

impl<P: Read + Write> Camera<P> {
    /// Constructs a new camera using the given port.
    pub fn new(port: P) -> Self {
        Self::from_interface(Interface::new(port))
    }

    /// Constructs a new camera on top of an existing interface.
    ///
    /// This allows configuring timeouts or an observer beforehand.
    pub fn from_interface(intf: Interface<P>) -> Self {
        Self { intf }
    }

    /// Returns the underlying interface.
    pub fn interface(&mut self) -> &mut Interface<P> {
        &mut self.intf
    }

    /// Consumes the camera, returning the underlying interface.
    pub fn into_interface(self) -> Interface<P> {
        self.intf
    }

    /// Returns a description of the most recent failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.intf.last_error()
    }

    /// Checks whether the camera responds with a model name.
    pub async fn is_connected(&mut self) -> bool {
        matches!(self.query_model().await, Ok(model) if !model.is_empty())
    }

    /// Queries the module model name, e.g. `MINI256`.
    pub async fn query_model(&mut self) -> Result<String, P::Error> {
        match self.query(Class::Info, info::MODEL).await? {
            DecodedValue::Model(model) => Ok(model),
            val => self.unexpected(&val),
        }
    }

    /// Queries the FPGA version.
    pub async fn query_fpga_version(&mut self) -> Result<Version, P::Error> {
        self.query_version(info::FPGA_VERSION).await
    }

    /// Queries the FPGA build date.
    pub async fn query_fpga_build_date(&mut self) -> Result<Date, P::Error> {
        self.query_date(info::FPGA_BUILD_DATE).await
    }

    /// Queries the software version.
    pub async fn query_software_version(&mut self) -> Result<Version, P::Error> {
        self.query_version(info::SOFTWARE_VERSION).await
    }

    /// Queries the software build date.
    pub async fn query_software_build_date(&mut self) -> Result<Date, P::Error> {
        self.query_date(info::SOFTWARE_BUILD_DATE).await
    }

    /// Queries the calibration version.
    ///
    /// The camera reports the date of its factory calibration.
    pub async fn query_calibration_version(&mut self) -> Result<Date, P::Error> {
        self.query_date(info::CALIBRATION_VERSION).await
    }

    /// Queries the raw ISP parameter version.
    pub async fn query_isp_version(&mut self) -> Result<[u8; 4], P::Error> {
        match self.query(Class::Info, info::ISP_VERSION).await? {
            DecodedValue::IspParameters(params) => Ok(params),
            val => self.unexpected(&val),
        }
    }

    /// Queries whether the camera has finished initializing.
    pub async fn query_status(&mut self) -> Result<CameraStatus, P::Error> {
        match self.query(Class::Camera, camera::STATUS).await? {
            DecodedValue::Status(status) => Ok(status),
            val => self.unexpected(&val),
        }
    }

    /// Queries all identification items.
    ///
    /// The model is queried first. If it cannot be read or is empty,
    /// no further items are queried and an error is returned.
    /// Failures of the remaining items leave the corresponding field empty.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedValue`] if the camera reports an empty model name.
    pub async fn query_device_info(&mut self) -> Result<DeviceInfo, P::Error> {
        let model = self.query_model().await?;

        if model.is_empty() {
            return self.intf.fail(Error::UnexpectedValue);
        }

        Ok(DeviceInfo {
            model,
            fpga_version: self.query_fpga_version().await.ok(),
            fpga_build_date: self.query_fpga_build_date().await.ok(),
            software_version: self.query_software_version().await.ok(),
            software_build_date: self.query_software_build_date().await.ok(),
            calibration_version: self.query_calibration_version().await.ok(),
            isp_version: self.query_isp_version().await.ok(),
            status: self.query_status().await.ok(),
        })
    }

    /// Sets the image brightness.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the value exceeds 100.
    pub async fn set_brightness(&mut self, val: u8) -> Result<(), P::Error> {
        self.set_percentage(image::BRIGHTNESS, val).await
    }

    /// Queries the image brightness.
    pub async fn query_brightness(&mut self) -> Result<u8, P::Error> {
        self.query_percentage(image::BRIGHTNESS).await
    }

    /// Sets the image contrast.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the value exceeds 100.
    pub async fn set_contrast(&mut self, val: u8) -> Result<(), P::Error> {
        self.set_percentage(image::CONTRAST, val).await
    }

    /// Queries the image contrast.
    pub async fn query_contrast(&mut self) -> Result<u8, P::Error> {
        self.query_percentage(image::CONTRAST).await
    }

    /// Sets the digital detail enhancement strength.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the value exceeds 100.
    pub async fn set_digital_enhancement(&mut self, val: u8) -> Result<(), P::Error> {
        self.set_percentage(image::DIGITAL_ENHANCEMENT, val).await
    }

    /// Queries the digital detail enhancement strength.
    pub async fn query_digital_enhancement(&mut self) -> Result<u8, P::Error> {
        self.query_percentage(image::DIGITAL_ENHANCEMENT).await
    }

    /// Sets the static noise reduction strength.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the value exceeds 100.
    pub async fn set_static_noise_reduction(&mut self, val: u8) -> Result<(), P::Error> {
        self.set_percentage(image::STATIC_NOISE_REDUCTION, val)
            .await
    }

    /// Queries the static noise reduction strength.
    pub async fn query_static_noise_reduction(&mut self) -> Result<u8, P::Error> {
        self.query_percentage(image::STATIC_NOISE_REDUCTION).await
    }

    /// Sets the dynamic noise reduction strength.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the value exceeds 100.
    pub async fn set_dynamic_noise_reduction(&mut self, val: u8) -> Result<(), P::Error> {
        self.set_percentage(image::DYNAMIC_NOISE_REDUCTION, val)
            .await
    }

    /// Queries the dynamic noise reduction strength.
    pub async fn query_dynamic_noise_reduction(&mut self) -> Result<u8, P::Error> {
        self.query_percentage(image::DYNAMIC_NOISE_REDUCTION).await
    }

    /// Sets the color palette.
    pub async fn set_palette(&mut self, palette: Palette) -> Result<(), P::Error> {
        self.write(Class::Image, image::PALETTE, palette as u8)
            .await
    }

    /// Queries the color palette.
    pub async fn query_palette(&mut self) -> Result<Palette, P::Error> {
        match self.query(Class::Image, image::PALETTE).await? {
            DecodedValue::Palette(palette) => Ok(palette),
            val => self.unexpected(&val),
        }
    }

    /// Sets the mirroring mode.
    pub async fn set_mirror(&mut self, mode: MirrorMode) -> Result<(), P::Error> {
        self.write(Class::Mirror, mirror::MODE, mode as u8).await
    }

    /// Queries the mirroring mode.
    pub async fn query_mirror(&mut self) -> Result<MirrorMode, P::Error> {
        match self.query(Class::Mirror, mirror::MODE).await? {
            DecodedValue::Mirror(mode) => Ok(mode),
            val => self.unexpected(&val),
        }
    }

    /// Sets the automatic shutter mode.
    pub async fn set_shutter_mode(&mut self, mode: ShutterMode) -> Result<(), P::Error> {
        self.write(Class::Camera, camera::SHUTTER_MODE, mode as u8)
            .await
    }

    /// Queries the automatic shutter mode.
    ///
    /// Unknown modes are rejected, use [`Interface::query`] to obtain the raw value.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedValue`] if the camera reports an unknown mode.
    pub async fn query_shutter_mode(&mut self) -> Result<ShutterMode, P::Error> {
        match self.query(Class::Camera, camera::SHUTTER_MODE).await? {
            DecodedValue::ShutterMode(mode) => Ok(mode),
            val => self.unexpected(&val),
        }
    }

    /// Sets the automatic shutter interval in minutes.
    pub async fn set_shutter_interval(&mut self, mins: u16) -> Result<(), P::Error> {
        let cmd = Command::new(
            Class::Camera as u8,
            camera::SHUTTER_INTERVAL,
            RwFlag::Write,
            &mins.to_be_bytes(),
        )
        .or_else(|_| self.intf.fail(Error::InvalidArgument))?;

        self.intf.send_command(&cmd).await?;

        Ok(())
    }

    /// Queries the automatic shutter interval in minutes.
    pub async fn query_shutter_interval(&mut self) -> Result<u16, P::Error> {
        match self.query(Class::Camera, camera::SHUTTER_INTERVAL).await? {
            DecodedValue::ShutterInterval(mins) => Ok(mins),
            val => self.unexpected(&val),
        }
    }

    /// Triggers a manual shutter calibration (flat-field correction).
    pub async fn calibrate_shutter(&mut self) -> Result<(), P::Error> {
        self.action(Class::Camera, camera::SHUTTER_CALIBRATION)
            .await
    }

    /// Triggers a manual background correction.
    ///
    /// The lens should be covered by a uniform surface while correcting.
    pub async fn correct_background(&mut self) -> Result<(), P::Error> {
        self.action(Class::Camera, camera::BACKGROUND_CORRECTION)
            .await
    }

    /// Triggers a vignetting correction.
    pub async fn correct_vignetting(&mut self) -> Result<(), P::Error> {
        self.write(Class::Camera, camera::VIGNETTING_CORRECTION, VIGNETTING_MODE)
            .await
    }

    /// Shows the cursor.
    pub async fn show_cursor(&mut self) -> Result<(), P::Error> {
        self.cursor(CursorEvent::Shown).await
    }

    /// Hides the cursor.
    pub async fn hide_cursor(&mut self) -> Result<(), P::Error> {
        self.cursor(CursorEvent::Hidden).await
    }

    /// Moves the cursor to the image center.
    pub async fn center_cursor(&mut self) -> Result<(), P::Error> {
        self.cursor(CursorEvent::Centered).await
    }

    /// Moves the cursor by the given number of pixels.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `pixels` is zero or exceeds [`MAX_CURSOR_STEP`].
    pub async fn move_cursor(&mut self, direction: Direction, pixels: u8) -> Result<(), P::Error> {
        if !(1..=MAX_CURSOR_STEP).contains(&pixels) {
            return self.intf.fail(Error::InvalidArgument);
        }

        self.cursor(CursorEvent::Moved { direction, pixels })
            .await
    }

    /// Marks the pixel under the cursor as dead.
    pub async fn add_dead_pixel(&mut self) -> Result<(), P::Error> {
        self.cursor(CursorEvent::DeadPixelAdded).await
    }

    /// Removes the dead pixel mark from the pixel under the cursor.
    pub async fn remove_dead_pixel(&mut self) -> Result<(), P::Error> {
        self.cursor(CursorEvent::DeadPixelRemoved).await
    }

    /// Persists the current configuration.
    ///
    /// Changed settings are lost on power loss unless they are saved.
    pub async fn save_configuration(&mut self) -> Result<(), P::Error> {
        self.action(Class::Info, info::SAVE_CONFIGURATION).await
    }

    /// Restores the factory configuration.
    pub async fn restore_factory(&mut self) -> Result<(), P::Error> {
        self.action(Class::Info, info::RESTORE_FACTORY).await
    }

    async fn query(&mut self, class: Class, subclass: u8) -> Result<DecodedValue, P::Error> {
        self.intf.query(class, subclass).await
    }

    async fn query_percentage(&mut self, subclass: u8) -> Result<u8, P::Error> {
        match self.query(Class::Image, subclass).await? {
            DecodedValue::Percentage(val) => Ok(val),
            val => self.unexpected(&val),
        }
    }

    async fn query_version(&mut self, subclass: u8) -> Result<Version, P::Error> {
        match self.query(Class::Info, subclass).await? {
            DecodedValue::Version(ver) => Ok(ver),
            val => self.unexpected(&val),
        }
    }

    async fn query_date(&mut self, subclass: u8) -> Result<Date, P::Error> {
        match self.query(Class::Info, subclass).await? {
            DecodedValue::Date(date) => Ok(date),
            val => self.unexpected(&val),
        }
    }

    async fn set_percentage(&mut self, subclass: u8, val: u8) -> Result<(), P::Error> {
        if val > MAX_PERCENTAGE {
            return self.intf.fail(Error::InvalidArgument);
        }

        self.write(Class::Image, subclass, val).await
    }

    async fn cursor(&mut self, ev: CursorEvent) -> Result<(), P::Error> {
        debug!("Cursor command: {ev:?}");

        self.write(Class::Image, image::CURSOR, ev.code()).await
    }

    async fn write(&mut self, class: Class, subclass: u8, val: u8) -> Result<(), P::Error> {
        self.intf
            .send_command(&Command::write(class, subclass, val))
            .await?;

        Ok(())
    }

    async fn action(&mut self, class: Class, subclass: u8) -> Result<(), P::Error> {
        self.intf
            .send_command(&Command::action(class, subclass))
            .await?;

        Ok(())
    }

    fn unexpected<T>(&mut self, val: &DecodedValue) -> Result<T, P::Error> {
        warn!("Unexpected response value: {val:?}");

        self.intf.fail(Error::UnexpectedValue)
    }
}
