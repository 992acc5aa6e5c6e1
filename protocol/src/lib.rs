//! Control JS-MINI256 thermal camera modules via their serial command protocol.
//!
//! # Overview
//!
//! The `mini256` crate implements the framed binary protocol spoken by
//! JS-MINI256 thermal imaging modules. It offers an asynchronous,
//! platform-agnostic API for querying and changing camera settings.
//!
//! Depending on your needs, you can:
//!
//! - Use [`camera::Camera`] for typed access to every setting and action.
//! - Work directly with the low-level [`Interface`] to send arbitrary commands.
//! - Use the [`frame`], [`reassembly`] and [`decode`] modules on their own,
//!   e.g. to analyze captured traffic.
//!
//! # Getting started
//!
//! The module exposes a UART that must be configured as follows:
//!
//! - **Baud rate:** 115200
//! - **Parity:** None
//! - **Data bits:** 8
//! - **Stop bits:** 1
//!
//! If you enable the `native-serial` feature, you can obtain a compatible
//! serial port instance using `serial::open`.
//!
//! # Examples
//!
//! ## Typed access using [`camera::Camera`]
//!
//! ```no_run
//! use mini256::{camera::Camera, decode::Palette, embedded_io_async::{Read, Write}};
//!
//! # async fn example<P: Read + Write>(port: P) -> mini256::Result<(), P::Error> {
//! let mut camera = Camera::new(port);
//!
//! println!("Model: {}", camera.query_model().await?);
//!
//! camera.set_brightness(80).await?;
//! camera.set_palette(Palette::IceFire).await?;
//! camera.save_configuration().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Low-level access using [`Interface`]
//!
//! ```no_run
//! use mini256::{Interface, embedded_io_async::{Read, Write}, frame::{Class, Command}};
//!
//! # async fn example<P: Read + Write>(port: P) -> mini256::Result<(), P::Error> {
//! let mut intf = Interface::new(port);
//! let cmd = Command::write(Class::Image, 0x02, 50);
//!
//! if let Some(val) = intf.send_command(&cmd).await? {
//!     println!("Response: {val}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Protocol details
//!
//! Every exchange is initiated by the host. Read commands are answered with
//! a single frame, write and action commands are never acknowledged.
//! Responses carry no reliable length information, so they are considered
//! complete once the line has been silent for a short time
//! (see [`reassembly::Timeouts`]).

#![no_std]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod camera;
pub mod decode;
pub mod frame;
pub mod reassembly;

#[cfg(feature = "native-serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "native-serial")))]
pub mod serial;

pub use embedded_io_async;

use alloc::{
    boxed::Box,
    string::{String, ToString},
};
use core::fmt::{Debug, Display, Formatter};
use decode::{DecodedValue, decode};
use embassy_time::Instant;
use embedded_io_async::{Read, Write};
use frame::{Class, Command, FrameView, RwFlag};
use log::{debug, trace, warn};
use reassembly::{Reassembler, Response, State, Timeouts};

/// A specialized [`Result`] type for [`Interface`] operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for [`Interface`] operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// The provided argument is invalid.
    InvalidArgument,
    /// The camera did not complete its response in time.
    Timeout,
    /// The response was too short to be interpreted.
    ShortResponse(usize),
    /// The port reached end-of-file before any response byte was received.
    TransportUnavailable,
    /// The response does not match the requested setting.
    UnexpectedValue,
    /// A port-specific input/output error.
    Io(E),
}

impl<E: Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Timeout => write!(f, "response timed out"),
            Self::ShortResponse(len) => write!(f, "response too short ({len} bytes)"),
            Self::TransportUnavailable => write!(f, "transport unavailable"),
            Self::UnexpectedValue => write!(f, "unexpected value"),
            Self::Io(err) => write!(f, "input/output error: {err:?}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Io(err)
    }
}

/// Receiver of decoded responses.
///
/// An observer is registered using [`Interface::with_observer`]
/// and notified of every response that was successfully reassembled,
/// both for requests and for frames received via [`Interface::listen`].
#[async_trait::async_trait(?Send)]
pub trait Observer {
    /// Called with every received frame and its interpretation.
    async fn on_response(&mut self, frame: &FrameView<'_>, val: &DecodedValue);
}

/// Asynchronous camera protocol interface.
///
/// Requires a port that implements [`Read`] and [`Write`] for communication.
///
/// The interface owns a single response slot, so only one request can be
/// in flight at a time. This is enforced by every operation taking `&mut self`.
/// Most users should use [`camera::Camera`], which provides
/// typed methods for all known settings.
///
/// # Examples
///
/// ```no_run
/// use mini256::{Interface, embedded_io_async::{Read, Write}, frame::{Class, subclass}};
///
/// # async fn example<P: Read + Write>(port: P) -> mini256::Result<(), P::Error> {
/// let mut intf = Interface::new(port);
///
/// println!("Status: {}", intf.query(Class::Camera, subclass::camera::STATUS).await?);
/// # Ok(())
/// # }
/// ```
pub struct Interface<P> {
    port: P,
    asm: Reassembler,
    observer: Option<Box<dyn Observer>>,
    last_error: Option<String>,
    busy: bool,
}

impl<P: Debug> Debug for Interface<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interface")
            .field("port", &self.port)
            .field("asm", &self.asm)
            .field("observer", &self.observer.is_some())
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<P: Read + Write> Interface<P> {
    /// Constructs a new interface using the default timeouts.
    pub fn new(port: P) -> Self {
        Self {
            port,
            asm: Reassembler::default(),
            observer: None,
            last_error: None,
            busy: false,
        }
    }

    /// Constructs a new interface that notifies the given observer
    /// of every decoded response.
    pub fn with_observer(port: P, observer: impl Observer + 'static) -> Self {
        Self {
            observer: Some(Box::new(observer)),
            ..Self::new(port)
        }
    }

    /// Returns the response timeouts.
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        self.asm.timeouts()
    }

    /// Changes the response timeouts.
    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.asm.set_timeouts(timeouts);
    }

    /// Returns a description of the most recent failure.
    ///
    /// The description is kept until the next failure occurs.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the most recently received response, including invalid ones.
    #[must_use]
    pub fn last_response(&self) -> Response<'_> {
        self.asm.response()
    }

    /// Reads a setting or information item and returns its interpretation.
    pub async fn query(&mut self, class: Class, subclass: u8) -> Result<DecodedValue, P::Error> {
        let cmd = Command::read(class, subclass);
        let resp = self.send_command(&cmd).await?;

        // Read commands are always answered
        resp.map_or_else(|| self.fail(Error::UnexpectedValue), Ok)
    }

    /// Sends a command.
    ///
    /// For read commands, the response is awaited and its interpretation returned.
    /// Write and action commands return `None` as soon as the frame was written.
    pub async fn send_command(&mut self, cmd: &Command) -> Result<Option<DecodedValue>, P::Error> {
        let frame = cmd.encode();

        debug!(
            "Sending command {:#04x}/{:#04x} ({:?})",
            cmd.class(),
            cmd.subclass(),
            cmd.rw()
        );

        self.transact(frame.as_bytes(), cmd.rw().expects_response())
            .await
    }

    /// Sends a pre-built frame.
    ///
    /// A response is awaited only if the frame's flag byte requests a read.
    /// The frame is sent as-is, without validating its checksum.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the frame is empty.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<Option<DecodedValue>, P::Error> {
        if bytes.is_empty() {
            return self.fail(Error::InvalidArgument);
        }

        let expects_response = bytes
            .get(5)
            .and_then(|&flag| RwFlag::from_repr(flag))
            .is_some_and(RwFlag::expects_response);

        self.transact(bytes, expects_response).await
    }

    /// Waits for an unsolicited frame and returns its interpretation.
    ///
    /// There is no deadline for the first byte. The frame is considered
    /// complete after the inter-byte timeout.
    pub async fn listen(&mut self) -> Result<DecodedValue, P::Error> {
        self.begin_transaction();
        self.asm.begin_unbounded();

        let res = self.receive().await;

        self.end_transaction(res)
    }

    /// Records the error as the most recent failure and returns it.
    pub(crate) fn fail<T>(&mut self, err: Error<P::Error>) -> Result<T, P::Error> {
        debug!("Operation failed: {err}");

        self.last_error = Some(err.to_string());

        Err(err)
    }

    fn begin_transaction(&mut self) {
        // A previous request future was dropped before completion
        if self.busy {
            warn!("Discarding response slot of abandoned transaction");
        }

        self.busy = true;
    }

    fn end_transaction<T>(&mut self, res: Result<T, P::Error>) -> Result<T, P::Error> {
        self.busy = false;

        res.or_else(|err| self.fail(err))
    }

    async fn transact(
        &mut self,
        bytes: &[u8],
        expects_response: bool,
    ) -> Result<Option<DecodedValue>, P::Error> {
        self.begin_transaction();

        let res = self.exchange(bytes, expects_response).await;

        self.end_transaction(res)
    }

    async fn exchange(
        &mut self,
        bytes: &[u8],
        expects_response: bool,
    ) -> Result<Option<DecodedValue>, P::Error> {
        self.write(bytes).await?;

        if !expects_response {
            return Ok(None);
        }

        self.asm.begin(Instant::now());

        Ok(Some(self.receive().await?))
    }

    /// Reassembles a response and decodes it.
    ///
    /// The observer is notified before the value is returned.
    async fn receive(&mut self) -> Result<DecodedValue, P::Error> {
        self.reassemble().await?;

        let resp = self.asm.response();
        let frame = resp
            .frame()
            .ok_or(Error::ShortResponse(resp.bytes().len()))?;
        let val = decode(&frame);

        debug!("Received {val:?}");

        if let Some(observer) = &mut self.observer {
            observer.on_response(&frame, &val).await;
        }

        Ok(val)
    }

    /// Feeds received bytes into the reassembler until the response
    /// is complete or timed out.
    async fn reassemble(&mut self) -> Result<(), P::Error> {
        let mut buf = [0x00; 32];

        loop {
            let read = match self.asm.next_deadline() {
                Some(deadline) => embassy_time::with_deadline(deadline, self.port.read(&mut buf))
                    .await
                    .ok(),
                None => Some(self.port.read(&mut buf).await),
            };

            match read {
                Some(Ok(0)) => {
                    return match self.asm.finish() {
                        State::Complete => Ok(()),
                        _ => Err(Error::TransportUnavailable),
                    };
                }
                Some(Ok(len)) => {
                    trace!("Read from port: {:02x?}", &buf[..len]);
                    self.asm.push(&buf[..len], Instant::now());
                }
                Some(Err(err)) => return Err(Error::Io(err)),
                None => {} // Deadline reached
            }

            match self.asm.poll(Instant::now()) {
                State::Complete => return Ok(()),
                State::TimedOut => return Err(Error::Timeout),
                State::Idle | State::Receiving => {}
            }
        }
    }

    /// Writes the provided buffer to the port.
    async fn write(&mut self, buf: &[u8]) -> Result<(), P::Error> {
        trace!("Write to port: {buf:02x?}");
        self.port.write_all(buf).await?;
        self.port.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::subclass;
    use alloc::{collections::vec_deque::VecDeque, rc::Rc, vec::Vec};
    use core::{cell::RefCell, convert::Infallible};
    use embassy_time::{Duration, Timer};
    use embedded_io_async::ErrorType;
    use log::LevelFilter;

    pub fn init_logger() {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::max())
            .is_test(true)
            .try_init();
    }

    /// In-memory port with separate receive and transmit buffers.
    ///
    /// Every write releases the next scripted reply into the receive buffer.
    /// Reads block forever once the receive buffer is drained,
    /// unless the port was closed, in which case end-of-file is reported.
    #[derive(Default, Debug)]
    pub struct MockPort {
        pub rx: VecDeque<u8>,
        pub tx: Vec<u8>,
        pub replies: VecDeque<Vec<u8>>,
        pub closed: bool,
    }

    impl MockPort {
        pub fn new(rx: &[u8]) -> Self {
            Self {
                rx: rx.iter().copied().collect(),
                ..Self::default()
            }
        }

        pub fn closed(rx: &[u8]) -> Self {
            Self {
                closed: true,
                ..Self::new(rx)
            }
        }

        pub fn scripted(replies: &[&[u8]]) -> Self {
            Self {
                replies: replies.iter().map(|r| r.to_vec()).collect(),
                ..Self::default()
            }
        }
    }

    impl ErrorType for MockPort {
        type Error = Infallible;
    }

    impl Read for MockPort {
        async fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Infallible> {
            if self.rx.is_empty() {
                if self.closed {
                    return Ok(0);
                }

                core::future::pending::<()>().await;
            }

            let len = buf.len().min(self.rx.len());

            for (dst, src) in buf.iter_mut().zip(self.rx.drain(..len)) {
                *dst = src;
            }

            Ok(len)
        }
    }

    impl Write for MockPort {
        async fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Infallible> {
            self.tx.extend_from_slice(buf);

            if let Some(reply) = self.replies.pop_front() {
                self.rx.extend(reply);
            }

            Ok(buf.len())
        }

        async fn flush(&mut self) -> core::result::Result<(), Infallible> {
            Ok(())
        }
    }

    /// Port that receives a noise byte at a fixed interval and never goes silent.
    struct ChatterPort {
        interval: Duration,
    }

    impl ErrorType for ChatterPort {
        type Error = Infallible;
    }

    impl Read for ChatterPort {
        async fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Infallible> {
            Timer::after(self.interval).await;

            match buf.first_mut() {
                Some(byte) => {
                    *byte = 0xaa;

                    Ok(1)
                }
                None => Ok(0),
            }
        }
    }

    impl Write for ChatterPort {
        async fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Infallible> {
            Ok(buf.len())
        }

        async fn flush(&mut self) -> core::result::Result<(), Infallible> {
            Ok(())
        }
    }

    pub fn fast_timeouts() -> Timeouts {
        Timeouts {
            response: Duration::from_millis(40),
            byte: Duration::from_millis(10),
        }
    }

    struct Recorder(Rc<RefCell<Vec<DecodedValue>>>);

    #[async_trait::async_trait(?Send)]
    impl Observer for Recorder {
        async fn on_response(&mut self, _frame: &FrameView<'_>, val: &DecodedValue) {
            self.0.borrow_mut().push(val.clone());
        }
    }

    const PALETTE_RESPONSE: [u8; 9] = [0xf0, 0x05, 0x36, 0x78, 0x20, 0x03, 0x01, 0xd2, 0xff];

    #[tokio::test]
    async fn query_palette() -> Result<(), Infallible> {
        init_logger();

        let mut port = MockPort::new(&PALETTE_RESPONSE);
        let mut intf = Interface::new(&mut port);

        intf.set_timeouts(fast_timeouts());

        let val = intf.query(Class::Image, subclass::image::PALETTE).await?;

        assert_eq!(
            val,
            DecodedValue::Palette(decode::Palette::BlackHot),
            "palette should be correct"
        );
        assert_eq!(
            intf.last_response().bytes(),
            PALETTE_RESPONSE,
            "last response should be kept"
        );
        assert_eq!(
            port.tx,
            [0xf0, 0x05, 0x36, 0x78, 0x20, 0x01, 0x00, 0xcf, 0xff],
            "port contents should be correct"
        );

        Ok(())
    }

    #[tokio::test]
    async fn write_without_response() -> Result<(), Infallible> {
        init_logger();

        // Reads would report end-of-file, so any attempt to receive would fail
        let mut port = MockPort::closed(&[]);
        let mut intf = Interface::new(&mut port);
        let cmd = Command::write(Class::Image, subclass::image::BRIGHTNESS, 100);

        assert_eq!(
            intf.send_command(&cmd).await?,
            None,
            "write should not return a value"
        );
        assert_eq!(
            port.tx,
            [0xf0, 0x05, 0x36, 0x78, 0x02, 0x00, 0x64, 0x14, 0xff],
            "port contents should be correct"
        );

        Ok(())
    }

    #[tokio::test]
    async fn send_raw_model_read() -> Result<(), Infallible> {
        init_logger();

        let mut port = MockPort::closed(&[
            0xf0, 0x05, 0x36, 0x74, 0x02, 0x01, 0x4d, 0x32, 0x35, 0x36, 0x97, 0xff,
        ]);
        let mut intf = Interface::new(&mut port);
        let val = intf
            .send_raw(&[0xf0, 0x05, 0x36, 0x74, 0x02, 0x01, 0x00, 0xad, 0xff])
            .await?;

        assert_eq!(
            val,
            Some(DecodedValue::Model("M256".into())),
            "model should be correct"
        );
        assert_eq!(
            port.tx,
            [0xf0, 0x05, 0x36, 0x74, 0x02, 0x01, 0x00, 0xad, 0xff],
            "port contents should be correct"
        );

        Ok(())
    }

    #[tokio::test]
    async fn error_timeout() {
        init_logger();

        let mut port = MockPort::new(&[]);
        let mut intf = Interface::new(&mut port);

        intf.set_timeouts(fast_timeouts());

        let res = intf.query(Class::Info, subclass::info::MODEL).await;

        assert_eq!(res, Err(Error::Timeout), "result should be timeout error");
        assert_eq!(
            intf.last_error(),
            Some("response timed out"),
            "last error should be recorded"
        );
    }

    #[tokio::test]
    async fn error_timeout_on_chattering_line() {
        init_logger();

        let mut intf = Interface::new(ChatterPort {
            interval: Duration::from_millis(20),
        });

        intf.set_timeouts(Timeouts {
            response: Duration::from_millis(100),
            byte: Duration::from_millis(50),
        });

        let res = tokio::time::timeout(
            core::time::Duration::from_secs(2),
            intf.query(Class::Info, subclass::info::MODEL),
        )
        .await;

        assert_eq!(res, Ok(Err(Error::Timeout)), "result should be timeout error");
        assert!(
            !intf.last_response().bytes().is_empty(),
            "received bytes should be kept"
        );
    }

    #[tokio::test]
    async fn error_transport_unavailable() {
        init_logger();

        let mut port = MockPort::closed(&[]);
        let mut intf = Interface::new(&mut port);
        let res = intf.query(Class::Camera, subclass::camera::STATUS).await;

        assert_eq!(
            res,
            Err(Error::TransportUnavailable),
            "result should be transport unavailable error"
        );
    }

    #[tokio::test]
    async fn error_short_response() {
        init_logger();

        let mut port = MockPort::closed(&[0xf0, 0x05, 0x36, 0x7c, 0x14]);
        let mut intf = Interface::new(&mut port);
        let res = intf.query(Class::Camera, subclass::camera::STATUS).await;

        assert_eq!(
            res,
            Err(Error::ShortResponse(5)),
            "result should be short response error"
        );
        assert_eq!(
            intf.last_error(),
            Some("response too short (5 bytes)"),
            "last error should be recorded"
        );
    }

    #[tokio::test]
    async fn error_empty_raw_frame() {
        init_logger();

        let mut port = MockPort::closed(&[]);
        let mut intf = Interface::new(&mut port);

        assert_eq!(
            intf.send_raw(&[]).await,
            Err(Error::InvalidArgument),
            "result should be invalid argument error"
        );
        assert!(port.tx.is_empty(), "nothing should be written");
    }

    #[tokio::test]
    async fn observer_receives_responses() -> Result<(), Infallible> {
        init_logger();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut port = MockPort::new(&PALETTE_RESPONSE);
        let mut intf = Interface::with_observer(&mut port, Recorder(seen.clone()));

        intf.set_timeouts(fast_timeouts());
        intf.query(Class::Image, subclass::image::PALETTE).await?;

        assert_eq!(
            *seen.borrow(),
            [DecodedValue::Palette(decode::Palette::BlackHot)],
            "observer should be notified"
        );

        Ok(())
    }

    #[tokio::test]
    async fn listen_for_unsolicited_frame() -> Result<(), Infallible> {
        init_logger();

        // Shutter calibration reported by the camera on its own
        let mut port = MockPort::new(&[0xf0, 0x05, 0x36, 0x7c, 0x02, 0x00, 0x00, 0xb4, 0xff]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut intf = Interface::with_observer(&mut port, Recorder(seen.clone()));

        intf.set_timeouts(fast_timeouts());

        let val = intf.listen().await?;

        assert_eq!(
            val,
            DecodedValue::Event(decode::Event::ShutterCalibrated),
            "event should be correct"
        );
        assert_eq!(seen.borrow().len(), 1, "observer should be notified");
        assert!(port.tx.is_empty(), "nothing should be written");

        Ok(())
    }
}
