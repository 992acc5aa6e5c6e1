//! Timing-based reassembly of camera responses.
//!
//! Responses carry no reliable length field, so a response is considered
//! complete once the link has been silent for the inter-byte timeout.
//! A response that is still incomplete at the response deadline times out,
//! so a chattering line cannot stall a request.
//! [`Reassembler`] is a pure state machine: the caller feeds it received bytes
//! together with their arrival time and polls it with the current time.

use crate::frame::{FrameView, MIN_FRAME_LEN};
use embassy_time::{Duration, Instant};
use log::{debug, warn};

/// Maximum number of bytes buffered for a single response.
pub const MAX_RESPONSE_LEN: usize = 256;

/// Timeouts applied while waiting for a response.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Timeouts {
    /// Maximum time to wait for a complete response.
    pub response: Duration,
    /// Silence after the last received byte that completes a response.
    pub byte: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response: Duration::from_millis(150),
            byte: Duration::from_millis(75),
        }
    }
}

/// Reassembly state.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum State {
    /// Waiting for the first byte.
    Idle,
    /// At least one byte was received, waiting for more or for silence.
    Receiving,
    /// The response is complete.
    Complete,
    /// The response deadline passed before the response was complete.
    TimedOut,
}

/// Single-slot response reassembler.
#[derive(Debug)]
pub struct Reassembler {
    buf: [u8; MAX_RESPONSE_LEN],
    len: usize,
    state: State,
    timeouts: Timeouts,
    deadline: Option<Instant>,
    first_byte: Option<Instant>,
    last_byte: Option<Instant>,
}

impl Reassembler {
    /// Constructs a new reassembler in the [`State::Idle`] state.
    #[must_use]
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            buf: [0x00; MAX_RESPONSE_LEN],
            len: 0,
            state: State::Idle,
            timeouts,
            deadline: None,
            first_byte: None,
            last_byte: None,
        }
    }

    /// Returns the configured timeouts.
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Changes the timeouts used by subsequent reassemblies.
    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Starts a new reassembly, discarding any previous response.
    ///
    /// The response deadline is measured from `now`.
    pub fn begin(&mut self, now: Instant) {
        self.reset(Some(now + self.timeouts.response));
    }

    /// Starts a new reassembly that waits indefinitely for the first byte.
    pub fn begin_unbounded(&mut self) {
        self.reset(None);
    }

    fn reset(&mut self, deadline: Option<Instant>) {
        self.len = 0;
        self.state = State::Idle;
        self.deadline = deadline;
        self.first_byte = None;
        self.last_byte = None;
    }

    /// Appends received bytes to the response.
    ///
    /// Bytes exceeding [`MAX_RESPONSE_LEN`] are dropped.
    /// Bytes received after the response was finalized are ignored.
    pub fn push(&mut self, data: &[u8], now: Instant) {
        match self.state {
            State::Idle => {
                self.state = State::Receiving;
                self.first_byte = Some(now);
            }
            State::Receiving => {}
            State::Complete | State::TimedOut => {
                warn!("Ignoring {} bytes received after response", data.len());

                return;
            }
        }

        let free = MAX_RESPONSE_LEN - self.len;
        let count = data.len().min(free);

        self.buf[self.len..self.len + count].copy_from_slice(&data[..count]);
        self.len += count;
        self.last_byte = Some(now);

        if count < data.len() {
            warn!("Response buffer full, dropped {} bytes", data.len() - count);
        }
    }

    /// Advances the state machine to the given point in time.
    ///
    /// Returns the resulting state.
    pub fn poll(&mut self, now: Instant) -> State {
        let expired = self.deadline.is_some_and(|d| now >= d);

        match self.state {
            State::Idle if expired => {
                debug!("No response received");

                self.state = State::TimedOut;
            }
            State::Receiving => {
                let silent = self
                    .last_byte
                    .is_some_and(|t| now >= t + self.timeouts.byte);

                if silent {
                    self.complete();
                } else if expired {
                    debug!("Response still incomplete after {} bytes", self.len);

                    self.state = State::TimedOut;
                }
            }
            _ => {}
        }

        self.state
    }

    /// Finalizes the response because no further bytes can arrive.
    ///
    /// Returns the resulting state, which stays [`State::Idle`]
    /// if no byte has been received.
    pub fn finish(&mut self) -> State {
        if self.state == State::Receiving {
            self.complete();
        }

        self.state
    }

    fn complete(&mut self) {
        self.state = State::Complete;

        debug!(
            "Response complete with {} bytes (valid: {})",
            self.len,
            self.len >= MIN_FRAME_LEN
        );
    }

    /// Returns the next point in time at which [`Reassembler::poll`]
    /// may change the state.
    ///
    /// Returns `None` if the state cannot change without receiving bytes.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            State::Idle => self.deadline,
            State::Receiving => {
                let silence = self.last_byte.map(|t| t + self.timeouts.byte);

                match (silence, self.deadline) {
                    (Some(s), Some(d)) => Some(s.min(d)),
                    (s, d) => s.or(d),
                }
            }
            State::Complete | State::TimedOut => None,
        }
    }

    /// Returns the current response.
    #[must_use]
    pub fn response(&self) -> Response<'_> {
        Response {
            bytes: &self.buf[..self.len],
            complete: self.state == State::Complete,
            timestamp: self.first_byte,
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(Timeouts::default())
    }
}

/// A borrowed view of a reassembled response.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Response<'a> {
    bytes: &'a [u8],
    complete: bool,
    timestamp: Option<Instant>,
}

impl<'a> Response<'a> {
    /// Returns the received bytes.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Returns whether the response was finalized.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns whether the response is long enough to be interpreted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bytes.len() >= MIN_FRAME_LEN
    }

    /// Returns the arrival time of the first byte.
    #[must_use]
    pub fn timestamp(&self) -> Option<Instant> {
        self.timestamp
    }

    /// Returns a frame view of the response if it is complete and valid.
    #[must_use]
    pub fn frame(&self) -> Option<FrameView<'a>> {
        if self.complete {
            FrameView::parse(self.bytes)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;

    const RESPONSE: [u8; 9] = [0xf0, 0x05, 0x36, 0x78, 0x20, 0x03, 0x01, 0xd2, 0xff];

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn complete_after_silence() {
        init_logger();

        let mut asm = Reassembler::new(Timeouts {
            response: Duration::from_millis(1000),
            byte: Duration::from_millis(75),
        });

        asm.begin(at(0));

        assert_eq!(asm.poll(at(10)), State::Idle, "state should be idle");

        // Bytes trickle in with gaps below the inter-byte timeout
        for (i, &byte) in RESPONSE.iter().enumerate() {
            let t = 20 + 60 * i as u64;

            asm.push(&[byte], at(t));

            assert_eq!(
                asm.poll(at(t + 74)),
                State::Receiving,
                "state should be receiving after byte {i}"
            );
        }

        let last = 20 + 60 * 8;

        assert_eq!(
            asm.poll(at(last + 75)),
            State::Complete,
            "state should be complete after silence"
        );

        let resp = asm.response();

        assert_eq!(resp.bytes(), RESPONSE, "bytes should be correct");
        assert!(resp.is_complete(), "response should be complete");
        assert!(resp.is_valid(), "response should be valid");
        assert_eq!(resp.timestamp(), Some(at(20)), "timestamp should be correct");
    }

    #[test]
    fn timed_out_without_bytes() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(1000));

        assert_eq!(asm.next_deadline(), Some(at(1150)), "deadline should be correct");
        assert_eq!(asm.poll(at(1149)), State::Idle, "state should be idle");
        assert_eq!(asm.poll(at(1150)), State::TimedOut, "state should be timed out");
        assert_eq!(asm.response().frame(), None, "response should have no frame");
    }

    #[test]
    fn time_out_while_receiving() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(0));

        // Continuous traffic never leaves a silent gap
        for t in (100..150).step_by(10) {
            asm.push(&[0x00], at(t));

            assert_eq!(asm.poll(at(t)), State::Receiving, "state should be receiving");
        }

        assert_eq!(
            asm.next_deadline(),
            Some(at(150)),
            "deadline should be bounded by response deadline"
        );

        asm.push(&[0x00], at(150));

        assert_eq!(asm.poll(at(150)), State::TimedOut, "state should be timed out");
        assert_eq!(asm.next_deadline(), None, "deadline should be unset");
        assert_eq!(asm.response().frame(), None, "response should have no frame");
        assert_eq!(asm.response().bytes().len(), 6, "bytes should be kept");
    }

    #[test]
    fn time_out_when_full() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(0));

        for t in 1..150 {
            asm.push(&[0xaa; 4], at(t));
        }

        assert_eq!(asm.poll(at(149)), State::Receiving, "state should be receiving");
        assert_eq!(asm.poll(at(150)), State::TimedOut, "state should be timed out");
        assert_eq!(
            asm.response().bytes().len(),
            MAX_RESPONSE_LEN,
            "length should be capped"
        );
    }

    #[test]
    fn silence_before_response_deadline() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(0));
        asm.push(&RESPONSE, at(50));

        assert_eq!(asm.next_deadline(), Some(at(125)), "deadline should follow last byte");
        assert_eq!(asm.poll(at(125)), State::Complete, "state should be complete");
    }

    #[test]
    fn short_response_is_invalid() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(0));
        asm.push(&RESPONSE[..6], at(5));

        assert_eq!(asm.poll(at(80)), State::Complete, "state should be complete");

        let resp = asm.response();

        assert!(resp.is_complete(), "response should be complete");
        assert!(!resp.is_valid(), "response should be invalid");
        assert_eq!(resp.frame(), None, "response should have no frame");
    }

    #[test]
    fn drop_bytes_when_full() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(0));
        asm.push(&[0xaa; 200], at(1));
        asm.push(&[0xbb; 100], at(2));

        assert_eq!(
            asm.response().bytes().len(),
            MAX_RESPONSE_LEN,
            "length should be capped"
        );
        assert_eq!(
            asm.response().bytes()[MAX_RESPONSE_LEN - 1],
            0xbb,
            "last byte should be from second push"
        );
    }

    #[test]
    fn finish_on_end_of_stream() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(0));

        assert_eq!(asm.finish(), State::Idle, "state should stay idle");

        asm.push(&RESPONSE, at(1));

        assert_eq!(asm.finish(), State::Complete, "state should be complete");
        assert!(asm.response().frame().is_some(), "response should have a frame");
    }

    #[test]
    fn begin_resets_previous_response() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin(at(0));
        asm.push(&RESPONSE, at(1));
        asm.poll(at(100));
        asm.begin(at(200));

        assert_eq!(asm.state(), State::Idle, "state should be idle");
        assert!(asm.response().bytes().is_empty(), "buffer should be empty");
        assert_eq!(asm.response().timestamp(), None, "timestamp should be cleared");
    }

    #[test]
    fn unbounded_never_times_out() {
        init_logger();

        let mut asm = Reassembler::default();

        asm.begin_unbounded();

        assert_eq!(asm.next_deadline(), None, "deadline should be unset");
        assert_eq!(asm.poll(at(1_000_000)), State::Idle, "state should be idle");

        asm.push(&RESPONSE, at(1_000_001));

        assert_eq!(
            asm.next_deadline(),
            Some(at(1_000_076)),
            "deadline should follow last byte"
        );
        assert_eq!(asm.poll(at(1_000_076)), State::Complete, "state should be complete");
    }
}
