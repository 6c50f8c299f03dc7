//! Event-driven draining of a device ring buffer.

use std::io::{self, Read};

use bytemuck::{Pod, Zeroable};

use crate::{abi, attr, Error, Result};
use crate::cancel::CancellationToken;
use crate::config::AcquisitionConfig;
use crate::device::{Device, RingBuffer};
use crate::scan::{SampleLayout, SampleSet};
use crate::sys::{AttributeTree, StreamMode};

/// A record of the ring buffer event stream.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct EventData {
    pub id: i32,
    _padding: u32,
    pub timestamp: i64,
}

impl EventData {
    pub const SIZE: usize = std::mem::size_of::<EventData>();

    pub fn new(id: i32, timestamp: i64) -> EventData {
        EventData { id, _padding: 0, timestamp }
    }

    pub fn to_bytes(&self) -> [u8; EventData::SIZE] {
        bytemuck::cast(*self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillLevel {
    Half,
    ThreeQuarters,
    Full,
}

impl FillLevel {
    pub fn from_event_code(code: i32) -> Option<FillLevel> {
        match code {
            abi::EVENT_CODE_RING_50_FULL  => Some(FillLevel::Half),
            abi::EVENT_CODE_RING_75_FULL  => Some(FillLevel::ThreeQuarters),
            abi::EVENT_CODE_RING_100_FULL => Some(FillLevel::Full),
            _ => None,
        }
    }

    /// Number of sample sets available in a ring of `ring_length` sets at this level.
    pub fn sample_sets(self, ring_length: usize) -> usize {
        match self {
            Self::Half          => ring_length / 2,
            Self::ThreeQuarters => ring_length / 4 * 3 + ring_length % 4 * 3 / 4,
            Self::Full          => ring_length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unarmed,
    Armed,
    Streaming,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub events: usize,
    pub unrecognized_events: usize,
    /// Drains that found no data.
    pub empty_reads: usize,
    pub sample_sets: usize,
}

/// One acquisition from the ring buffer of a device.
///
/// The session owns the event and data streams and the sample block. Dropping it in any
/// state disables the ring buffer (if enabling was attempted) and releases all of them.
pub struct Session<'d, T: AttributeTree> {
    device: &'d Device<T>,
    ring_buffer: &'d RingBuffer,
    layout: SampleLayout,
    ring_length: usize,
    /// `ring_length` as written to the length attribute.
    length_attr: i64,
    /// Bytes in a full ring.
    block_size: usize,
    state: SessionState,
    enable_attempted: bool,
    event: Option<T::Stream>,
    data: Option<T::Stream>,
    block: Vec<u8>,
    stats: SessionStats,
}

impl<'d, T: AttributeTree> Session<'d, T> {
    /// Prepares a session using the scan elements of the device ring buffer as the layout
    /// of every sample set.
    pub fn new(device: &'d Device<T>, config: &AcquisitionConfig) -> Result<Session<'d, T>> {
        if config.ring_length == 0 {
            return Err(Error::Other("ring length must be at least one sample set".to_owned()))
        }
        let ring_buffer = device.ring_buffer()?
            .ok_or_else(|| Error::NotFound { path: abi::attr_path(device.path(), abi::BUFFER_MARKER) })?;
        let elements = ring_buffer.scan_elements(device.tree())?;
        let layout = SampleLayout::new(device, &elements)?;
        let too_long = || Error::Other(format!(
            "ring length of {} sample sets of {} bytes is too large", config.ring_length, layout.set_size()));
        let length_attr = i64::try_from(config.ring_length).map_err(|_| too_long())?;
        let block_size = config.ring_length.checked_mul(layout.set_size()).ok_or_else(too_long)?;
        Ok(Session {
            device,
            ring_buffer,
            layout,
            ring_length: config.ring_length,
            length_attr,
            block_size,
            state: SessionState::Unarmed,
            enable_attempted: false,
            event: None,
            data: None,
            block: Vec::new(),
            stats: Default::default(),
        })
    }

    /// Arms the ring buffer, streams samples to `sink` until `token` is cancelled, and
    /// tears everything down.
    pub fn acquire<F>(device: &'d Device<T>, config: &AcquisitionConfig, token: &CancellationToken,
                      sink: F) -> Result<SessionStats>
            where F: FnMut(SampleSet) -> Result<()> {
        let mut session = Session::new(device, config)?;
        session.arm()?;
        session.open_streams()?;
        session.run(token, sink)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    pub fn ring_buffer(&self) -> &RingBuffer {
        self.ring_buffer
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Bytes to drain when the ring buffer reports `level`.
    pub fn read_size(&self, level: FillLevel) -> usize {
        level.sample_sets(self.ring_length) * self.layout.set_size()
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(Error::Other(format!("session is {:?}, expected {:?}", self.state, expected)))
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Error {
        log::debug!("session failed: {}", error);
        self.state = SessionState::Failed;
        self.teardown();
        error
    }

    /// Sets the ring length and enables the ring buffer.
    pub fn arm(&mut self) -> Result<()> {
        self.expect_state(SessionState::Unarmed)?;
        let tree = self.device.tree();
        let path = self.ring_buffer.path();
        let mut block: Vec<u8> = Vec::new();
        if let Err(error) = block.try_reserve_exact(self.block_size) {
            return Err(self.fail(Error::Other(format!("cannot allocate {} byte sample block: {}", self.block_size, error))))
        }
        block.resize(self.block_size, 0);
        if let Err(error) = attr::write_int(tree, path, abi::RING_LENGTH, self.length_attr) {
            return Err(self.fail(error))
        }
        self.enable_attempted = true;
        if let Err(error) = attr::write_verify_int(tree, path, abi::RING_ENABLE, 1) {
            return Err(self.fail(error))
        }
        self.block = block;
        self.state = SessionState::Armed;
        log::debug!("arm({:?}) with {} sample sets of {} bytes",
            path, self.ring_length, self.layout.set_size());
        Ok(())
    }

    /// Opens the data stream without blocking and the event stream blocking.
    pub fn open_streams(&mut self) -> Result<()> {
        self.expect_state(SessionState::Armed)?;
        let tree = self.device.tree();
        let access_path = self.ring_buffer.access_path();
        match tree.open_stream(access_path, StreamMode::NonBlocking) {
            Ok(stream) => self.data = Some(stream),
            Err(error) => return Err(self.fail(Error::from_io(access_path, error))),
        }
        let event_path = self.ring_buffer.event_path();
        match tree.open_stream(event_path, StreamMode::Blocking) {
            Ok(stream) => self.event = Some(stream),
            Err(error) => return Err(self.fail(Error::from_io(event_path, error))),
        }
        self.state = SessionState::Streaming;
        log::debug!("open_streams({:?}, {:?})", access_path, event_path);
        Ok(())
    }

    // `None` if a signal interrupted the wait and the token was cancelled meanwhile
    fn read_event(&mut self, token: &CancellationToken) -> Result<Option<EventData>> {
        let path = self.ring_buffer.event_path();
        let Some(stream) = self.event.as_mut() else {
            return Err(Error::Other("event stream is not open".to_owned()))
        };
        let mut record = [0u8; EventData::SIZE];
        let mut filled = 0;
        while filled < record.len() {
            match stream.read(&mut record[filled..]) {
                Ok(0) =>
                    return Err(Error::from_io(path, io::ErrorKind::UnexpectedEof.into())),
                Ok(count) =>
                    filled += count,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    if filled == 0 && token.is_cancelled() {
                        return Ok(None)
                    }
                }
                Err(error) =>
                    return Err(Error::from_io(path, error)),
            }
        }
        let event: EventData = bytemuck::pod_read_unaligned(&record);
        log::trace!("read_event() = {:?}", event);
        Ok(Some(event))
    }

    /// Drains the ring buffer on every fill-threshold event, passing each decoded sample set
    /// to `sink`, until `token` is cancelled.
    ///
    /// The token is checked once per event; cancelling it while waiting for an event takes
    /// effect after that event has been handled.
    pub fn run<F>(&mut self, token: &CancellationToken, mut sink: F) -> Result<SessionStats>
            where F: FnMut(SampleSet) -> Result<()> {
        self.expect_state(SessionState::Streaming)?;
        while !token.is_cancelled() {
            let event = match self.read_event(token) {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(error) => return Err(self.fail(error)),
            };
            self.stats.events += 1;
            let Some(level) = FillLevel::from_event_code(event.id) else {
                log::warn!("{}", Error::UnrecognizedEvent(event.id));
                self.stats.unrecognized_events += 1;
                continue
            };

            let size = self.read_size(level);
            let Some(stream) = self.data.as_mut() else {
                return Err(self.fail(Error::Other("data stream is not open".to_owned())))
            };
            let count = match stream.read(&mut self.block[..size]) {
                Ok(count) => count,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => 0,
                Err(error) => {
                    let error = Error::from_io(self.ring_buffer.access_path(), error);
                    return Err(self.fail(error))
                }
            };
            log::trace!("drain({:?}) = {} of {} bytes", level, count, size);
            if count == 0 {
                log::warn!("nothing available on {:?}", self.ring_buffer.access_path());
                self.stats.empty_reads += 1;
                continue
            }
            if count % self.layout.set_size() != 0 {
                log::warn!("discarding {} bytes of a partial sample set", count % self.layout.set_size());
            }

            let sets = self.layout.decode_all(&self.block[..count]).collect::<Vec<_>>();
            for set in sets {
                self.stats.sample_sets += 1;
                if let Err(error) = sink(set) {
                    return Err(self.fail(error))
                }
            }
        }
        log::debug!("run() stopped after {:?}", self.stats);
        self.state = SessionState::Stopped;
        self.teardown();
        Ok(self.stats)
    }

    fn teardown(&mut self) {
        if self.enable_attempted {
            self.enable_attempted = false;
            // the streams are released regardless of whether this succeeds
            if let Err(error) = attr::write_int(self.device.tree(), self.ring_buffer.path(), abi::RING_ENABLE, 0) {
                log::warn!("failed to disable ring buffer: {}", error);
            }
        }
        self.data = None;
        self.event = None;
        self.block = Vec::new();
    }
}

impl<'d, T: AttributeTree> Drop for Session<'d, T> {
    fn drop(&mut self) {
        self.teardown()
    }
}
