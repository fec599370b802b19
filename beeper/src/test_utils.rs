//! Shared test utilities for engine tests

use std::collections::{HashMap, VecDeque};

use crate::backend::{
    AudioBackend, BackendError, BufferHandle, ContextHandle, DeviceHandle, ListenerParams,
    PcmFormat, SourceHandle, SourceParams,
};

// ============================================================================
// Recording Backend
// ============================================================================

/// Backend command observed by [`RecordingBackend`]
///
/// Queries (`buffers_processed`, `is_playing`) are not recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    OpenDevice,
    CloseDevice(DeviceHandle),
    CreateContext(DeviceHandle),
    MakeContextCurrent(Option<ContextHandle>),
    DestroyContext(ContextHandle),
    GenerateBuffers(usize),
    DeleteBuffers(Vec<BufferHandle>),
    GenerateSource,
    DeleteSource(SourceHandle),
    ConfigureSource(SourceHandle),
    ConfigureListener,
    SetListenerGain(f32),
    BufferData { buffer: BufferHandle, len: usize },
    QueueBuffers(Vec<BufferHandle>),
    UnqueueBuffers(usize),
    Play,
    Stop,
}

/// Acquisition step a [`RecordingBackend`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    OpenDevice,
    CreateContext,
    ActivateContext,
    GenerateBuffers,
    GenerateSource,
}

/// Fake backend that records every command and simulates a streaming source
///
/// Playback progress is driven by the test through [`finish_buffers`]:
/// finishing every queued buffer leaves the source stopped (underrun).
///
/// [`finish_buffers`]: RecordingBackend::finish_buffers
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub calls: Vec<BackendCall>,
    pub fail_at: Option<FailPoint>,
    /// Hand out fewer buffers than requested
    pub short_buffers: bool,
    /// Make every teardown call fail
    pub fail_teardown: bool,
    /// Last contents uploaded per buffer
    pub contents: HashMap<BufferHandle, Vec<u8>>,
    pub listener_gain: Option<f32>,
    /// Number of upcoming `buffer_data` calls to fail
    pub fail_uploads: usize,
    /// Number of upcoming `queue_buffers` calls to fail
    pub fail_enqueues: usize,
    queued: VecDeque<BufferHandle>,
    processed: usize,
    playing: bool,
    next_handle: u32,
    devices: usize,
    contexts: usize,
    live_buffers: usize,
    sources: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(point: FailPoint) -> Self {
        Self {
            fail_at: Some(point),
            ..Self::default()
        }
    }

    /// Take the recorded calls, leaving the log empty
    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Mark up to `count` more queued buffers as played
    pub fn finish_buffers(&mut self, count: usize) {
        self.processed = (self.processed + count).min(self.queued.len());
        if self.processed == self.queued.len() {
            self.playing = false;
        }
    }

    /// Buffers currently attached to the source
    pub fn queued(&self) -> Vec<BufferHandle> {
        self.queued.iter().copied().collect()
    }

    /// True when no device, context, buffer or source is alive
    pub fn all_released(&self) -> bool {
        self.devices == 0 && self.contexts == 0 && self.live_buffers == 0 && self.sources == 0
    }

    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.fail_at == Some(point)
    }

    fn teardown_result(&self) -> Result<(), BackendError> {
        if self.fail_teardown {
            Err(BackendError::Stream("teardown failure".into()))
        } else {
            Ok(())
        }
    }
}

impl AudioBackend for RecordingBackend {
    fn open_device(&mut self) -> Result<DeviceHandle, BackendError> {
        self.calls.push(BackendCall::OpenDevice);
        if self.fails(FailPoint::OpenDevice) {
            return Err(BackendError::NoDevice);
        }
        self.devices += 1;
        Ok(DeviceHandle(self.handle()))
    }

    fn close_device(&mut self, device: DeviceHandle) -> Result<(), BackendError> {
        self.calls.push(BackendCall::CloseDevice(device));
        self.devices = self.devices.saturating_sub(1);
        self.teardown_result()
    }

    fn create_context(&mut self, device: DeviceHandle) -> Result<ContextHandle, BackendError> {
        self.calls.push(BackendCall::CreateContext(device));
        if self.fails(FailPoint::CreateContext) {
            return Err(BackendError::ContextCreation("scripted failure".into()));
        }
        self.contexts += 1;
        Ok(ContextHandle(self.handle()))
    }

    fn make_context_current(
        &mut self,
        context: Option<ContextHandle>,
    ) -> Result<(), BackendError> {
        self.calls.push(BackendCall::MakeContextCurrent(context));
        if context.is_some() && self.fails(FailPoint::ActivateContext) {
            return Err(BackendError::ContextActivation("scripted failure".into()));
        }
        if context.is_none() {
            return self.teardown_result();
        }
        Ok(())
    }

    fn destroy_context(&mut self, context: ContextHandle) -> Result<(), BackendError> {
        self.calls.push(BackendCall::DestroyContext(context));
        self.contexts = self.contexts.saturating_sub(1);
        self.teardown_result()
    }

    fn generate_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>, BackendError> {
        self.calls.push(BackendCall::GenerateBuffers(count));
        if self.fails(FailPoint::GenerateBuffers) {
            return Err(BackendError::BufferAllocation("scripted failure".into()));
        }
        let count = if self.short_buffers {
            count.saturating_sub(1)
        } else {
            count
        };
        self.live_buffers += count;
        Ok((0..count).map(|_| BufferHandle(self.handle())).collect())
    }

    fn delete_buffers(&mut self, buffers: &[BufferHandle]) -> Result<(), BackendError> {
        self.calls.push(BackendCall::DeleteBuffers(buffers.to_vec()));
        self.live_buffers = self.live_buffers.saturating_sub(buffers.len());
        self.teardown_result()
    }

    fn generate_source(&mut self) -> Result<SourceHandle, BackendError> {
        self.calls.push(BackendCall::GenerateSource);
        if self.fails(FailPoint::GenerateSource) {
            return Err(BackendError::SourceAllocation("scripted failure".into()));
        }
        self.sources += 1;
        Ok(SourceHandle(self.handle()))
    }

    fn delete_source(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        self.calls.push(BackendCall::DeleteSource(source));
        self.sources = self.sources.saturating_sub(1);
        self.queued.clear();
        self.processed = 0;
        self.playing = false;
        self.teardown_result()
    }

    fn configure_source(
        &mut self,
        source: SourceHandle,
        _params: &SourceParams,
    ) -> Result<(), BackendError> {
        self.calls.push(BackendCall::ConfigureSource(source));
        Ok(())
    }

    fn configure_listener(&mut self, _params: &ListenerParams) -> Result<(), BackendError> {
        self.calls.push(BackendCall::ConfigureListener);
        Ok(())
    }

    fn set_listener_gain(&mut self, gain: f32) -> Result<(), BackendError> {
        self.calls.push(BackendCall::SetListenerGain(gain));
        self.listener_gain = Some(gain);
        Ok(())
    }

    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        _format: PcmFormat,
        data: &[u8],
        _sample_rate: u32,
    ) -> Result<(), BackendError> {
        self.calls.push(BackendCall::BufferData {
            buffer,
            len: data.len(),
        });
        if self.fail_uploads > 0 {
            self.fail_uploads -= 1;
            return Err(BackendError::Stream("scripted upload failure".into()));
        }
        self.contents.insert(buffer, data.to_vec());
        Ok(())
    }

    fn queue_buffers(
        &mut self,
        _source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError> {
        self.calls.push(BackendCall::QueueBuffers(buffers.to_vec()));
        if self.fail_enqueues > 0 {
            self.fail_enqueues -= 1;
            return Err(BackendError::Stream("scripted enqueue failure".into()));
        }
        self.queued.extend(buffers.iter().copied());
        Ok(())
    }

    fn unqueue_buffers(
        &mut self,
        _source: SourceHandle,
        count: usize,
    ) -> Result<Vec<BufferHandle>, BackendError> {
        self.calls.push(BackendCall::UnqueueBuffers(count));
        if count > self.processed {
            return Err(BackendError::InvalidHandle);
        }
        self.processed -= count;
        Ok(self.queued.drain(..count).collect())
    }

    fn buffers_processed(&self, _source: SourceHandle) -> usize {
        self.processed
    }

    fn is_playing(&self, _source: SourceHandle) -> bool {
        self.playing
    }

    fn play(&mut self, _source: SourceHandle) -> Result<(), BackendError> {
        self.calls.push(BackendCall::Play);
        self.playing = self.processed < self.queued.len();
        Ok(())
    }

    fn stop(&mut self, _source: SourceHandle) -> Result<(), BackendError> {
        self.calls.push(BackendCall::Stop);
        self.playing = false;
        self.processed = self.queued.len();
        Ok(())
    }
}
