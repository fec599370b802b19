//! Playback backend interface
//!
//! The tone engine never talks to an audio driver directly. It drives an
//! [`AudioBackend`]: a device with one rendering context, a small pool of
//! sample buffers and a single streaming source that buffers are queued on.
//! The source reports how many queued buffers it has finished consuming and
//! whether it is still playing; everything else is a command.

/// Opened playback device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Rendering context created on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub u32);

/// Backend-owned sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Streaming playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub u32);

/// Sample format tag for buffer uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    /// Unsigned 8-bit mono, 128 = silence
    Mono8,
}

/// Fixed per-source playback parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    pub pitch: f32,
    pub gain: f32,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub looping: bool,
}

/// Fixed listener placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerParams {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// "at" vector followed by "up" vector
    pub orientation: [f32; 6],
}

/// Source parameters applied once at init
pub const SOURCE_PARAMS: SourceParams = SourceParams {
    pitch: 1.0,
    gain: 1.0,
    position: [0.0, 0.0, 0.0],
    velocity: [0.0, 0.0, 0.0],
    looping: false,
};

/// Listener parameters applied once at init
pub const LISTENER_PARAMS: ListenerParams = ListenerParams {
    position: [0.0, 0.0, 0.0],
    velocity: [0.0, 0.0, 0.0],
    orientation: [0.0, 0.0, -1.0, 0.0, 1.0, 0.0],
};

/// Errors reported by a playback backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("failed to create rendering context: {0}")]
    ContextCreation(String),

    #[error("failed to make rendering context current: {0}")]
    ContextActivation(String),

    #[error("failed to allocate sample buffers: {0}")]
    BufferAllocation(String),

    #[error("failed to allocate playback source: {0}")]
    SourceAllocation(String),

    #[error("invalid or released handle")]
    InvalidHandle,

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Playback service driven by [`ToneEngine`](crate::ToneEngine)
///
/// Calls arrive from a single thread, strictly in sequence. Queries must be
/// cheap and non-blocking since they are issued on every poll.
pub trait AudioBackend {
    /// Open the default playback device
    fn open_device(&mut self) -> Result<DeviceHandle, BackendError>;

    /// Close a device opened by [`open_device`](Self::open_device)
    fn close_device(&mut self, device: DeviceHandle) -> Result<(), BackendError>;

    /// Create a rendering context on `device`
    fn create_context(&mut self, device: DeviceHandle) -> Result<ContextHandle, BackendError>;

    /// Make `context` current, or release the current context with `None`
    fn make_context_current(&mut self, context: Option<ContextHandle>)
    -> Result<(), BackendError>;

    /// Destroy a context; it must no longer be current
    fn destroy_context(&mut self, context: ContextHandle) -> Result<(), BackendError>;

    /// Allocate exactly `count` sample buffers
    fn generate_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>, BackendError>;

    /// Free buffers; none of them may still be queued
    fn delete_buffers(&mut self, buffers: &[BufferHandle]) -> Result<(), BackendError>;

    /// Allocate a playback source
    fn generate_source(&mut self) -> Result<SourceHandle, BackendError>;

    /// Free a source, implicitly stopping it
    fn delete_source(&mut self, source: SourceHandle) -> Result<(), BackendError>;

    /// Apply fixed source parameters
    fn configure_source(
        &mut self,
        source: SourceHandle,
        params: &SourceParams,
    ) -> Result<(), BackendError>;

    /// Apply fixed listener placement
    fn configure_listener(&mut self, params: &ListenerParams) -> Result<(), BackendError>;

    /// Set the listener (master) gain
    fn set_listener_gain(&mut self, gain: f32) -> Result<(), BackendError>;

    /// Replace a buffer's contents
    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError>;

    /// Append buffers to the source's play queue
    fn queue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError>;

    /// Remove `count` processed buffers from the front of the play queue
    fn unqueue_buffers(
        &mut self,
        source: SourceHandle,
        count: usize,
    ) -> Result<Vec<BufferHandle>, BackendError>;

    /// Number of queued buffers the source has finished consuming
    fn buffers_processed(&self, source: SourceHandle) -> usize;

    /// Whether the source is currently playing
    fn is_playing(&self, source: SourceHandle) -> bool;

    /// Start (or restart) playback of the queue
    fn play(&mut self, source: SourceHandle) -> Result<(), BackendError>;

    /// Stop playback; every queued buffer becomes processed
    fn stop(&mut self, source: SourceHandle) -> Result<(), BackendError>;
}

impl<B: AudioBackend + ?Sized> AudioBackend for &mut B {
    fn open_device(&mut self) -> Result<DeviceHandle, BackendError> {
        (**self).open_device()
    }

    fn close_device(&mut self, device: DeviceHandle) -> Result<(), BackendError> {
        (**self).close_device(device)
    }

    fn create_context(&mut self, device: DeviceHandle) -> Result<ContextHandle, BackendError> {
        (**self).create_context(device)
    }

    fn make_context_current(
        &mut self,
        context: Option<ContextHandle>,
    ) -> Result<(), BackendError> {
        (**self).make_context_current(context)
    }

    fn destroy_context(&mut self, context: ContextHandle) -> Result<(), BackendError> {
        (**self).destroy_context(context)
    }

    fn generate_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>, BackendError> {
        (**self).generate_buffers(count)
    }

    fn delete_buffers(&mut self, buffers: &[BufferHandle]) -> Result<(), BackendError> {
        (**self).delete_buffers(buffers)
    }

    fn generate_source(&mut self) -> Result<SourceHandle, BackendError> {
        (**self).generate_source()
    }

    fn delete_source(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        (**self).delete_source(source)
    }

    fn configure_source(
        &mut self,
        source: SourceHandle,
        params: &SourceParams,
    ) -> Result<(), BackendError> {
        (**self).configure_source(source, params)
    }

    fn configure_listener(&mut self, params: &ListenerParams) -> Result<(), BackendError> {
        (**self).configure_listener(params)
    }

    fn set_listener_gain(&mut self, gain: f32) -> Result<(), BackendError> {
        (**self).set_listener_gain(gain)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        (**self).buffer_data(buffer, format, data, sample_rate)
    }

    fn queue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError> {
        (**self).queue_buffers(source, buffers)
    }

    fn unqueue_buffers(
        &mut self,
        source: SourceHandle,
        count: usize,
    ) -> Result<Vec<BufferHandle>, BackendError> {
        (**self).unqueue_buffers(source, count)
    }

    fn buffers_processed(&self, source: SourceHandle) -> usize {
        (**self).buffers_processed(source)
    }

    fn is_playing(&self, source: SourceHandle) -> bool {
        (**self).is_playing(source)
    }

    fn play(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        (**self).play(source)
    }

    fn stop(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        (**self).stop(source)
    }
}
