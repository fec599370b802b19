//! Audio output using cpal and ring buffer
//!
//! [`CpalBackend`] implements [`AudioBackend`] on top of a single cpal output
//! stream. Queued buffers are appended to a ring buffer of 8-bit samples that
//! the stream callback drains; the callback counts every sample it takes so
//! the main thread can tell which buffers have been processed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use cpal::Sample;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{debug, error, warn};

use crate::backend::{
    AudioBackend, BackendError, BufferHandle, ContextHandle, DeviceHandle, ListenerParams,
    PcmFormat, SourceHandle, SourceParams,
};
use crate::queue::PlaybackQueue;
use crate::synth::{CHUNK_SAMPLES, SAMPLE_RATE, SILENCE};

/// Ring buffer size in source samples (four chunks, ~1 s at 44.1 kHz)
const RING_BUFFER_SIZE: usize = CHUNK_SAMPLES * 4;

/// State shared between the main thread and the stream callback
#[derive(Debug)]
struct SharedState {
    /// Source play flag
    playing: AtomicBool,
    /// Samples taken from the ring buffer, played or discarded
    consumed: AtomicU64,
    /// Samples before this offset are dropped unplayed
    discard_until: AtomicU64,
    /// Listener gain as f32 bits
    gain_bits: AtomicU32,
}

impl SharedState {
    fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            consumed: AtomicU64::new(0),
            discard_until: AtomicU64::new(0),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }
}

/// Callback side of the stream: pulls 8-bit samples and resamples by
/// sample-and-hold to the device rate
struct SourceReader {
    consumer: ringbuf::HeapCons<u8>,
    shared: Arc<SharedState>,
    /// Source samples per device frame
    step: f64,
    phase: f64,
    current: f32,
}

impl SourceReader {
    fn new(consumer: ringbuf::HeapCons<u8>, shared: Arc<SharedState>, device_rate: u32) -> Self {
        Self {
            consumer,
            shared,
            step: f64::from(SAMPLE_RATE) / f64::from(device_rate.max(1)),
            phase: 0.0,
            current: 0.0,
        }
    }

    /// Drop samples queued before the last stop
    fn discard_stale(&mut self) {
        let target = self.shared.discard_until.load(Ordering::Acquire);
        let position = self.shared.consumed.load(Ordering::Relaxed);
        if position < target {
            let skipped = self.consumer.skip((target - position) as usize);
            self.shared
                .consumed
                .fetch_add(skipped as u64, Ordering::Release);
            self.current = 0.0;
            self.phase = 0.0;
        }
    }

    fn next_sample(&mut self, playing: bool, gain: f32) -> f32 {
        if !playing {
            return 0.0;
        }
        self.phase += self.step;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            match self.consumer.try_pop() {
                Some(byte) => {
                    self.current = (f32::from(byte) - f32::from(SILENCE)) / 128.0;
                    self.shared.consumed.fetch_add(1, Ordering::Release);
                }
                None => {
                    // Ran dry; hold silence until more data arrives
                    self.current = 0.0;
                    self.phase = 0.0;
                    break;
                }
            }
        }
        self.current * gain
    }

    fn fill<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        self.discard_stale();
        let playing = self.shared.playing.load(Ordering::Acquire);
        let gain = f32::from_bits(self.shared.gain_bits.load(Ordering::Relaxed));
        for frame in data.chunks_mut(channels.max(1)) {
            let value = T::from_sample(self.next_sample(playing, gain));
            frame.fill(value);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut reader: SourceReader,
) -> Result<cpal::Stream, BackendError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                reader.fill(data, channels);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| BackendError::ContextCreation(format!("failed to build stream: {}", e)))
}

/// Backend-owned sample buffers indexed by handle; freed slots are reused
#[derive(Debug, Default)]
struct BufferStore {
    slots: Vec<Option<Vec<u8>>>,
}

impl BufferStore {
    fn allocate(&mut self, count: usize) -> Vec<BufferHandle> {
        let mut handles = Vec::with_capacity(count);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if handles.len() == count {
                break;
            }
            if slot.is_none() {
                *slot = Some(Vec::with_capacity(CHUNK_SAMPLES));
                handles.push(BufferHandle(index as u32));
            }
        }
        while handles.len() < count {
            handles.push(BufferHandle(self.slots.len() as u32));
            self.slots.push(Some(Vec::with_capacity(CHUNK_SAMPLES)));
        }
        handles
    }

    fn free(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        self.slots
            .get_mut(buffer.0 as usize)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(BackendError::InvalidHandle)
    }

    fn get(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.slots
            .get(buffer.0 as usize)
            .and_then(|slot| slot.as_deref())
    }

    fn get_mut(&mut self, buffer: BufferHandle) -> Option<&mut Vec<u8>> {
        self.slots.get_mut(buffer.0 as usize).and_then(Option::as_mut)
    }
}

/// Playback backend on the host's default output device
///
/// Supports one device, one context (the output stream) and one source.
pub struct CpalBackend {
    host: cpal::Host,
    device: Option<cpal::Device>,
    stream: Option<cpal::Stream>,
    producer: Option<ringbuf::HeapProd<u8>>,
    shared: Arc<SharedState>,
    buffers: BufferStore,
    source: Option<SourceHandle>,
    queue: PlaybackQueue,
    device_sample_rate: u32,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            device: None,
            stream: None,
            producer: None,
            shared: Arc::new(SharedState::new()),
            buffers: BufferStore::default(),
            source: None,
            queue: PlaybackQueue::new(),
            device_sample_rate: SAMPLE_RATE,
        }
    }

    /// Output sample rate of the open device
    pub fn sample_rate(&self) -> u32 {
        self.device_sample_rate
    }

    fn check_source(&self, source: SourceHandle) -> Result<(), BackendError> {
        if self.source == Some(source) {
            Ok(())
        } else {
            Err(BackendError::InvalidHandle)
        }
    }

}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn open_device(&mut self) -> Result<DeviceHandle, BackendError> {
        let device = self
            .host
            .default_output_device()
            .ok_or(BackendError::NoDevice)?;
        if let Ok(name) = device.name() {
            debug!("Opened audio device '{}'", name);
        }
        self.device = Some(device);
        Ok(DeviceHandle(0))
    }

    fn close_device(&mut self, device: DeviceHandle) -> Result<(), BackendError> {
        if device != DeviceHandle(0) || self.device.take().is_none() {
            return Err(BackendError::InvalidHandle);
        }
        Ok(())
    }

    fn create_context(&mut self, device: DeviceHandle) -> Result<ContextHandle, BackendError> {
        if device != DeviceHandle(0) {
            return Err(BackendError::InvalidHandle);
        }
        let device = self.device.as_ref().ok_or(BackendError::InvalidHandle)?;

        let config = device
            .default_output_config()
            .map_err(|e| BackendError::ContextCreation(format!("no output config: {}", e)))?;
        let sample_rate = config.sample_rate().0;

        let ring = HeapRb::<u8>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = ring.split();

        self.shared = Arc::new(SharedState::new());
        let reader = SourceReader::new(consumer, Arc::clone(&self.shared), sample_rate);

        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(device, &stream_config, reader)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(device, &stream_config, reader)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(device, &stream_config, reader)?,
            other => {
                return Err(BackendError::Unsupported(format!(
                    "sample format {:?}",
                    other
                )));
            }
        };

        debug!(
            "Audio stream built ({} Hz, {} channels, {:?})",
            sample_rate, stream_config.channels, sample_format
        );

        self.device_sample_rate = sample_rate;
        self.stream = Some(stream);
        self.producer = Some(producer);
        self.queue = PlaybackQueue::new();
        Ok(ContextHandle(0))
    }

    fn make_context_current(
        &mut self,
        context: Option<ContextHandle>,
    ) -> Result<(), BackendError> {
        let stream = self.stream.as_ref().ok_or(BackendError::InvalidHandle)?;
        match context {
            Some(ContextHandle(0)) => stream
                .play()
                .map_err(|e| BackendError::ContextActivation(e.to_string())),
            Some(_) => Err(BackendError::InvalidHandle),
            None => stream
                .pause()
                .map_err(|e| BackendError::Stream(e.to_string())),
        }
    }

    fn destroy_context(&mut self, context: ContextHandle) -> Result<(), BackendError> {
        if context != ContextHandle(0) || self.stream.is_none() {
            return Err(BackendError::InvalidHandle);
        }
        self.stream = None;
        self.producer = None;
        self.queue = PlaybackQueue::new();
        debug!("Audio stream closed");
        Ok(())
    }

    fn generate_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>, BackendError> {
        if self.stream.is_none() {
            return Err(BackendError::BufferAllocation("no active context".into()));
        }
        Ok(self.buffers.allocate(count))
    }

    fn delete_buffers(&mut self, buffers: &[BufferHandle]) -> Result<(), BackendError> {
        if buffers.iter().any(|&b| self.queue.contains(b)) {
            return Err(BackendError::Stream("buffer is still queued".into()));
        }
        buffers
            .iter()
            .try_for_each(|&buffer| self.buffers.free(buffer))
    }

    fn generate_source(&mut self) -> Result<SourceHandle, BackendError> {
        if self.stream.is_none() {
            return Err(BackendError::SourceAllocation("no active context".into()));
        }
        if self.source.is_some() {
            return Err(BackendError::SourceAllocation(
                "only one source is supported".into(),
            ));
        }
        let source = SourceHandle(0);
        self.source = Some(source);
        Ok(source)
    }

    fn delete_source(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        self.check_source(source)?;
        self.shared.playing.store(false, Ordering::Release);
        let discard = self.queue.clear();
        self.shared.discard_until.store(discard, Ordering::Release);
        self.source = None;
        Ok(())
    }

    fn configure_source(
        &mut self,
        source: SourceHandle,
        params: &SourceParams,
    ) -> Result<(), BackendError> {
        self.check_source(source)?;
        if params.looping {
            return Err(BackendError::Unsupported("looping sources".into()));
        }
        // Mono device output: pitch, placement and velocity have no effect
        Ok(())
    }

    fn configure_listener(&mut self, _params: &ListenerParams) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_listener_gain(&mut self, gain: f32) -> Result<(), BackendError> {
        self.shared.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        if sample_rate != SAMPLE_RATE {
            return Err(BackendError::Unsupported(format!(
                "buffer sample rate {} Hz",
                sample_rate
            )));
        }
        if self.queue.contains(buffer) {
            return Err(BackendError::Stream("buffer is still queued".into()));
        }
        let PcmFormat::Mono8 = format;
        let slot = self
            .buffers
            .get_mut(buffer)
            .ok_or(BackendError::InvalidHandle)?;
        slot.clear();
        slot.extend_from_slice(data);
        Ok(())
    }

    fn queue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError> {
        self.check_source(source)?;
        for &buffer in buffers {
            let data = self.buffers.get(buffer).ok_or(BackendError::InvalidHandle)?;
            let producer = self.producer.as_mut().ok_or(BackendError::InvalidHandle)?;
            let pushed = producer.push_slice(data);
            if pushed < data.len() {
                // Ring buffer full: the tail of this buffer is lost
                warn!(
                    "Audio buffer overflow: dropped {} samples",
                    data.len() - pushed
                );
            }
            self.queue.enqueue(buffer, pushed);
        }
        Ok(())
    }

    fn unqueue_buffers(
        &mut self,
        source: SourceHandle,
        count: usize,
    ) -> Result<Vec<BufferHandle>, BackendError> {
        self.check_source(source)?;
        self.queue.unqueue(count, self.shared.consumed())
    }

    fn buffers_processed(&self, source: SourceHandle) -> usize {
        if self.source != Some(source) {
            return 0;
        }
        self.queue.processed(self.shared.consumed())
    }

    fn is_playing(&self, source: SourceHandle) -> bool {
        self.source == Some(source) && self.queue.is_playing(self.shared.consumed())
    }

    fn play(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        self.check_source(source)?;
        self.queue.play();
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        self.check_source(source)?;
        let discard = self.queue.stop();
        self.shared.discard_until.store(discard, Ordering::Release);
        self.shared.playing.store(false, Ordering::Release);
        Ok(())
    }
}
