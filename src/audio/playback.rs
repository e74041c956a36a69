//! Gapless playback scheduling for synthesized speech.
//!
//! Inbound audio chunks arrive with network jitter and variable synthesis
//! sizes. Starting each buffer "now" would leave audible gaps or overlaps, so
//! the scheduler anchors every buffer to the logical end of the previous one:
//! `start = max(clock.now(), next_start)`, then `next_start = start +
//! duration`. As long as chunks arrive in order (which the transport
//! guarantees per channel), playback is seamless.

use crate::error::{IntervoxError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A clock tracking the audio output timeline, in seconds.
pub trait OutputClock: Send {
    fn now(&self) -> f64;
}

/// Destination for scheduled sample buffers.
///
/// Buffers are handed over in playback order; ownership transfers to the sink
/// until playback completes or the sink is cleared.
pub trait PlaybackSink: Send {
    fn enqueue(&mut self, samples: Vec<i16>) -> Result<()>;

    /// Discard buffers that have not started playing.
    fn clear(&mut self);
}

/// Schedules decoded audio buffers for gapless sequential output.
///
/// The `next_start` cursor is private state with a single mutator
/// ([`schedule`](Self::schedule)); it is monotonically non-decreasing and
/// always ≥ the end time of the previously scheduled buffer.
pub struct PlaybackScheduler<C: OutputClock, S: PlaybackSink> {
    clock: C,
    sink: S,
    sample_rate: u32,
    next_start: f64,
}

impl<C: OutputClock, S: PlaybackSink> PlaybackScheduler<C, S> {
    pub fn new(clock: C, sink: S, sample_rate: u32) -> Self {
        Self {
            clock,
            sink,
            sample_rate,
            next_start: 0.0,
        }
    }

    /// Enqueue a decoded buffer to start at the logical end of the previous
    /// one (never before the current output-clock time).
    ///
    /// Returns the scheduled start time.
    pub fn schedule(&mut self, samples: Vec<i16>) -> Result<f64> {
        let duration = samples.len() as f64 / self.sample_rate as f64;
        let start = self.clock.now().max(self.next_start);
        self.next_start = start + duration;
        self.sink.enqueue(samples)?;
        Ok(start)
    }

    /// Current cursor value, for diagnostics.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Teardown: cursor back to zero, unstarted buffers discarded.
    pub fn reset(&mut self) {
        self.next_start = 0.0;
        self.sink.clear();
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in Speaker, from one
/// thread at a time.
#[cfg(feature = "cpal-audio")]
struct SendableStream(cpal::Stream);

#[cfg(feature = "cpal-audio")]
unsafe impl Send for SendableStream {}

/// Shared state between the speaker and its output callback.
#[derive(Clone)]
pub struct SpeakerQueue {
    queue: Arc<Mutex<VecDeque<i16>>>,
    played_samples: Arc<AtomicU64>,
    sample_rate: u32,
}

impl SpeakerQueue {
    fn new(sample_rate: u32) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            played_samples: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Fill an output buffer from the queue, padding with silence when empty.
    fn fill(&self, out: &mut [i16]) {
        let mut queue = match self.queue.lock() {
            Ok(q) => q,
            Err(_) => {
                out.fill(0);
                return;
            }
        };
        for slot in out.iter_mut() {
            *slot = queue.pop_front().unwrap_or(0);
        }
        self.played_samples
            .fetch_add(out.len() as u64, Ordering::Relaxed);
    }
}

impl OutputClock for SpeakerQueue {
    fn now(&self) -> f64 {
        self.played_samples.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }
}

impl PlaybackSink for SpeakerQueue {
    fn enqueue(&mut self, samples: Vec<i16>) -> Result<()> {
        let mut queue = self.queue.lock().map_err(|e| IntervoxError::AudioPlayback {
            message: format!("Failed to lock playback queue: {}", e),
        })?;
        queue.extend(samples);
        Ok(())
    }

    fn clear(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

/// Real speaker output backed by CPAL.
///
/// Owns the output stream; decoded buffers flow in through the shared
/// [`SpeakerQueue`], which the hardware callback drains (silence when empty).
#[cfg(feature = "cpal-audio")]
pub struct Speaker {
    stream: Mutex<Option<SendableStream>>,
    queue: SpeakerQueue,
}

#[cfg(feature = "cpal-audio")]
impl Speaker {
    /// Open the output device and start the stream.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the system default.
    /// * `sample_rate` - Playback rate, matching the agent's synthesis rate.
    pub fn open(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = if let Some(name) = device_name {
            let mut found = None;
            let devices = host
                .output_devices()
                .map_err(|e| IntervoxError::AudioPlayback {
                    message: format!("Failed to enumerate output devices: {}", e),
                })?;
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    found = Some(dev);
                    break;
                }
            }
            found.ok_or_else(|| IntervoxError::AudioDeviceNotFound {
                device: name.to_string(),
            })?
        } else {
            host.default_output_device()
                .ok_or_else(|| IntervoxError::AudioDeviceNotFound {
                    device: "default output".to_string(),
                })?
        };

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = SpeakerQueue::new(sample_rate);

        let err_callback = |err| {
            tracing::error!("audio output stream error: {}", err);
        };

        // Prefer f32 output, fall back to i16.
        let cb_queue = queue.clone();
        let stream = match device.build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pcm = vec![0i16; out.len()];
                cb_queue.fill(&mut pcm);
                for (slot, sample) in out.iter_mut().zip(pcm) {
                    *slot = sample as f32 / i16::MAX as f32;
                }
            },
            err_callback,
            None,
        ) {
            Ok(stream) => stream,
            Err(_) => {
                let cb_queue = queue.clone();
                device
                    .build_output_stream(
                        &config,
                        move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            cb_queue.fill(out);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| IntervoxError::AudioPlayback {
                        message: format!("Failed to build output stream: {}", e),
                    })?
            }
        };

        stream.play().map_err(|e| IntervoxError::AudioPlayback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        Ok(Self {
            stream: Mutex::new(Some(SendableStream(stream))),
            queue,
        })
    }

    /// Shared queue handle: the scheduler's clock and sink.
    pub fn queue(&self) -> SpeakerQueue {
        self.queue.clone()
    }

    /// Stop the output stream and drop queued audio.
    pub fn close(&self) {
        if let Ok(mut guard) = self.stream.lock()
            && let Some(stream) = guard.take()
        {
            use cpal::traits::StreamTrait;
            if let Err(e) = stream.0.pause() {
                tracing::warn!("failed to pause output stream: {}", e);
            }
        }
        if let Ok(mut queue) = self.queue.queue.lock() {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Manually advanced clock for deterministic scheduling tests.
    struct ManualClock(Arc<Mutex<f64>>);

    impl OutputClock for ManualClock {
        fn now(&self) -> f64 {
            *self.0.lock().unwrap()
        }
    }

    fn set(t: &Arc<Mutex<f64>>, value: f64) {
        *t.lock().unwrap() = value;
    }

    struct CollectingSink {
        buffers: Vec<Vec<i16>>,
        cleared: bool,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                buffers: Vec::new(),
                cleared: false,
            }
        }
    }

    impl PlaybackSink for CollectingSink {
        fn enqueue(&mut self, samples: Vec<i16>) -> Result<()> {
            self.buffers.push(samples);
            Ok(())
        }

        fn clear(&mut self) {
            self.cleared = true;
            self.buffers.clear();
        }
    }

    fn scheduler_at(t: Arc<Mutex<f64>>) -> PlaybackScheduler<ManualClock, CollectingSink> {
        PlaybackScheduler::new(ManualClock(t), CollectingSink::new(), 1000)
    }

    #[test]
    fn schedule_sums_durations_regardless_of_arrival_jitter() {
        let t = Arc::new(Mutex::new(0.0));
        let mut scheduler = scheduler_at(Arc::clone(&t));

        // Chunks of 500ms, 250ms, 1000ms at rate 1000.
        let durations = [500, 250, 1000];
        let before = scheduler.next_start();
        for (i, d) in durations.iter().enumerate() {
            // Arrival jitter: the wall clock wanders but stays behind the cursor.
            set(&t, i as f64 * 0.1);
            scheduler.schedule(vec![0i16; *d]).unwrap();
        }
        let total: usize = durations.iter().sum();
        assert_eq!(
            scheduler.next_start(),
            before + total as f64 / 1000.0
        );
    }

    #[test]
    fn schedule_anchors_to_previous_end_not_arrival_time() {
        let t = Arc::new(Mutex::new(0.0));
        let mut scheduler = scheduler_at(Arc::clone(&t));

        let first_start = scheduler.schedule(vec![0i16; 1000]).unwrap();
        assert_eq!(first_start, 0.0);

        // Second chunk arrives early (at 0.2s); it must start at 1.0s.
        set(&t, 0.2);
        let second_start = scheduler.schedule(vec![0i16; 500]).unwrap();
        assert_eq!(second_start, 1.0);
        assert_eq!(scheduler.next_start(), 1.5);
    }

    #[test]
    fn schedule_after_drain_anchors_to_clock() {
        let t = Arc::new(Mutex::new(0.0));
        let mut scheduler = scheduler_at(Arc::clone(&t));

        scheduler.schedule(vec![0i16; 1000]).unwrap(); // ends at 1.0

        // Playback drained; next chunk arrives late at 2.5s.
        set(&t, 2.5);
        let start = scheduler.schedule(vec![0i16; 500]).unwrap();
        assert_eq!(start, 2.5);
        assert_eq!(scheduler.next_start(), 3.0);
    }

    #[test]
    fn cursor_is_monotonically_non_decreasing() {
        let t = Arc::new(Mutex::new(0.0));
        let mut scheduler = scheduler_at(Arc::clone(&t));

        let mut last = scheduler.next_start();
        for d in [100, 1, 700, 42] {
            scheduler.schedule(vec![0i16; d]).unwrap();
            assert!(scheduler.next_start() >= last);
            last = scheduler.next_start();
        }
    }

    #[test]
    fn reset_zeroes_cursor_and_clears_sink() {
        let t = Arc::new(Mutex::new(0.0));
        let mut scheduler = scheduler_at(Arc::clone(&t));

        scheduler.schedule(vec![0i16; 500]).unwrap();
        assert!(scheduler.next_start() > 0.0);

        scheduler.reset();
        assert_eq!(scheduler.next_start(), 0.0);
        assert!(scheduler.sink.cleared);
        assert!(scheduler.sink.buffers.is_empty());
    }

    #[test]
    fn speaker_queue_clock_advances_with_played_samples() {
        let queue = SpeakerQueue::new(1000);
        assert_eq!(queue.now(), 0.0);

        let mut sink = queue.clone();
        sink.enqueue(vec![7i16; 250]).unwrap();

        let mut out = vec![0i16; 500];
        queue.fill(&mut out);

        // 500 samples played at 1000Hz → clock at 0.5s
        assert_eq!(queue.now(), 0.5);
        // First 250 from the queue, rest silence
        assert_eq!(out[0], 7);
        assert_eq!(out[249], 7);
        assert_eq!(out[250], 0);
    }

    #[test]
    fn speaker_queue_clear_discards_pending_audio() {
        let queue = SpeakerQueue::new(1000);
        let mut sink = queue.clone();
        sink.enqueue(vec![5i16; 100]).unwrap();
        sink.clear();

        let mut out = vec![1i16; 10];
        queue.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }
}
