//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! Delivers fixed-size [`AudioFrame`]s through a channel registered at
//! `start`. Frame cadence is driven by the hardware callback; a slicer
//! accumulates callback buffers and emits exactly [`defaults::FRAME_SAMPLES`]
//! samples per frame so every frame is independently encodable.

use crate::audio::{AudioFrame, FrameSource};
use crate::defaults;
use crate::error::{IntervoxError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Check if a device name should be filtered out.
fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// Check if a device is a preferred device.
fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// Preferred devices are marked with "\[recommended\]"; obviously unusable
/// devices (surround channels, HDMI, etc.) are filtered out.
///
/// # Errors
/// Returns `IntervoxError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| IntervoxError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }

            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// This respects GNOME's audio device selection instead of raw ALSA defaults.
///
/// # Errors
/// Returns `IntervoxError::AudioDeviceNotFound` if no input device is available.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| IntervoxError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: We ensure that the stream is only accessed from a single thread at
/// a time through the Mutex wrapper in Microphone. The stream methods are
/// called synchronously and don't cross thread boundaries unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Accumulates hardware callback buffers and emits fixed-size frames.
///
/// Stateless per-frame from the consumer's point of view: each emitted frame
/// stands alone. Runs entirely inside the audio callback thread.
struct FrameSlicer {
    pending: Vec<i16>,
    frame_samples: usize,
    sequence: u64,
    sink: mpsc::UnboundedSender<AudioFrame>,
}

impl FrameSlicer {
    fn new(frame_samples: usize, sink: mpsc::UnboundedSender<AudioFrame>) -> Self {
        Self {
            pending: Vec::with_capacity(frame_samples),
            frame_samples,
            sequence: 0,
            sink,
        }
    }

    fn push(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            let frame = AudioFrame::new(
                self.sequence,
                std::mem::replace(&mut self.pending, rest),
            );
            self.sequence += 1;
            // Receiver gone means the session is tearing down; stop quietly.
            if self.sink.send(frame).is_err() {
                self.pending.clear();
                return;
            }
        }
    }
}

/// Real microphone source backed by CPAL.
///
/// Captures 16-bit PCM at 16kHz mono. Tries the preferred format first
/// (f32 or i16 at 16kHz/mono, which PipeWire/PulseAudio convert
/// transparently), then falls back to the device's native config with
/// software conversion (channel mixing + resampling).
pub struct Microphone {
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
    frame_samples: usize,
}

impl Microphone {
    /// Create a new microphone source.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the best default.
    ///
    /// # Errors
    /// Fails fast with `AudioDeviceNotFound` / `AudioCapture` so session
    /// startup aborts before any transport connection is attempted.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .input_devices()
                    .map_err(|e| IntervoxError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                let mut found_device = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found_device = Some(dev);
                        break;
                    }
                }

                found_device.ok_or_else(|| IntervoxError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            } else {
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            stream: Arc::new(Mutex::new(None)),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: defaults::INPUT_SAMPLE_RATE,
            frame_samples: defaults::FRAME_SAMPLES,
        })
    }

    /// Build the capture stream with the preferred 16kHz mono config.
    ///
    /// Tries f32 first (most devices expose float natively), then i16.
    fn build_stream(&self, sink: mpsc::UnboundedSender<AudioFrame>) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::error!("audio stream error: {}", err);
        };

        let mut slicer = FrameSlicer::new(self.frame_samples, sink.clone());
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                slicer.push(&crate::audio::encode::pcm_from_f32(data));
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let mut slicer = FrameSlicer::new(self.frame_samples, sink.clone());
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                slicer.push(data);
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Some PipeWire-ALSA setups accept non-native configs but never
        // deliver data; capture at the native config and convert in software.
        self.build_stream_native(sink)
    }

    /// Build a stream using the device's native config, with software
    /// channel mixing (stereo→mono) and resampling (native rate→16kHz).
    fn build_stream_native(
        &self,
        sink: mpsc::UnboundedSender<AudioFrame>,
    ) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| IntervoxError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;

        let stream_config: cpal::StreamConfig = default_config.clone().into();

        tracing::info!(
            "using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            tracing::error!("audio stream error: {}", err);
        };

        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::I16 => {
                let mut slicer = FrameSlicer::new(self.frame_samples, sink);
                self.device
                    .build_input_stream(
                        &stream_config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            counter.fetch_add(1, Ordering::Relaxed);
                            let converted =
                                mix_and_resample(data, native_channels, native_rate, target_rate);
                            slicer.push(&converted);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| IntervoxError::AudioCapture {
                        message: format!("Failed to build native i16 stream: {}", e),
                    })
            }
            SampleFormat::F32 => {
                let mut slicer = FrameSlicer::new(self.frame_samples, sink);
                self.device
                    .build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            counter.fetch_add(1, Ordering::Relaxed);
                            let i16_data = crate::audio::encode::pcm_from_f32(data);
                            let converted = mix_and_resample(
                                &i16_data,
                                native_channels,
                                native_rate,
                                target_rate,
                            );
                            slicer.push(&converted);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| IntervoxError::AudioCapture {
                        message: format!("Failed to build native f32 stream: {}", e),
                    })
            }
            fmt => Err(IntervoxError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a device with --device.",
                    fmt
                ),
            }),
        }
    }
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn mix_and_resample(
    samples: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<i16> {
    let mono: Vec<i16> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    resample(&mono, source_rate, target_rate)
}

/// Linear-interpolation resampler for mono 16-bit PCM.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

impl FrameSource for Microphone {
    fn start(&mut self, sink: mpsc::UnboundedSender<AudioFrame>) -> Result<()> {
        {
            let stream_guard = self.stream.lock().map_err(|e| IntervoxError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if stream_guard.is_some() {
                return Ok(()); // Already started
            }
        }

        let stream = self.build_stream(sink.clone())?;
        stream.play().map_err(|e| IntervoxError::MicrophoneUnavailable {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Wait briefly to check if the CPAL callback actually fires.
        // Some PipeWire-ALSA setups accept non-native configs but never deliver data.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);

            let native_stream = self.build_stream_native(sink)?;
            native_stream
                .play()
                .map_err(|e| IntervoxError::MicrophoneUnavailable {
                    message: format!("Failed to start native audio stream: {}", e),
                })?;
            native_stream
        } else {
            stream
        };

        let mut stream_guard = self.stream.lock().map_err(|e| IntervoxError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;
        *stream_guard = Some(SendableStream(final_stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| IntervoxError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| IntervoxError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        Ok(())
    }
}
