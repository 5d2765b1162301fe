use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum AudioError {
    /// The output device could not be opened. The clip can be retried after
    /// the next user interaction.
    #[error("audio output device unavailable")]
    DeviceUnavailable,
    #[error("audio playback failed: {0}")]
    Playback(String),
}

/// One playing clip. Dropping it releases the underlying resources.
pub trait AudioVoice {
    fn is_finished(&self) -> bool;
    fn stop(&mut self);
}

/// Where clips actually play. Swapped for a fake in tests.
pub trait AudioOutput {
    fn begin(&mut self, url: &str) -> Result<Box<dyn AudioVoice>, AudioError>;

    /// Called on a user interaction while playback is still locked; gives the
    /// backend a chance to (re)open the device.
    fn resume(&mut self);
}

pub struct RodioOutput {
    http: reqwest::Client,
    stream: Option<OutputStream>,
    volume: f32,
}

impl RodioOutput {
    pub fn new(volume: f32) -> Self {
        Self {
            http: reqwest::Client::new(),
            stream: None,
            volume,
        }
    }

    // The stream stays open for the rest of the process once a first open
    // succeeds; only the per-clip sinks come and go.
    fn ensure_stream(&mut self) -> Result<&OutputStream, AudioError> {
        match self.stream {
            Some(ref stream) => Ok(stream),
            None => {
                let builder = OutputStreamBuilder::from_default_device().map_err(|err| {
                    debug!("no default output device: {err}");
                    AudioError::DeviceUnavailable
                })?;
                let stream = builder.open_stream().map_err(|err| {
                    debug!("could not open output stream: {err}");
                    AudioError::DeviceUnavailable
                })?;
                Ok(self.stream.insert(stream))
            }
        }
    }
}

impl AudioOutput for RodioOutput {
    fn begin(&mut self, url: &str) -> Result<Box<dyn AudioVoice>, AudioError> {
        let http = self.http.clone();
        let source = url.to_string();
        let volume = self.volume;

        let stream = self.ensure_stream()?;
        let sink = Arc::new(Sink::connect_new(stream.mixer()));
        sink.set_volume(volume);

        let flags = Arc::new(ClipFlags::default());

        let task_sink = Arc::clone(&sink);
        let task_flags = Arc::clone(&flags);

        tokio::spawn(async move {
            match fetch_clip(&http, &source).await {
                Ok(bytes) => deliver_clip(&task_sink, bytes, &source, &task_flags),
                Err(err) => {
                    error!("could not fetch audio from {source}: {err}");
                    task_flags.failed.store(true, Ordering::Relaxed);
                }
            }
        });

        Ok(Box::new(RodioVoice { sink, flags }))
    }

    fn resume(&mut self) {
        if self.ensure_stream().is_ok() {
            debug!("audio output device ready");
        }
    }
}

/// Shared between a voice handle and its background fetch task.
#[derive(Default)]
struct ClipFlags {
    loaded: AtomicBool,
    failed: AtomicBool,
    cancelled: AtomicBool,
}

struct RodioVoice {
    sink: Arc<Sink>,
    flags: Arc<ClipFlags>,
}

impl AudioVoice for RodioVoice {
    fn is_finished(&self) -> bool {
        self.flags.failed.load(Ordering::Relaxed)
            || (self.flags.loaded.load(Ordering::Relaxed) && self.sink.empty())
    }

    fn stop(&mut self) {
        self.flags.cancelled.store(true, Ordering::Relaxed);
        self.sink.stop();
    }
}

/// Decodes fetched bytes and queues them, unless the voice was stopped while
/// they were in flight. Appending to a stopped sink restarts it; a stop that
/// raced the append is applied again afterwards.
fn deliver_clip(sink: &Sink, bytes: Vec<u8>, source: &str, flags: &ClipFlags) {
    if flags.cancelled.load(Ordering::Relaxed) {
        return;
    }
    let decoded = match Decoder::new(Cursor::new(bytes)) {
        Ok(decoded) => decoded,
        Err(err) => {
            error!("could not decode audio from {source}: {err}");
            flags.failed.store(true, Ordering::Relaxed);
            return;
        }
    };
    if flags.cancelled.load(Ordering::Relaxed) {
        return;
    }
    sink.append(decoded);
    flags.loaded.store(true, Ordering::Relaxed);
    if flags.cancelled.load(Ordering::Relaxed) {
        sink.stop();
    }
}

async fn fetch_clip(http: &reqwest::Client, source: &str) -> anyhow::Result<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = http.get(source).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("audio fetch failed with status {}", response.status());
        }
        Ok(response.bytes().await?.to_vec())
    } else {
        Ok(tokio::fs::read(source).await?)
    }
}
