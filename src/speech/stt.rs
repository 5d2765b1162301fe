use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};
use hound::{SampleFormat as WavSampleFormat, WavSpec, WavWriter};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;

/// Turns microphone audio into text. Swapped for a fake in tests.
pub trait VoiceRecognizer {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
    fn poll_transcript(&mut self) -> Option<String>;
}

/// Dictation for the chat input. Unsupported setups (no microphone, no
/// transcription key) get a capture that ignores every toggle, and the UI
/// hides the mic affordance.
pub struct SpeechCapture {
    recognizer: Option<Box<dyn VoiceRecognizer>>,
    listening: bool,
    transcript: String,
    fresh: bool,
}

impl SpeechCapture {
    pub fn detect(config: &Config) -> Self {
        match WhisperRecognizer::from_config(config) {
            Ok(Some(recognizer)) => Self::with_recognizer(Box::new(recognizer)),
            Ok(None) => {
                info!("speech capture disabled: no transcription api key configured");
                Self::unsupported()
            }
            Err(err) => {
                info!("speech capture disabled: {err}");
                Self::unsupported()
            }
        }
    }

    pub fn unsupported() -> Self {
        Self {
            recognizer: None,
            listening: false,
            transcript: String::new(),
            fresh: false,
        }
    }

    pub fn with_recognizer(recognizer: Box<dyn VoiceRecognizer>) -> Self {
        Self {
            recognizer: Some(recognizer),
            listening: false,
            transcript: String::new(),
            fresh: false,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn toggle_listening(&mut self) {
        if self.listening {
            self.stop_listening();
        } else {
            self.start_listening();
        }
    }

    pub fn start_listening(&mut self) {
        if self.listening {
            return;
        }
        if let Some(recognizer) = self.recognizer.as_mut() {
            match recognizer.start() {
                Ok(()) => self.listening = true,
                Err(err) => warn!("could not start listening: {err}"),
            }
        }
    }

    /// Finalizes the recording; the transcript arrives later via `poll`.
    pub fn stop_listening(&mut self) {
        if !self.listening {
            return;
        }
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        self.listening = false;
    }

    pub fn poll(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            if let Some(text) = recognizer.poll_transcript() {
                if !text.is_empty() {
                    self.transcript = text;
                    self.fresh = true;
                }
            }
        }
    }

    /// A transcript that landed since the last call, for syncing the input.
    pub fn take_update(&mut self) -> Option<String> {
        if self.fresh {
            self.fresh = false;
            Some(self.transcript.clone())
        } else {
            None
        }
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Clears the transcript without touching the listening state. Called
    /// when a message is sent and when the input is cleared by hand.
    pub fn reset_transcript(&mut self) {
        self.transcript.clear();
        self.fresh = false;
    }
}

/// Captures mono audio from the default input device into a WAV buffer.
pub struct MicRecorder {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    samples: Arc<Mutex<Vec<f32>>>,
}

impl MicRecorder {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no input device available"))?;

        // Prefer 16 kHz mono; fall back to the device default rate.
        let mut config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(16_000),
            buffer_size: cpal::BufferSize::Default,
        };

        let supports_16k = device
            .supported_input_configs()
            .map(|mut configs| {
                configs.any(|c| {
                    c.channels() == 1
                        && c.min_sample_rate() <= SampleRate(16_000)
                        && c.max_sample_rate() >= SampleRate(16_000)
                })
            })
            .unwrap_or(false);

        if !supports_16k {
            let default = device.default_input_config()?;
            config = default.into();
            config.channels = 1;
        }

        Ok(Self {
            device,
            config,
            stream: None,
            samples: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        self.samples.lock().unwrap().clear();
        let samples = Arc::clone(&self.samples);

        let sample_format = self.device.default_input_config()?.sample_format();
        let err_fn = |err| error!("input stream error: {err}");

        let stream = match sample_format {
            SampleFormat::F32 => self.device.build_input_stream(
                &self.config,
                move |data: &[f32], _| {
                    samples.lock().unwrap().extend_from_slice(data);
                },
                err_fn,
                None,
            )?,
            SampleFormat::I16 => self.device.build_input_stream(
                &self.config,
                move |data: &[i16], _| {
                    let mut buffer = samples.lock().unwrap();
                    buffer.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported sample format {other:?}")),
        };

        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Stops the stream and returns the recording as 16-bit WAV bytes.
    pub fn stop(&mut self) -> Result<Vec<u8>> {
        if self.stream.take().is_none() {
            return Err(anyhow!("not recording"));
        }

        let samples = self.samples.lock().unwrap().clone();
        if samples.is_empty() {
            return Err(anyhow!("no audio captured"));
        }

        let mut wav = Vec::new();
        {
            let spec = WavSpec {
                channels: 1,
                sample_rate: self.config.sample_rate.0,
                bits_per_sample: 16,
                sample_format: WavSampleFormat::Int,
            };
            let mut writer = WavWriter::new(Cursor::new(&mut wav), spec)?;
            for &sample in &samples {
                let quantized =
                    (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                writer.write_sample(quantized)?;
            }
            writer.finalize()?;
        }

        Ok(wav)
    }
}

#[derive(Deserialize)]
struct TranscriptionReply {
    text: String,
}

/// Client for an OpenAI-compatible `audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct TranscribeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl TranscribeClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, language: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            language: language.map(str::to_string),
        }
    }

    pub async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        let file = Part::bytes(wav)
            .file_name("speech.wav")
            .mime_str("audio/wav")?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json")
            .text("temperature", "0");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Transcription request failed with status {}: {}",
                status,
                text
            ));
        }

        let reply: TranscriptionReply = response.json().await?;
        Ok(reply.text)
    }
}

/// Recorder plus hosted transcription, glued together as a recognizer.
pub struct WhisperRecognizer {
    recorder: MicRecorder,
    client: TranscribeClient,
    sender: mpsc::UnboundedSender<String>,
    results: mpsc::UnboundedReceiver<String>,
}

impl WhisperRecognizer {
    /// `Ok(None)` means dictation is not configured, which is not an error.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let api_key = match config.stt_api_key() {
            Some(key) => key,
            None => return Ok(None),
        };

        let recorder = MicRecorder::new()?;
        let client = TranscribeClient::new(
            &config.stt_base_url,
            &api_key,
            &config.stt_model,
            config.stt_language.as_deref(),
        );
        let (sender, results) = mpsc::unbounded_channel();

        Ok(Some(Self {
            recorder,
            client,
            sender,
            results,
        }))
    }
}

impl VoiceRecognizer for WhisperRecognizer {
    fn start(&mut self) -> Result<()> {
        self.recorder.start()
    }

    fn stop(&mut self) {
        let wav = match self.recorder.stop() {
            Ok(wav) => wav,
            Err(err) => {
                warn!("recording produced nothing to transcribe: {err}");
                return;
            }
        };

        let client = self.client.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            match client.transcribe(wav).await {
                Ok(text) => {
                    info!("transcribed {} chars", text.len());
                    let _ = sender.send(text);
                }
                Err(err) => error!("transcription failed: {err}"),
            }
        });
    }

    fn poll_transcript(&mut self) -> Option<String> {
        self.results.try_recv().ok()
    }
}
