pub mod output;
pub mod stt;
pub mod tts;

pub use output::{AudioError, AudioOutput, AudioVoice, RodioOutput};
pub use stt::{SpeechCapture, VoiceRecognizer};
pub use tts::{AudioUnlock, SpeechPlayer};
