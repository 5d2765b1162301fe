use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::speech::output::{AudioError, AudioOutput, AudioVoice};

/// Set once the user has interacted with the app; never reset for the rest
/// of the process. Shared by handle so tests start from a locked state.
#[derive(Clone, Default)]
pub struct AudioUnlock(Arc<AtomicBool>);

impl AudioUnlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unlocked(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn unlock(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

enum Playback {
    Idle,
    Playing(Box<dyn AudioVoice>),
    /// The device was not available yet; the url waits for the next user
    /// interaction. Only one clip ever waits here.
    PendingUnlock(String),
}

/// Plays at most one assistant voice clip at a time. A new clip always
/// preempts whatever is playing or pending.
pub struct SpeechPlayer {
    output: Box<dyn AudioOutput>,
    unlock: AudioUnlock,
    playback: Playback,
}

impl SpeechPlayer {
    pub fn new(output: Box<dyn AudioOutput>, unlock: AudioUnlock) -> Self {
        Self {
            output,
            unlock,
            playback: Playback::Idle,
        }
    }

    pub fn play(&mut self, url: &str) {
        if url.is_empty() {
            debug!("playback requested without an audio url");
            return;
        }

        self.clear_current();

        match self.output.begin(url) {
            Ok(voice) => {
                self.playback = Playback::Playing(voice);
            }
            Err(AudioError::DeviceUnavailable) => {
                info!("audio device unavailable, deferring clip until the next interaction");
                self.playback = Playback::PendingUnlock(url.to_string());
            }
            Err(err) => {
                error!("audio playback failed: {err}");
            }
        }
    }

    /// Stops and discards the current clip and anything pending. Safe to call
    /// in any state.
    pub fn stop(&mut self) {
        self.clear_current();
    }

    /// Every key or mouse event lands here. The first one unlocks audio for
    /// the process and replays a deferred clip, if any; afterwards this is a
    /// no-op unless a clip is waiting again. A clip that is already playing
    /// is never disturbed.
    pub fn notify_interaction(&mut self) {
        let waiting = matches!(self.playback, Playback::PendingUnlock(_));
        if self.unlock.is_unlocked() && !waiting {
            return;
        }

        self.output.resume();
        self.unlock.unlock();

        if !waiting {
            return;
        }
        if let Playback::PendingUnlock(url) = mem::replace(&mut self.playback, Playback::Idle) {
            debug!("replaying deferred clip after interaction");
            self.play(&url);
        }
    }

    /// Called on the UI tick; retires a clip that finished on its own.
    pub fn poll(&mut self) {
        if let Playback::Playing(voice) = &self.playback {
            if voice.is_finished() {
                self.playback = Playback::Idle;
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.playback, Playback::Playing(_))
    }

    pub fn has_pending(&self) -> bool {
        matches!(self.playback, Playback::PendingUnlock(_))
    }

    fn clear_current(&mut self) {
        if let Playback::Playing(mut voice) = mem::replace(&mut self.playback, Playback::Idle) {
            voice.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct OutputLog {
        device_available: bool,
        resume_opens_device: bool,
        started: Vec<String>,
        finished_flags: Vec<Arc<AtomicBool>>,
        active: usize,
        max_active: usize,
        stops: usize,
        resumes: usize,
    }

    struct FakeOutput(Arc<Mutex<OutputLog>>);

    struct FakeVoice {
        log: Arc<Mutex<OutputLog>>,
        finished: Arc<AtomicBool>,
    }

    impl AudioOutput for FakeOutput {
        fn begin(&mut self, url: &str) -> Result<Box<dyn AudioVoice>, AudioError> {
            let mut log = self.0.lock().unwrap();
            if !log.device_available {
                return Err(AudioError::DeviceUnavailable);
            }
            let finished = Arc::new(AtomicBool::new(false));
            log.started.push(url.to_string());
            log.finished_flags.push(Arc::clone(&finished));
            log.active += 1;
            log.max_active = log.max_active.max(log.active);
            Ok(Box::new(FakeVoice {
                log: Arc::clone(&self.0),
                finished,
            }))
        }

        fn resume(&mut self) {
            let mut log = self.0.lock().unwrap();
            log.resumes += 1;
            if log.resume_opens_device {
                log.device_available = true;
            }
        }
    }

    impl AudioVoice for FakeVoice {
        fn is_finished(&self) -> bool {
            self.finished.load(Ordering::Relaxed)
        }

        fn stop(&mut self) {
            self.log.lock().unwrap().stops += 1;
        }
    }

    impl Drop for FakeVoice {
        fn drop(&mut self) {
            self.log.lock().unwrap().active -= 1;
        }
    }

    fn player(available: bool) -> (SpeechPlayer, Arc<Mutex<OutputLog>>, AudioUnlock) {
        let log = Arc::new(Mutex::new(OutputLog {
            device_available: available,
            resume_opens_device: !available,
            ..OutputLog::default()
        }));
        let unlock = AudioUnlock::new();
        let player = SpeechPlayer::new(Box::new(FakeOutput(Arc::clone(&log))), unlock.clone());
        (player, log, unlock)
    }

    #[test]
    fn new_clip_preempts_the_previous_one() {
        let (mut player, log, _) = player(true);
        player.play("a.wav");
        player.play("b.wav");

        let log = log.lock().unwrap();
        assert_eq!(log.started, vec!["a.wav", "b.wav"]);
        assert_eq!(log.max_active, 1);
        assert_eq!(log.stops, 1);
        drop(log);
        assert!(player.is_speaking());
    }

    #[test]
    fn stop_is_idempotent_from_idle() {
        let (mut player, log, _) = player(true);
        player.stop();
        player.stop();
        assert!(!player.is_speaking());
        assert_eq!(log.lock().unwrap().stops, 0);
    }

    #[test]
    fn empty_url_is_ignored() {
        let (mut player, log, _) = player(true);
        player.play("");
        assert!(!player.is_speaking());
        assert!(log.lock().unwrap().started.is_empty());
    }

    #[test]
    fn finished_clip_returns_to_idle_on_poll() {
        let (mut player, log, _) = player(true);
        player.play("a.wav");
        assert!(player.is_speaking());

        log.lock().unwrap().finished_flags[0].store(true, Ordering::Relaxed);
        player.poll();
        assert!(!player.is_speaking());
    }

    #[test]
    fn blocked_clip_waits_and_replays_exactly_once() {
        let (mut player, log, unlock) = player(false);
        player.play("welcome.wav");
        assert!(!player.is_speaking());
        assert!(player.has_pending());
        assert!(log.lock().unwrap().started.is_empty());
        assert!(!unlock.is_unlocked());

        player.notify_interaction();
        assert!(unlock.is_unlocked());
        assert!(player.is_speaking());
        assert!(!player.has_pending());
        assert_eq!(log.lock().unwrap().started, vec!["welcome.wav"]);

        player.notify_interaction();
        player.notify_interaction();
        assert_eq!(log.lock().unwrap().started, vec!["welcome.wav"]);
    }

    #[test]
    fn first_interaction_leaves_a_playing_clip_alone() {
        let (mut player, log, unlock) = player(true);
        player.play("welcome.wav");
        assert!(player.is_speaking());
        assert!(!unlock.is_unlocked());

        player.notify_interaction();

        assert!(unlock.is_unlocked());
        assert!(player.is_speaking());
        let log = log.lock().unwrap();
        assert_eq!(log.started, vec!["welcome.wav"]);
        assert_eq!(log.stops, 0);
        assert_eq!(log.active, 1);
    }

    #[test]
    fn newer_clip_supersedes_the_pending_one() {
        let (mut player, log, _) = player(false);
        player.play("first.wav");
        player.play("second.wav");
        assert!(player.has_pending());

        player.notify_interaction();
        assert_eq!(log.lock().unwrap().started, vec!["second.wav"]);
    }

    #[test]
    fn stop_discards_the_pending_clip() {
        let (mut player, log, _) = player(false);
        player.play("a.wav");
        player.stop();
        assert!(!player.has_pending());

        player.notify_interaction();
        assert!(log.lock().unwrap().started.is_empty());
    }

    #[test]
    fn interaction_when_idle_just_unlocks() {
        let (mut player, log, unlock) = player(true);
        player.notify_interaction();
        assert!(unlock.is_unlocked());
        assert!(log.lock().unwrap().started.is_empty());

        // Later interactions skip the resume path entirely.
        player.notify_interaction();
        assert_eq!(log.lock().unwrap().resumes, 1);
    }
}
