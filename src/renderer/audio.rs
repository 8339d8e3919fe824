use super::{Key, ReaderInput, RendererAction};
use crate::error::Result;
use crate::settings::{Constraint, ReaderSettings, SettingKey};

/// Seconds jumped back by [`AudioView::skip_back`].
pub const SKIP_BACK_SECONDS: f64 = 15.0;
/// Seconds jumped forward by [`AudioView::skip_forward`].
pub const SKIP_FORWARD_SECONDS: f64 = 30.0;

/// Media playback surface provided by the host.
pub trait MediaElement {
    /// Load a source.
    fn set_source(&mut self, url: &str);
    /// Start playback; may be refused (e.g. autoplay policy).
    fn play(&mut self) -> Result<()>;
    /// Pause playback.
    fn pause(&mut self);
    /// Whether playback is paused.
    fn is_paused(&self) -> bool;
    /// Playback position in seconds.
    fn current_time(&self) -> f64;
    /// Move the playback position.
    fn set_current_time(&mut self, seconds: f64);
    /// Length in seconds, once known.
    fn duration(&self) -> Option<f64>;
    /// Set volume in `[0, 1]`.
    fn set_volume(&mut self, volume: f64);
    /// Set the playback rate.
    fn set_playback_rate(&mut self, rate: f64);
}

/// Media element without output. Tracks state only; used headless.
#[derive(Debug, Clone, PartialEq)]
pub struct SilentMedia {
    /// Loaded source.
    pub source: Option<String>,
    /// Paused flag.
    pub paused: bool,
    /// Position in seconds.
    pub time: f64,
    /// Known length.
    pub length: Option<f64>,
    /// Volume.
    pub volume: f64,
    /// Playback rate.
    pub rate: f64,
}

impl Default for SilentMedia {
    fn default() -> Self {
        Self {
            source: None,
            paused: true,
            time: 0.0,
            length: None,
            volume: 1.0,
            rate: 1.0,
        }
    }
}

impl MediaElement for SilentMedia {
    fn set_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
        self.time = 0.0;
        self.paused = true;
    }

    fn play(&mut self) -> Result<()> {
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.time = seconds;
    }

    fn duration(&self) -> Option<f64> {
        self.length
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }
}

/// Audiobook player bound to a media element.
pub struct AudioView<E: MediaElement> {
    element: E,
    url: String,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

impl<E: MediaElement> AudioView<E> {
    /// Load `url` into `element`, apply speed and volume, and seek to
    /// `start_time`.
    pub fn new(
        mut element: E,
        url: &str,
        start_time: Option<f64>,
        end_time: Option<f64>,
        settings: &ReaderSettings,
    ) -> Self {
        element.set_source(url);
        let mut view = Self {
            element,
            url: url.to_string(),
            start_time,
            end_time,
        };
        view.apply_settings(settings);
        if let Some(start) = start_time {
            view.seek(start);
        }
        view
    }

    /// Bound element.
    pub fn element(&self) -> &E {
        &self.element
    }

    /// Bound element, mutably (for host events such as duration changes).
    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    /// Audio source.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Offsets of this page inside the file.
    pub fn segment(&self) -> (Option<f64>, Option<f64>) {
        (self.start_time, self.end_time)
    }

    /// Start playback. A refusal is logged and leaves the player paused.
    pub fn play(&mut self) {
        if let Err(e) = self.element.play() {
            tracing::warn!(url = %self.url, error = %e, "Playback refused");
        }
    }

    /// Pause playback.
    pub fn pause(&mut self) {
        self.element.pause();
    }

    /// Play when paused, pause when playing.
    pub fn toggle(&mut self) {
        if self.element.is_paused() {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Move to `seconds`, clamped into the file.
    pub fn seek(&mut self, seconds: f64) {
        let upper = self
            .element
            .duration()
            .filter(|d| *d >= 0.0)
            .unwrap_or(f64::INFINITY);
        let target = if seconds.is_nan() { 0.0 } else { seconds.clamp(0.0, upper) };
        self.element.set_current_time(target);
    }

    /// Jump back.
    pub fn skip_back(&mut self) {
        self.seek(self.element.current_time() - SKIP_BACK_SECONDS);
    }

    /// Jump forward.
    pub fn skip_forward(&mut self) {
        self.seek(self.element.current_time() + SKIP_FORWARD_SECONDS);
    }

    /// Set volume, validated like the stored setting.
    pub fn set_volume(&mut self, volume: f64) {
        self.element.set_volume(validated(SettingKey::AudioVolume, volume, 1.0));
    }

    /// Set speed, validated like the stored setting.
    pub fn set_speed(&mut self, speed: f64) {
        self.element
            .set_playback_rate(validated(SettingKey::AudioPlaybackSpeed, speed, 1.0));
    }

    /// Pick up speed and volume.
    pub fn apply_settings(&mut self, settings: &ReaderSettings) {
        self.element.set_playback_rate(settings.audio_playback_speed);
        self.element.set_volume(settings.audio_volume);
    }

    /// React to input.
    pub fn handle(&mut self, input: &ReaderInput) -> Option<RendererAction> {
        match input {
            ReaderInput::KeyDown(Key::Space) => self.toggle(),
            ReaderInput::KeyDown(Key::ArrowLeft) => self.skip_back(),
            ReaderInput::KeyDown(Key::ArrowRight) => self.skip_forward(),
            ReaderInput::KeyDown(Key::PageUp) => return Some(RendererAction::PrevPage),
            ReaderInput::KeyDown(Key::PageDown) => return Some(RendererAction::NextPage),
            _ => {}
        }
        None
    }
}

fn validated(key: SettingKey, value: f64, fallback: f64) -> f64 {
    match key.constraint() {
        Constraint::Range(range) if value.is_finite() => range.validate(value),
        _ => fallback,
    }
}
