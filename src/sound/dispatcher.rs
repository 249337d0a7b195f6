//! One-shot sound dispatch
//!
//! Voices are claimed strictly round-robin, wrapping regardless of
//! play/stop state: the oldest claim is stolen even if it is still
//! playing. Per-clip retrigger times throttle rapid repeats, named groups
//! select uniformly among numeric-suffix variants, and solo playback
//! ducks the music stack until the solo voice finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use crate::error::AudioError;
use crate::music::MusicLayerStack;
use crate::playback::{AudioBuffer, AudioOutput, Voice};
use crate::settings::AudioSettings;

/// Only one sound dispatcher may be enabled per process at a time.
static SOUND_ENABLED: AtomicBool = AtomicBool::new(false);

/// Triggers during the first second of uptime are ignored so a burst of
/// effects during host startup stays silent.
const STARTUP_SILENCE: f32 = 1.0;

/// Flat 2D position on the listener plane (x across, z forward).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }
}

/// Construction parameters for [`OneShotSoundDispatcher`].
#[derive(Debug, Clone)]
pub struct SoundConfig {
    /// Size of the round-robin effect voice pool.
    pub voice_count: usize,
    /// Emitter reference point used while no listener is reported.
    pub default_anchor: Position,
    /// Seeds master volume: a disabled dispatcher plays silently.
    pub enabled: bool,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            voice_count: 30,
            default_anchor: Position::default(),
            enabled: true,
        }
    }
}

impl SoundConfig {
    pub fn from_settings(settings: &AudioSettings) -> Self {
        Self {
            enabled: settings.is_sound_enabled,
            ..Self::default()
        }
    }
}

pub struct OneShotSoundDispatcher {
    clips: Vec<Arc<AudioBuffer>>,
    /// Lower-cased clip name -> catalog index; built once at startup.
    clip_map: HashMap<String, usize>,
    /// Lower-cased group key -> member indices; filled lazily per key.
    groups: HashMap<String, Vec<usize>>,
    /// Lower-cased clip name -> next time the clip may trigger.
    down_times: HashMap<String, f32>,
    voices: Vec<Voice>,
    next_voice: usize,
    master_volume: f32,
    /// Listener-tracking reference point, refreshed each tick.
    position: Position,
    default_anchor: Position,
    /// Monotonic clock in seconds since construction, fed by `tick`.
    uptime: f32,
    music: Arc<Mutex<MusicLayerStack>>,
    /// Voice slots with a pending solo duck; polled each tick.
    solo_waits: Vec<usize>,
}

impl OneShotSoundDispatcher {
    /// Build the dispatcher around a clip catalog and the shared music
    /// stack handle used for solo ducking.
    ///
    /// Rejects a second live instance; drop the first to enable another.
    pub fn new(
        clips: Vec<Arc<AudioBuffer>>,
        config: SoundConfig,
        music: Arc<Mutex<MusicLayerStack>>,
        output: Option<&AudioOutput>,
    ) -> Result<Self, AudioError> {
        if SOUND_ENABLED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AudioError::AlreadyEnabled("sound"));
        }

        let mut clip_map = HashMap::with_capacity(clips.len());
        for (index, clip) in clips.iter().enumerate() {
            clip_map.insert(clip.name().to_lowercase(), index);
        }

        let handle = output.map(|o| o.handle().clone());
        let voice_count = config.voice_count.max(1);
        let mut voices = Vec::with_capacity(voice_count);
        for id in 0..voice_count {
            voices.push(Voice::new(id, handle.clone()));
        }

        tracing::debug!(
            "Sound dispatcher enabled: {} clips, {} voices",
            clips.len(),
            voices.len()
        );

        Ok(Self {
            clips,
            clip_map,
            groups: HashMap::new(),
            down_times: HashMap::new(),
            voices,
            next_voice: 0,
            master_volume: if config.enabled { 1.0 } else { 0.0 },
            position: config.default_anchor,
            default_anchor: config.default_anchor,
            uptime: 0.0,
            music,
            solo_waits: Vec::new(),
        })
    }

    /// Advance one frame: accumulate the clock, re-anchor the emitter
    /// reference point to the listener, move voice positions, and resume
    /// the music stack for any solo voice that finished.
    pub fn tick(&mut self, delta: f32, listener: Option<Position>) {
        self.uptime += delta.max(0.0);
        self.position = listener.unwrap_or(self.default_anchor);
        for voice in &mut self.voices {
            voice.advance(delta);
        }

        let voices = &self.voices;
        let mut completed = 0;
        self.solo_waits.retain(|&slot| {
            let playing = voices[slot].is_playing();
            if !playing {
                completed += 1;
            }
            playing
        });
        for _ in 0..completed {
            self.music.lock().resume();
        }
    }

    /// Fire a one-shot clip, returning the claimed voice slot.
    ///
    /// Returns `None` when the startup guard is active, the clip is
    /// unknown (logged), or the clip's retrigger cooldown hasn't elapsed
    /// (silent). The round-robin slot advances even for dropped calls;
    /// stealing a still-playing voice is the intended exhaustion policy.
    ///
    /// `emitter` positions the clip on the listener plane: volume falls
    /// off with Manhattan distance and the x offset leans the stereo pan.
    pub fn play(
        &mut self,
        emitter: Option<Position>,
        clip_name: &str,
        volume: f32,
        retrigger_cooldown: f32,
    ) -> Option<usize> {
        if self.uptime < STARTUP_SILENCE {
            return None;
        }
        let slot = self.claim_next_voice();

        let volume = (volume * self.master_volume).clamp(0.0, 1.0);

        let key = clip_name.to_lowercase();
        let Some(&clip) = self.clip_map.get(&key) else {
            tracing::warn!("Can't find clip: {}", clip_name);
            return None;
        };

        if let Some(&allowed) = self.down_times.get(&key) {
            if self.uptime < allowed {
                return None;
            }
        }

        let at = emitter.unwrap_or(self.position);
        let dx = at.x - self.position.x;
        let dz = at.z - self.position.z;
        let distance = dx.abs() + dz.abs();
        let pan = (dx * 0.1).clamp(-1.0, 1.0);

        let buffer = Arc::clone(&self.clips[clip]);
        let voice = &mut self.voices[slot];
        voice.set_volume((volume * 10.0 - distance * 0.1).clamp(0.1, 1.0));
        voice.set_pan(pan);
        voice.bind(buffer);
        voice.set_looping(false);
        voice.seek(0.0);
        voice.start();

        self.down_times.insert(key, self.uptime + retrigger_cooldown);
        Some(slot)
    }

    /// Fire one random member of a clip group.
    ///
    /// A group collects the catalog entries whose lower-cased name equals
    /// `group_key` or `group_key` plus a purely numeric suffix; the set is
    /// resolved once per key and cached. Empty groups warn and no-op.
    pub fn play_group(
        &mut self,
        emitter: Option<Position>,
        group_key: &str,
        volume: f32,
        retrigger_cooldown: f32,
    ) -> Option<usize> {
        let key = group_key.to_lowercase();
        if !self.groups.contains_key(&key) {
            let members = resolve_group(&self.clips, &key);
            self.groups.insert(key.clone(), members);
        }

        let members = &self.groups[&key];
        if members.is_empty() {
            tracing::warn!("Empty clip group: {}", group_key);
            return None;
        }
        let pick = members[rand::thread_rng().gen_range(0..members.len())];
        let name = self.clips[pick].name().to_string();
        self.play(emitter, &name, volume, retrigger_cooldown)
    }

    /// Play a clip and duck all music until it finishes.
    ///
    /// The duck is cooperative: music stops immediately (full stack fade),
    /// and the resume happens from `tick` on the first frame where the
    /// claimed voice is no longer playing. A dropped play ducks nothing.
    ///
    /// Known limitation: overlapping solos share the music stack's single
    /// pause snapshot, so only the most recent stop's snapshot survives
    /// the eventual resume.
    pub fn play_solo(
        &mut self,
        clip_name: &str,
        volume: f32,
        retrigger_cooldown: f32,
    ) -> Option<usize> {
        let slot = self.play(None, clip_name, volume, retrigger_cooldown)?;
        self.music.lock().stop_all();
        self.solo_waits.push(slot);
        Some(slot)
    }

    /// Stop every voice whose bound clip name starts with the prefix
    /// (case-insensitive). Voices with no bound clip are skipped.
    pub fn stop(&mut self, clip_name_prefix: &str) {
        let prefix = clip_name_prefix.to_lowercase();
        for voice in &mut self.voices {
            let Some(name) = voice.buffer().map(|b| b.name().to_lowercase()) else {
                continue;
            };
            if name.starts_with(&prefix) {
                voice.stop();
            }
        }
    }

    /// Stop every voice unconditionally.
    pub fn stop_all(&mut self) {
        for voice in &mut self.voices {
            voice.stop();
        }
    }

    pub fn mute(&mut self, mute: bool) {
        self.master_volume = if mute { 0.0 } else { 1.0 };
    }

    /// True only while master volume is exactly zero. (The music stack's
    /// query answers with the opposite polarity; both are kept as
    /// shipped.)
    pub fn is_muted(&self) -> bool {
        self.master_volume == 0.0
    }

    /// Resolved (and cached) member clip names for a group key.
    pub fn group_members(&mut self, group_key: &str) -> Vec<String> {
        let key = group_key.to_lowercase();
        if !self.groups.contains_key(&key) {
            let members = resolve_group(&self.clips, &key);
            self.groups.insert(key.clone(), members);
        }
        self.groups[&key]
            .iter()
            .map(|&i| self.clips[i].name().to_string())
            .collect()
    }

    /// Voice by pool slot, for monitoring.
    pub fn voice(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }

    /// Number of voices currently playing.
    pub fn playing_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_playing()).count()
    }

    /// Seconds since construction, as accumulated by `tick`.
    pub fn uptime(&self) -> f32 {
        self.uptime
    }

    fn claim_next_voice(&mut self) -> usize {
        let slot = self.next_voice;
        self.next_voice = (self.next_voice + 1) % self.voices.len();
        slot
    }
}

impl Drop for OneShotSoundDispatcher {
    fn drop(&mut self) {
        SOUND_ENABLED.store(false, Ordering::SeqCst);
    }
}

/// Catalog indices whose lower-cased name is `key`, or `key` followed by
/// nothing but decimal digits.
fn resolve_group(clips: &[Arc<AudioBuffer>], key: &str) -> Vec<usize> {
    let mut members = Vec::new();
    for (index, clip) in clips.iter().enumerate() {
        let name = clip.name().to_lowercase();
        let Some(suffix) = name.strip_prefix(key) else {
            continue;
        };
        if suffix.bytes().all(|b| b.is_ascii_digit()) {
            members.push(index);
        }
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::{MusicConfig, MusicLayerStack, Track};
    use serial_test::serial;

    fn clips() -> Vec<Arc<AudioBuffer>> {
        vec![
            AudioBuffer::silent("Hit", 0.5),
            AudioBuffer::silent("explosion", 1.0),
            AudioBuffer::silent("explosion2", 1.0),
            AudioBuffer::silent("explosion10", 1.0),
            AudioBuffer::silent("explosionX", 1.0),
            AudioBuffer::silent("boom", 0.5),
        ]
    }

    fn music_handle() -> Arc<Mutex<MusicLayerStack>> {
        let tracks = vec![Track::new(AudioBuffer::silent("Theme", 10.0), 0.0, 0.0, 0.0)];
        Arc::new(Mutex::new(
            MusicLayerStack::new(tracks, MusicConfig::default(), None).unwrap(),
        ))
    }

    fn dispatcher_with(config: SoundConfig) -> (OneShotSoundDispatcher, Arc<Mutex<MusicLayerStack>>) {
        let music = music_handle();
        let sounds =
            OneShotSoundDispatcher::new(clips(), config, Arc::clone(&music), None).unwrap();
        (sounds, music)
    }

    /// Dispatcher ticked past the startup silence window.
    fn warm_dispatcher() -> (OneShotSoundDispatcher, Arc<Mutex<MusicLayerStack>>) {
        let (mut sounds, music) = dispatcher_with(SoundConfig::default());
        sounds.tick(STARTUP_SILENCE, None);
        (sounds, music)
    }

    #[test]
    #[serial]
    fn test_single_enable_guard() {
        let (first, music) = dispatcher_with(SoundConfig::default());
        let second =
            OneShotSoundDispatcher::new(clips(), SoundConfig::default(), music, None);
        assert!(matches!(second, Err(AudioError::AlreadyEnabled("sound"))));
        drop(first);
    }

    #[test]
    #[serial]
    fn test_startup_silence_guard() {
        let (mut sounds, _music) = dispatcher_with(SoundConfig::default());
        assert_eq!(sounds.play(None, "hit", 1.0, 0.1), None);
        assert_eq!(sounds.playing_count(), 0);

        sounds.tick(STARTUP_SILENCE, None);
        assert!(sounds.play(None, "hit", 1.0, 0.1).is_some());
    }

    #[test]
    #[serial]
    fn test_unknown_clip_is_harmless() {
        let (mut sounds, _music) = warm_dispatcher();
        assert_eq!(sounds.play(None, "kazoo", 1.0, 0.1), None);
        assert_eq!(sounds.playing_count(), 0);
    }

    #[test]
    #[serial]
    fn test_lookup_is_case_insensitive() {
        let (mut sounds, _music) = warm_dispatcher();
        let slot = sounds.play(None, "HIT", 1.0, 0.1).unwrap();
        assert_eq!(sounds.voice(slot).unwrap().buffer().unwrap().name(), "Hit");
    }

    #[test]
    #[serial]
    fn test_retrigger_cooldown() {
        let (mut sounds, _music) = warm_dispatcher();

        assert!(sounds.play(None, "hit", 1.0, 1.0).is_some());
        sounds.tick(0.5, None);
        assert_eq!(sounds.play(None, "hit", 1.0, 1.0), None);
        sounds.tick(0.6, None);
        assert!(sounds.play(None, "hit", 1.0, 1.0).is_some());
    }

    #[test]
    #[serial]
    fn test_round_robin_steals_oldest_claim() {
        let config = SoundConfig {
            voice_count: 2,
            ..SoundConfig::default()
        };
        let (mut sounds, _music) = dispatcher_with(config);
        sounds.tick(STARTUP_SILENCE, None);

        assert_eq!(sounds.play(None, "explosion", 1.0, 0.0), Some(0));
        assert_eq!(sounds.play(None, "boom", 1.0, 0.0), Some(1));
        // both voices are still playing; slot 0 is claimed anyway
        assert_eq!(sounds.play(None, "hit", 1.0, 0.0), Some(0));
        assert_eq!(sounds.voice(0).unwrap().buffer().unwrap().name(), "Hit");
    }

    #[test]
    #[serial]
    fn test_dropped_call_still_consumes_round_robin_slot() {
        let config = SoundConfig {
            voice_count: 2,
            ..SoundConfig::default()
        };
        let (mut sounds, _music) = dispatcher_with(config);
        sounds.tick(STARTUP_SILENCE, None);

        assert_eq!(sounds.play(None, "hit", 1.0, 10.0), Some(0));
        // throttled, but the claim advanced past slot 1
        assert_eq!(sounds.play(None, "hit", 1.0, 10.0), None);
        assert_eq!(sounds.play(None, "boom", 1.0, 0.0), Some(0));
    }

    #[test]
    #[serial]
    fn test_group_selects_only_numeric_suffixes() {
        let (mut sounds, _music) = warm_dispatcher();
        let mut members = sounds.group_members("explosion");
        members.sort();
        assert_eq!(members, vec!["explosion", "explosion10", "explosion2"]);

        for _ in 0..20 {
            let slot = sounds.play_group(None, "Explosion", 1.0, 0.0).unwrap();
            let name = sounds.voice(slot).unwrap().buffer().unwrap().name().to_string();
            assert!(members.contains(&name));
        }
    }

    #[test]
    #[serial]
    fn test_empty_group_warns_and_noops() {
        let (mut sounds, _music) = warm_dispatcher();
        assert_eq!(sounds.play_group(None, "thunder", 1.0, 0.1), None);
        assert_eq!(sounds.playing_count(), 0);
        assert!(sounds.group_members("thunder").is_empty());
    }

    #[test]
    #[serial]
    fn test_positional_attenuation_and_pan() {
        let (mut sounds, _music) = warm_dispatcher();

        // co-located emitter: full volume, centered
        let slot = sounds
            .play(Some(Position::new(0.0, 0.0)), "hit", 1.0, 0.0)
            .unwrap();
        let voice = sounds.voice(slot).unwrap();
        assert_eq!(voice.volume(), 1.0);
        assert_eq!(voice.pan(), 0.0);

        // distant emitter: falloff saturates at the 0.1 floor, pan clamps
        let slot = sounds
            .play(Some(Position::new(100.0, 0.0)), "hit", 1.0, 0.0)
            .unwrap();
        let voice = sounds.voice(slot).unwrap();
        assert!((voice.volume() - 0.1).abs() < 1e-6);
        assert_eq!(voice.pan(), 1.0);
    }

    #[test]
    #[serial]
    fn test_listener_anchor_follows_tick() {
        let (mut sounds, _music) = warm_dispatcher();
        sounds.tick(0.016, Some(Position::new(50.0, 0.0)));

        // emitter 50 units left of the listener pans hard left
        let slot = sounds
            .play(Some(Position::new(0.0, 0.0)), "hit", 1.0, 0.0)
            .unwrap();
        assert_eq!(sounds.voice(slot).unwrap().pan(), -1.0);

        // no listener next frame: back to the default anchor
        sounds.tick(0.016, None);
        let slot = sounds
            .play(Some(Position::new(0.0, 0.0)), "boom", 1.0, 0.0)
            .unwrap();
        assert_eq!(sounds.voice(slot).unwrap().pan(), 0.0);
    }

    #[test]
    #[serial]
    fn test_solo_ducks_music_until_voice_finishes() {
        let (mut sounds, music) = warm_dispatcher();
        music.lock().play("Theme", None);
        music.lock().tick(0.25);

        let slot = sounds.play_solo("boom", 1.0, 0.0).unwrap();
        // the music snapshot is taken immediately; fades finish on the
        // stack's next tick
        music.lock().tick(0.25);
        assert_eq!(music.lock().stack_len(), 0);

        sounds.tick(0.3, None);
        assert!(sounds.voice(slot).unwrap().is_playing());
        assert_eq!(music.lock().stack_len(), 0);

        // boom (0.5s) ends inside this tick; music resumes at its offset
        sounds.tick(0.3, None);
        assert!(!sounds.voice(slot).unwrap().is_playing());
        let music = music.lock();
        assert_eq!(music.active_name(), "Theme");
        assert!((music.active_statuses()[0].position - 0.25).abs() < 1e-6);
    }

    #[test]
    #[serial]
    fn test_dropped_solo_does_not_duck() {
        let (mut sounds, music) = warm_dispatcher();
        music.lock().play("Theme", None);

        assert_eq!(sounds.play_solo("kazoo", 1.0, 0.1), None);
        music.lock().tick(0.016);
        assert_eq!(music.lock().stack_len(), 1);
    }

    #[test]
    #[serial]
    fn test_stop_by_prefix() {
        let (mut sounds, _music) = warm_dispatcher();
        let hit = sounds.play(None, "hit", 1.0, 0.0).unwrap();
        let boom = sounds.play(None, "boom", 1.0, 0.0).unwrap();

        sounds.stop("HI");
        assert!(!sounds.voice(hit).unwrap().is_playing());
        assert!(sounds.voice(boom).unwrap().is_playing());

        sounds.stop_all();
        assert_eq!(sounds.playing_count(), 0);
    }

    #[test]
    #[serial]
    fn test_mute_polarity_is_consistent() {
        let (mut sounds, _music) = warm_dispatcher();
        assert!(!sounds.is_muted());
        sounds.mute(true);
        assert!(sounds.is_muted());
        sounds.mute(false);
        assert!(!sounds.is_muted());
    }
}
