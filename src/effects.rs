//! Audio side effects
//!
//! Components describe what should be heard as [`Tone`] and [`Utterance`] values
//! and hand them to an injected [`AudioSink`]. Playback is fire-and-forget: a
//! failing sink is logged and ignored, never allowed to stop tick processing.

use crate::error::SinkError;
use log::debug;
use serde::{Deserialize, Serialize};

/// Oscillator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
}

/// Gain envelope applied over a pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// Constant gain, cut to silence at the end of the pulse
    Hold,
    /// Exponential ramp down to near-silence over the pulse
    ExponentialDecay,
}

/// A single oscillator pulse inside a tone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TonePulse {
    /// Offset from the start of the tone
    pub offset_ms: u32,
    /// Pulse length
    pub duration_ms: u32,
    /// Starting frequency
    pub frequency_hz: f32,
    /// Frequency the pulse moves to, if it changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_to_hz: Option<f32>,
    /// Offset within the pulse at which the sweep target is reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_ms: Option<u32>,
    /// Whether the frequency steps (true) or ramps linearly (false) to the target
    #[serde(default)]
    pub sweep_step: bool,
    /// Peak gain (0-1)
    pub gain: f32,
    pub envelope: Envelope,
}

/// A tone descriptor: one waveform and one or more pulses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    /// Short name used in logs and effect traces
    pub name: String,
    pub waveform: Waveform,
    pub pulses: Vec<TonePulse>,
}

impl Tone {
    /// Total audible length of the tone
    pub fn duration_ms(&self) -> u32 {
        self.pulses
            .iter()
            .map(|p| p.offset_ms + p.duration_ms)
            .max()
            .unwrap_or(0)
    }

    /// Single soft high beep for a mild over-speed
    pub fn alarm_mild() -> Self {
        Self {
            name: "alarm_mild".to_string(),
            waveform: Waveform::Sine,
            pulses: vec![TonePulse {
                offset_ms: 0,
                duration_ms: 150,
                frequency_hz: 1800.0,
                sweep_to_hz: None,
                sweep_ms: None,
                sweep_step: false,
                gain: 0.08,
                envelope: Envelope::ExponentialDecay,
            }],
        }
    }

    /// Two firm beeps half a second apart
    pub fn alarm_moderate() -> Self {
        Self {
            name: "alarm_moderate".to_string(),
            waveform: Waveform::Sine,
            pulses: (0..2)
                .map(|i| TonePulse {
                    offset_ms: i * 500,
                    duration_ms: 200,
                    frequency_hz: 2500.0,
                    sweep_to_hz: None,
                    sweep_ms: None,
                    sweep_step: false,
                    gain: 0.18,
                    envelope: Envelope::Hold,
                })
                .collect(),
        }
    }

    /// Four harsh two-pitch square pulses
    pub fn alarm_aggressive() -> Self {
        Self {
            name: "alarm_aggressive".to_string(),
            waveform: Waveform::Square,
            pulses: (0..4)
                .map(|i| TonePulse {
                    offset_ms: i * 300,
                    duration_ms: 200,
                    frequency_hz: 2500.0,
                    sweep_to_hz: Some(3000.0),
                    sweep_ms: Some(100),
                    sweep_step: true,
                    gain: 0.25,
                    envelope: Envelope::Hold,
                })
                .collect(),
        }
    }

    /// Falling triangle chirp used for turn warnings
    pub fn turn_warning() -> Self {
        Self {
            name: "turn_warning".to_string(),
            waveform: Waveform::Triangle,
            pulses: vec![TonePulse {
                offset_ms: 0,
                duration_ms: 300,
                frequency_hz: 1200.0,
                sweep_to_hz: Some(800.0),
                sweep_ms: Some(200),
                sweep_step: false,
                gain: 0.15,
                envelope: Envelope::ExponentialDecay,
            }],
        }
    }

    /// Rising C-major arpeggio used for break reminders
    pub fn break_chime() -> Self {
        let notes = [523.25_f32, 659.25, 783.99];
        Self {
            name: "break_chime".to_string(),
            waveform: Waveform::Sine,
            pulses: notes
                .iter()
                .enumerate()
                .map(|(i, &freq)| TonePulse {
                    offset_ms: i as u32 * 300,
                    duration_ms: 400,
                    frequency_hz: freq,
                    sweep_to_hz: None,
                    sweep_ms: None,
                    sweep_step: false,
                    gain: 0.06,
                    envelope: Envelope::ExponentialDecay,
                })
                .collect(),
        }
    }
}

/// A spoken-text request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    /// Speech rate multiplier (1.0 = normal)
    pub rate: f32,
    pub pitch: f32,
    /// Volume (0-1)
    pub volume: f32,
    /// Cancel anything currently being spoken before this utterance
    #[serde(default)]
    pub interrupt: bool,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rate: 1.0,
            pitch: 1.0,
            volume: 0.8,
            interrupt: false,
        }
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn interrupting(mut self) -> Self {
        self.interrupt = true;
        self
    }
}

/// Capability for producing sound. Both operations are best-effort.
pub trait AudioSink {
    fn play_tone(&mut self, tone: &Tone) -> Result<(), SinkError>;

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SinkError>;
}

/// Sink that silently drops every request
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn play_tone(&mut self, _tone: &Tone) -> Result<(), SinkError> {
        Ok(())
    }

    fn speak(&mut self, _utterance: &Utterance) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A side effect captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    Tone { tone: Tone },
    Speech { utterance: Utterance },
}

/// Sink that records every request in order.
///
/// Used by tests, by the CLI effect log and as the FFI effect queue.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    effects: Vec<Effect>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Take all recorded effects, leaving the sink empty
    pub fn drain(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Names of recorded tones, in order
    pub fn tone_names(&self) -> Vec<&str> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Tone { tone } => Some(tone.name.as_str()),
                Effect::Speech { .. } => None,
            })
            .collect()
    }

    /// Texts of recorded utterances, in order
    pub fn spoken(&self) -> Vec<&str> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Speech { utterance } => Some(utterance.text.as_str()),
                Effect::Tone { .. } => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }
}

impl AudioSink for RecordingSink {
    fn play_tone(&mut self, tone: &Tone) -> Result<(), SinkError> {
        self.effects.push(Effect::Tone { tone: tone.clone() });
        Ok(())
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SinkError> {
        self.effects.push(Effect::Speech {
            utterance: utterance.clone(),
        });
        Ok(())
    }
}

/// Play a tone, swallowing sink failures
pub(crate) fn play_best_effort(sink: &mut dyn AudioSink, tone: &Tone) {
    if let Err(e) = sink.play_tone(tone) {
        debug!("tone '{}' dropped: {}", tone.name, e);
    }
}

/// Speak an utterance, swallowing sink failures. Returns whether the sink accepted it.
pub(crate) fn speak_best_effort(sink: &mut dyn AudioSink, utterance: &Utterance) -> bool {
    match sink.speak(utterance) {
        Ok(()) => true,
        Err(e) => {
            debug!("utterance '{}' dropped: {}", utterance.text, e);
            false
        }
    }
}
