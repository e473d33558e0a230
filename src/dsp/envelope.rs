use crate::MIN_TIME;

/*
Gain Envelope
=============

Every child voice and every group voice runs one of these. Its output is
the per-sample gain the voice is multiplied with, and its stage decides when
the voice is finished:

    is_active() == false   →  the voice can be handed back to the pool

That second job matters more than the shape. A group voice only resets once
its own envelope has gone idle (or a kill fade ran out), so the release
stage is what keeps a released note alive until it has faded.


Stages
------

    Idle ──note_on──▶ Attack ──1.0──▶ Decay ──S──▶ Sustain
                         │              │             │
                         └──note_off────┴─────────────┘
                                        ▼
                                     Release ──0.0──▶ Idle

  Attack    rises linearly from 0.0 to 1.0 over `attack` seconds
  Decay     falls linearly from 1.0 to the sustain level over `decay` seconds
  Sustain   holds the sustain level while the key is down
  Release   falls linearly from wherever it was to 0.0 over `release` seconds

note_off is accepted from any stage except Idle. The release starts at the
current level, so a note let go during the attack does not jump.


Per-sample step
---------------

    step = distance / (seconds × sample_rate)

At 48 kHz an attack of 5 ms is 240 samples, so the level grows by 1/240 per
sample. Times shorter than one sample are raised to one sample (MIN_TIME).

Release is not stepped. Its length in samples is fixed at note_off and the
level is interpolated from the snapshot, so it lands on exactly 0.0.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    sample_rate: f32,

    stage: EnvelopeState,
    level: f32,

    release_from: f32,
    release_length: u32,
    release_position: u32,
}

impl Envelope {
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(MIN_TIME),
            decay: decay.max(MIN_TIME),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(MIN_TIME),
            sample_rate: 44_100.0,

            stage: EnvelopeState::Idle,
            level: 0.0,
            release_from: 0.0,
            release_length: 1,
            release_position: 0,
        }
    }

    /// An envelope that opens instantly and closes within one sample.
    pub fn gate() -> Self {
        Self::adsr(0.0, 0.0, 1.0, 0.0)
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    pub fn note_on(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeState::Attack;
        self.release_position = 0;
    }

    pub fn note_off(&mut self) {
        if self.stage == EnvelopeState::Idle {
            return;
        }

        self.release_from = self.level;
        self.release_length = (self.release * self.sample_rate).round().max(1.0) as u32;
        self.release_position = 0;
        self.stage = EnvelopeState::Release;
    }

    /// Advance by one sample and return the new level.
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeState::Idle => self.level = 0.0,

            EnvelopeState::Attack => {
                self.level += 1.0 / (self.attack * self.sample_rate);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeState::Decay;
                }
            }

            EnvelopeState::Decay => {
                self.level -= (1.0 - self.sustain) / (self.decay * self.sample_rate);
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = EnvelopeState::Sustain;
                }
            }

            EnvelopeState::Sustain => self.level = self.sustain,

            EnvelopeState::Release => {
                let progress = self.release_position as f32 / self.release_length as f32;
                self.level = (self.release_from * (1.0 - progress)).max(0.0);
                self.release_position = self.release_position.saturating_add(1);

                if self.release_position >= self.release_length {
                    self.level = 0.0;
                    self.stage = EnvelopeState::Idle;
                }
            }
        }

        debug_assert!((0.0..=1.0).contains(&self.level));
        self.level
    }

    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample();
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeState::Idle
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeState::Idle;
        self.level = 0.0;
        self.release_from = 0.0;
        self.release_position = 0;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn state(&self) -> EnvelopeState {
        self.stage
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::adsr(0.005, 0.1, 0.8, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 1_000.0;

    fn envelope(attack: f32, decay: f32, sustain: f32, release: f32) -> Envelope {
        let mut env = Envelope::adsr(attack, decay, sustain, release);
        env.set_sample_rate(SAMPLE_RATE);
        env
    }

    fn advance(env: &mut Envelope, samples: usize) {
        for _ in 0..samples {
            env.next_sample();
        }
    }

    #[test]
    fn attack_then_sustain() {
        let mut env = envelope(0.01, 0.05, 0.6, 0.2);
        env.note_on();

        advance(&mut env, 10);
        assert!(env.level() > 0.99);

        advance(&mut env, 60);
        assert_eq!(env.state(), EnvelopeState::Sustain);
        assert!((env.level() - 0.6).abs() < 1e-4);
    }

    #[test]
    fn release_ends_idle() {
        let mut env = envelope(0.01, 0.05, 0.5, 0.03);
        env.note_on();
        advance(&mut env, 20);

        env.note_off();
        assert_eq!(env.state(), EnvelopeState::Release);
        advance(&mut env, 31);

        assert!(!env.is_active());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn note_off_while_idle_stays_idle() {
        let mut env = envelope(0.01, 0.05, 0.5, 0.03);
        env.note_off();
        assert_eq!(env.state(), EnvelopeState::Idle);
    }

    #[test]
    fn gate_is_open_after_one_sample() {
        let mut env = Envelope::gate();
        env.set_sample_rate(48_000.0);
        env.note_on();
        assert_eq!(env.next_sample(), 1.0);
    }
}
