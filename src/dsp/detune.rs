//! Unisono detune and stereo spread.

/*
Unisono Voice Spreading
=======================

Unisono layers N copies of the same voice. Each copy k (0..N) is pushed to a
different pitch and stereo position so the stack sounds wide instead of
simply louder.

Vocabulary
----------

  detune      Maximum pitch offset of the outermost copies, in octaves.
  spread      Maximum stereo offset of the outermost copies, 0.0 to 1.0.
  mod values  Per-block modulation of detune and spread (from the group's
              detune/spread chains). 1.0 means "full amount".


Index Mapping
-------------

Copies are spaced evenly between -1 and +1:

    normalized = k / (N - 1)          0 ... 1
    signed     = 2 × normalized - 1  -1 ... +1

    N = 4:   k = 0    1      2      3
             s = -1  -1/3   +1/3   +1

The outer copies receive the full offset, the inner ones a fraction of it.


Pitch
-----

    octaves    = detune × signed × detune_mod
    multiplier = 2^octaves

A detune of 0.1 octaves gives the lowest copy a ratio of 2^-0.1 ≈ 0.933 and
the highest 2^0.1 ≈ 1.072.


Stereo
------

    balance = signed × 100 × spread × spread_mod      (-100 ... +100)

fed through the constant-power balance law (see `dsp::balance`).


Gain
----

Every copy is weighted 1/√N (equal-power stacking, see `dsp::mix`).

With N = 1 none of this applies: gain, multiplier and balances are all 1.0.

These values depend on the modulation inputs, so they are recomputed every
block for every slot. Nothing here is cached across blocks.
*/

use crate::dsp::{balance::gain_factor_for_balance, mix::equal_power_weight, pitch::octaves_to_ratio};

/// Per-block detune record for one unisono slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetuneValues {
    /// Equal-power stacking weight, 1/√N
    pub gain_factor: f32,
    /// Pitch ratio for this copy
    pub multiplier: f32,
    pub balance_left: f32,
    pub balance_right: f32,
    pub detune_mod_value: f32,
    pub spread_mod_value: f32,
}

impl Default for DetuneValues {
    fn default() -> Self {
        Self {
            gain_factor: 1.0,
            multiplier: 1.0,
            balance_left: 1.0,
            balance_right: 1.0,
            detune_mod_value: 1.0,
            spread_mod_value: 1.0,
        }
    }
}

impl DetuneValues {
    /// Compute the record for copy `index` of `num_voices`.
    ///
    /// `index` is reduced modulo `num_voices`, so a global slot index
    /// (`voice_index × N + i`) can be passed directly.
    pub fn compute(
        num_voices: usize,
        index: usize,
        detune: f32,
        spread: f32,
        detune_mod: f32,
        spread_mod: f32,
    ) -> Self {
        if num_voices <= 1 {
            return Self {
                detune_mod_value: detune_mod,
                spread_mod_value: spread_mod,
                ..Self::default()
            };
        }

        let signed = Self::signed_index(num_voices, index);

        let octaves = detune * signed * detune_mod;
        let balance = signed * 100.0 * spread * spread_mod;

        Self {
            gain_factor: equal_power_weight(num_voices),
            multiplier: octaves_to_ratio(octaves),
            balance_left: gain_factor_for_balance(balance, false),
            balance_right: gain_factor_for_balance(balance, true),
            detune_mod_value: detune_mod,
            spread_mod_value: spread_mod,
        }
    }

    /// Position of copy `index` in -1..=1. 0.0 for a single voice.
    pub fn signed_index(num_voices: usize, index: usize) -> f32 {
        if num_voices <= 1 {
            return 0.0;
        }
        let k = index % num_voices;
        let normalized = k as f32 / (num_voices - 1) as f32;
        normalized * 2.0 - 1.0
    }

    /// Combined stacking weight and balance for one side.
    #[inline]
    pub fn gain_factor_for(&self, right_channel: bool) -> f32 {
        if right_channel {
            self.gain_factor * self.balance_right
        } else {
            self.gain_factor * self.balance_left
        }
    }
}
