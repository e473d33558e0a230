//! Signal multiplication primitives.

/*
Multiplying Control Signals
===========================

Two kinds of buffers get multiplied in a synth group:

  gain values   Amplitude control, 0.0 to 1.0. An envelope buffer multiplied
                into a voice buffer shapes its loudness over time.

  pitch values  Frequency RATIOS, centred on 1.0. A value of 2.0 means one
                octave up, 0.5 one octave down.

Ratios compose by multiplication. If the group voice asks for a ratio of 1.5
and the unisono detune asks for 1.01, the child voice plays at

    1.5 × 1.01 = 1.515

which is the same as adding the two offsets in octaves. That is why the group
voice can stack its own pitch buffer, the detune multiplier and the FM buffer
onto a child's pitch buffer with nothing but in-place multiplies.


Why Clip Pitch Ratios
---------------------

In FM the modulator output is shifted by +1.0 and multiplied into the carrier
pitch. A modulator swinging past -1.0 would make the ratio zero or negative,
and a large modulation index can explode it. Downstream oscillators divide by
and accumulate these ratios, so the product is clamped to a small positive
range before rendering:

    ratio ∈ [1e-8, 1000]
*/

/// Multiply a signal by a modulator in-place.
#[inline]
pub fn multiply_in_place(signal: &mut [f32], modulator: &[f32]) {
    debug_assert_eq!(signal.len(), modulator.len());

    for (s, &m) in signal.iter_mut().zip(modulator.iter()) {
        *s *= m;
    }
}

/// Multiply a signal by a modulator and a constant factor in-place.
///
/// signal[i] = signal[i] × modulator[i] × scale
#[inline]
pub fn multiply_scaled_in_place(signal: &mut [f32], modulator: &[f32], scale: f32) {
    debug_assert_eq!(signal.len(), modulator.len());

    for (s, &m) in signal.iter_mut().zip(modulator.iter()) {
        *s *= m * scale;
    }
}

/// Multiply a signal by a constant gain factor in-place.
#[inline]
pub fn apply_gain(signal: &mut [f32], gain: f32) {
    if gain == 1.0 {
        return;
    }

    for sample in signal.iter_mut() {
        *sample *= gain;
    }
}

/// Add a constant to every sample in-place.
#[inline]
pub fn add_scalar(signal: &mut [f32], offset: f32) {
    for sample in signal.iter_mut() {
        *sample += offset;
    }
}

/// Clamp every sample into `[min, max]` in-place.
#[inline]
pub fn clip_in_place(signal: &mut [f32], min: f32, max: f32) {
    for sample in signal.iter_mut() {
        *sample = sample.clamp(min, max);
    }
}

/// Largest value in the buffer (signed, not magnitude). 0.0 for an empty buffer.
#[inline]
pub fn find_maximum(signal: &[f32]) -> f32 {
    signal
        .iter()
        .copied()
        .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
        .unwrap_or(0.0)
}

/// Largest absolute value in the buffer.
#[inline]
pub fn magnitude(signal: &[f32]) -> f32 {
    signal.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}
