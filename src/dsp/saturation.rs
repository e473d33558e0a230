//! Soft saturation.
//!
//! x / (1 + |x|) is a cheap, smooth waveshaper. Below ±0.1 it is almost
//! linear; loud peaks are squeezed toward ±1 without ever reaching it.
//! `drive` pushes the signal further into the curve, `mix` blends the shaped
//! signal with the dry input.

/// Soft-clip one sample.
#[inline]
pub fn soft_clip(sample: f32, drive: f32) -> f32 {
    let x = sample * drive;
    x / (1.0 + x.abs())
}

/// Soft-clip a buffer in place, blended with the dry signal.
pub fn saturate_buffer(buffer: &mut [f32], drive: f32, mix: f32) {
    let mix = mix.clamp(0.0, 1.0);
    if mix == 0.0 {
        return;
    }

    for sample in buffer.iter_mut() {
        let wet = soft_clip(*sample, drive);
        *sample = *sample * (1.0 - mix) + wet * mix;
    }
}
