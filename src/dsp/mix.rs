//! Accumulating signals into a shared bus.

/*
Summing Child Voices
====================

A group voice owns one stereo buffer. Every child voice it renders is ADDED
into that buffer with its own weight:

    bus_left[i]  += child_left[i]  × gain_left
    bus_right[i] += child_right[i] × gain_right

    gain_left  = unisono_gain × child_gain × child_balance_left × spread_left
    gain_right = unisono_gain × child_gain × child_balance_right × spread_right

The bus is cleared once at the start of the block, never between children.

Unisono stacking uses an equal-power weight, 1/√N, on every copy. N copies of
an uncorrelated (detuned, phase-offset) signal sum in power, so their total
loudness stays close to a single voice:

    N = 1  →  weight 1.000
    N = 2  →  weight 0.707
    N = 4  →  weight 0.500
    N = 9  →  weight 0.333

Summing can still exceed [-1.0, +1.0] when the copies happen to line up;
the group gain and the output stage deal with that.
*/

/// Add `src × gain` into `dst` in-place.
#[inline]
pub fn add_scaled(dst: &mut [f32], src: &[f32], gain: f32) {
    debug_assert_eq!(dst.len(), src.len());

    if gain == 0.0 {
        return;
    }

    for (d, &s) in dst.iter_mut().zip(src.iter()) {
        *d += s * gain;
    }
}

/// Add `src` into `dst` in-place without weighting.
#[inline]
pub fn sum_in_place(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());

    for (d, &s) in dst.iter_mut().zip(src.iter()) {
        *d += s;
    }
}

/// Accumulate a stereo pair into a stereo bus with independent channel gains.
#[inline]
pub fn accumulate_stereo(
    bus: [&mut [f32]; 2],
    src: [&[f32]; 2],
    gain_left: f32,
    gain_right: f32,
) {
    let [bus_left, bus_right] = bus;
    add_scaled(bus_left, src[0], gain_left);
    add_scaled(bus_right, src[1], gain_right);
}

/// Equal-power stacking weight for `num_copies` summed voices.
#[inline]
pub fn equal_power_weight(num_copies: usize) -> f32 {
    1.0 / (num_copies.max(1) as f32).sqrt()
}
