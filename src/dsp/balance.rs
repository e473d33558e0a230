//! Constant-power balance law.
//!
//! Balance runs from -100 (hard left) through 0 (centre) to +100 (hard right).
//! The position is mapped onto a quarter circle so that left² + right² stays
//! constant, then scaled by √2 so the centre position is unity on both sides:
//!
//!   angle = π/4 × (balance/100 + 1)
//!   left  = √2 × cos(angle)
//!   right = √2 × sin(angle)

use std::f32::consts::{FRAC_PI_4, SQRT_2};

/// Gain factor for one side at the given balance position.
#[inline]
pub fn gain_factor_for_balance(balance: f32, right_channel: bool) -> f32 {
    if balance == 0.0 {
        return 1.0;
    }

    let position = (balance / 100.0).clamp(-1.0, 1.0);
    let angle = FRAC_PI_4 * (position + 1.0);

    if right_channel {
        SQRT_2 * angle.sin()
    } else {
        SQRT_2 * angle.cos()
    }
}

/// Both gain factors at once: `(left, right)`.
#[inline]
pub fn stereo_gains(balance: f32) -> (f32, f32) {
    (
        gain_factor_for_balance(balance, false),
        gain_factor_for_balance(balance, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_is_unity() {
        assert_eq!(stereo_gains(0.0), (1.0, 1.0));
    }

    #[test]
    fn hard_left_and_right() {
        let (l, r) = stereo_gains(-100.0);
        assert!((l - SQRT_2).abs() < 1e-5);
        assert!(r.abs() < 1e-5);

        let (l, r) = stereo_gains(100.0);
        assert!(l.abs() < 1e-5);
        assert!((r - SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn power_is_constant() {
        for balance in [-80.0, -30.0, 10.0, 55.0, 99.0] {
            let (l, r) = stereo_gains(balance);
            assert!((l * l + r * r - 2.0).abs() < 1e-4, "balance {balance}");
        }
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(stereo_gains(-400.0), stereo_gains(-100.0));
    }
}
