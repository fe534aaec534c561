//! Monetary helpers.
//!
//! Amounts are plain `f64` values carrying at most two meaningful decimals.
//! Every comparison against a stored total goes through the cent tolerance;
//! every amount that is persisted or hashed goes through [`round2`] first.

/// One cent: the tolerance used when comparing monetary amounts.
pub const CENT: f64 = 0.01;

/// Round an amount to two decimals (`round(x * 100) / 100`).
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// True when two amounts agree at cent granularity.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < CENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_truncates_to_cents() {
        assert_eq!(round2(10.006), 10.01);
        assert_eq!(round2(10.004), 10.0);
        assert_eq!(round2(-30.006), -30.01);
        assert_eq!(round2(0.1 + 0.2), 0.3);
    }

    #[test]
    fn approx_eq_tolerates_sub_cent_noise() {
        assert!(approx_eq(10.0, 10.0 + 0.001));
        assert!(!approx_eq(10.0, 10.02));
    }
}
