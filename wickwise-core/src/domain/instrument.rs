//! Instrument metadata: pip size, pip value and lot constraints.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Pip and lot conventions for the traded symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Instrument {
    pub symbol: String,
    /// Smallest quoted price increment.
    pub pip_size: f64,
    /// Account currency value of one pip for one lot.
    pub pip_value: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub lot_step: f64,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".into(),
            pip_size: 0.0001,
            pip_value: 10.0,
            min_lot: 0.01,
            max_lot: 100.0,
            lot_step: 0.01,
        }
    }
}

impl Instrument {
    /// Absolute distance between two prices, in pips.
    pub fn pips_between(&self, a: f64, b: f64) -> f64 {
        (a - b).abs() / self.pip_size
    }

    /// Price distance covered by `pips` pips.
    pub fn pips_to_price(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }

    /// Round a volume to the lot step.
    pub fn round_lots(&self, lots: f64) -> f64 {
        let steps = (lots / self.lot_step).round();
        // strip float noise so 0.3 stays 0.3
        (steps * self.lot_step * 1e8).round() / 1e8
    }

    /// Position size for a given risk amount and stop distance.
    ///
    /// `risk_amount / (stop_pips × pip_value)`, rounded to the lot step and
    /// clamped to `[min_lot, max_lot]`.
    pub fn lot_size(&self, risk_amount: f64, stop_pips: f64) -> Result<f64, EngineError> {
        let divisor = stop_pips * self.pip_value;
        if !divisor.is_finite() || divisor <= 0.0 || !risk_amount.is_finite() {
            return Err(EngineError::DegenerateSizing {
                stop_pips,
                pip_value: self.pip_value,
            });
        }
        let lots = self.round_lots(risk_amount / divisor);
        Ok(lots.clamp(self.min_lot, self.max_lot))
    }

    /// Realized profit in account currency for a move of `signed_pips`.
    pub fn profit(&self, signed_pips: f64, volume: f64) -> f64 {
        signed_pips * volume * self.pip_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pip_distance_is_absolute() {
        let inst = Instrument::default();
        assert!((inst.pips_between(1.1020, 1.1000) - 20.0).abs() < 1e-9);
        assert!((inst.pips_between(1.1000, 1.1020) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn lot_size_from_risk() {
        let inst = Instrument::default();
        // 250 risk over 25 pips at 10 per pip -> 1 lot
        assert_eq!(inst.lot_size(250.0, 25.0).unwrap(), 1.0);
        // 100 risk over 30 pips -> 0.333.. -> 0.33
        assert_eq!(inst.lot_size(100.0, 30.0).unwrap(), 0.33);
    }

    #[test]
    fn lot_size_is_clamped() {
        let inst = Instrument::default();
        assert_eq!(inst.lot_size(0.01, 70.0).unwrap(), 0.01);
        assert_eq!(inst.lot_size(10_000_000.0, 1.0).unwrap(), 100.0);
    }

    #[test]
    fn zero_stop_distance_is_an_error() {
        let inst = Instrument::default();
        assert!(matches!(
            inst.lot_size(100.0, 0.0),
            Err(EngineError::DegenerateSizing { .. })
        ));
    }

    #[test]
    fn round_lots_to_step() {
        let inst = Instrument::default();
        assert_eq!(inst.round_lots(0.304), 0.3);
        assert_eq!(inst.round_lots(0.305_1), 0.31);
    }
}
