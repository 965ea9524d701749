/// Schmitt-trigger switch for the adaptive gain
///
/// The gain grows while `|sigma|` stays above the band and freezes once it
/// falls to `epsilon_off`. Between the two thresholds the previous mode is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Hysteresis {
    epsilon_on: f64,
    epsilon_off: f64,
    active: bool,
}

impl Hysteresis {
    /// Creates an inactive switch; requires `epsilon_on > epsilon_off`
    pub fn new(epsilon_on: f64, epsilon_off: f64) -> Self {
        Hysteresis {
            epsilon_on,
            epsilon_off,
            active: false,
        }
    }

    /// Moves the thresholds, keeping the current mode
    pub fn set_thresholds(&mut self, epsilon_on: f64, epsilon_off: f64) {
        self.epsilon_on = epsilon_on;
        self.epsilon_off = epsilon_off;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = false;
    }

    /// Feeds one error sample and returns the gain rate for this step
    pub fn rate(&mut self, sigma: f64, eta: f64) -> f64 {
        let magnitude = sigma.abs();
        if self.active {
            if magnitude <= self.epsilon_off {
                self.active = false;
            }
        } else if magnitude > self.epsilon_on {
            self.active = true;
        }

        if self.active {
            eta
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_on_and_off() {
        let mut h = Hysteresis::new(0.05, 0.01);
        assert!(!h.is_active());

        assert_eq!(h.rate(0.06, 2.0), 2.0);
        assert!(h.is_active());

        assert_eq!(h.rate(-0.005, 2.0), 0.0);
        assert!(!h.is_active());
    }

    #[test]
    fn test_band_keeps_previous_mode() {
        let mut h = Hysteresis::new(0.05, 0.01);
        // Inside the band while inactive: stays frozen
        assert_eq!(h.rate(0.03, 1.0), 0.0);
        assert!(!h.is_active());

        h.rate(0.1, 1.0);
        // Inside the band while active: keeps growing
        assert_eq!(h.rate(0.03, 1.0), 1.0);
        assert!(h.is_active());
    }

    #[test]
    fn test_thresholds_are_strict_on_and_inclusive_off() {
        let mut h = Hysteresis::new(0.05, 0.01);
        assert_eq!(h.rate(0.05, 1.0), 0.0);
        h.rate(0.2, 1.0);
        assert_eq!(h.rate(0.01, 1.0), 0.0);
        assert!(!h.is_active());
    }
}
