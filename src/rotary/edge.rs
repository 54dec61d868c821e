//! Level-to-edge conversion for the auxiliary switches

/// Remembers the last sampled level of one digital line and reports a press
/// only on the transition into the active level
///
/// The switches on the encoder board pull up, so the default active level is
/// low and the line is assumed released before the first sample.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    active_level: bool,
    last_level: bool,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::active_low()
    }
}

impl EdgeDetector {
    pub fn active_low() -> Self {
        Self {
            active_level: false,
            last_level: true,
        }
    }

    pub fn active_high() -> Self {
        Self {
            active_level: true,
            last_level: false,
        }
    }

    /// Feeds one sampled level; `true` when this sample is a press
    pub fn update(&mut self, level: bool) -> bool {
        let pressed = self.last_level != self.active_level && level == self.active_level;
        self.last_level = level;
        pressed
    }

    pub fn last_level(&self) -> bool {
        self.last_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presses(detector: &mut EdgeDetector, levels: &[bool]) -> usize {
        levels.iter().filter(|l| detector.update(**l)).count()
    }

    #[test]
    fn single_press_for_high_high_low_low_high() {
        let mut detector = EdgeDetector::active_low();
        assert_eq!(presses(&mut detector, &[true, true, false, false, true]), 1);
    }

    #[test]
    fn release_and_hold_do_not_fire() {
        let mut detector = EdgeDetector::active_low();
        assert!(detector.update(false));
        assert!(!detector.update(false));
        assert!(!detector.update(true));
        assert!(!detector.update(true));
    }

    #[test]
    fn each_falling_edge_counts() {
        let mut detector = EdgeDetector::default();
        assert_eq!(
            presses(&mut detector, &[false, true, false, true, false]),
            3
        );
    }

    #[test]
    fn active_high_fires_on_rising_edge() {
        let mut detector = EdgeDetector::active_high();
        assert_eq!(presses(&mut detector, &[false, true, true, false]), 1);
        assert!(!detector.last_level());
    }
}
