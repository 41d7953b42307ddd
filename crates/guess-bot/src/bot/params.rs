/// Tunable constants shared by the decision skeleton.
///
/// Each strategy ships one fixed set; they are not learned or persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotParams {
    pub confidence: ConfidenceParams,
    pub guess: GuessThresholds,
}

impl BotParams {
    pub const BALANCED_STRICT: BotParams = BotParams {
        confidence: ConfidenceParams {
            base: 0.25,
            slope: 2.0,
        },
        guess: GuessThresholds {
            pair_min_step: 1,
            confidence_floor: 0.80,
            confident_min_step: 2,
        },
    };

    pub const MINIMAX: BotParams = BotParams {
        confidence: ConfidenceParams {
            base: 0.20,
            slope: 2.2,
        },
        guess: GuessThresholds {
            pair_min_step: 2,
            confidence_floor: 0.90,
            confident_min_step: 3,
        },
    };
}

/// `confidence = score × clamp(base + slope / max(1, candidates), 0, 1)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceParams {
    pub base: f64,
    pub slope: f64,
}

impl ConfidenceParams {
    /// Multiplier applied to the best score; grows as the candidate set shrinks.
    pub fn factor(self, candidates: usize) -> f64 {
        let cand_factor = 1.0 / candidates.max(1) as f64;
        (self.base + self.slope * cand_factor).clamp(0.0, 1.0)
    }
}

/// When to stop asking and commit to the best candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuessThresholds {
    /// Guess between the last two candidates once this many turns have passed.
    pub pair_min_step: u32,
    pub confidence_floor: f64,
    /// Earliest turn a confidence-triggered guess may fire.
    pub confident_min_step: u32,
}

impl GuessThresholds {
    pub fn should_guess(
        self,
        candidates: usize,
        step: u32,
        confidence: f64,
        best_id: &str,
        last_guess_id: Option<&str>,
    ) -> bool {
        if candidates <= 2 && step >= self.pair_min_step {
            return true;
        }
        // never repeat the guess that was just rejected
        confidence >= self.confidence_floor
            && step >= self.confident_min_step
            && last_guess_id != Some(best_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_factor_is_clamped() {
        let params = BotParams::BALANCED_STRICT.confidence;
        assert_eq!(params.factor(2), 1.0);
        assert!((params.factor(8) - 0.5).abs() < 1e-12);
        assert!((params.factor(0) - 1.0).abs() < 1e-12);

        let minimax = BotParams::MINIMAX.confidence;
        assert!((minimax.factor(4) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn pair_rule_waits_for_step() {
        let guess = BotParams::MINIMAX.guess;
        assert!(!guess.should_guess(2, 1, 0.0, "a", None));
        assert!(guess.should_guess(2, 2, 0.0, "a", None));
    }

    #[test]
    fn confident_guess_skips_last_rejected() {
        let guess = BotParams::BALANCED_STRICT.guess;
        assert!(guess.should_guess(5, 2, 0.85, "a", Some("b")));
        assert!(!guess.should_guess(5, 2, 0.85, "a", Some("a")));
        assert!(!guess.should_guess(5, 1, 0.99, "a", None));
        assert!(!guess.should_guess(5, 4, 0.79, "a", None));
    }
}
