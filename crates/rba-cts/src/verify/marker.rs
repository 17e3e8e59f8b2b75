use super::{check_elements, Observation, OutcomeVerifier, Verdict};
use crate::scenario::Validity;

/// Checks a single-channel 8-bit render target for the value the fragment stage writes.
///
/// A valid draw covers every pixel. An invalid draw must not reach any pixel: out-of-bounds
/// vertices read as `(0, 0, 0, 0)`, and a primitive with a zero `w` produces no fragments.
#[derive(Clone, Copy, Debug)]
pub struct MarkerVerifier {
    marker: u8,
}

impl MarkerVerifier {
    pub fn new(marker: u8) -> Self {
        Self { marker }
    }
}

impl OutcomeVerifier for MarkerVerifier {
    fn verify_valid(&self, observation: &Observation) -> Verdict {
        check_elements(&observation.data, 1, |_, pixel| {
            (pixel[0] != self.marker).then(|| (pixel[0].to_string(), self.marker.to_string()))
        })
    }

    fn verify_invalid(&self, _validity: Validity, observation: &Observation) -> Verdict {
        check_elements(&observation.data, 1, |_, pixel| {
            (pixel[0] == self.marker).then(|| (pixel[0].to_string(), format!("anything but {}", self.marker)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_draw_must_cover_every_pixel() {
        let verifier = MarkerVerifier::new(255);
        assert!(verifier.verify_valid(&Observation::new(vec![255; 64])).is_conformant());

        let mut partial = vec![255; 64];
        partial[9] = 128;
        let Verdict::Violation(mismatch) = verifier.verify_valid(&Observation::new(partial)) else {
            panic!("uncovered pixel accepted");
        };
        assert_eq!(mismatch.element, 9);
        assert_eq!(mismatch.observed, "128");
    }

    #[test]
    fn invalid_draw_must_not_reach_any_pixel() {
        let verifier = MarkerVerifier::new(255);
        assert!(verifier
            .verify_invalid(Validity::SourceInvalid, &Observation::new(vec![128; 64]))
            .is_conformant());

        let mut touched = vec![128; 64];
        touched[63] = 255;
        assert!(!verifier
            .verify_invalid(Validity::SourceInvalid, &Observation::new(touched))
            .is_conformant());
    }
}
