use super::{check_elements, check_len, Observation, OutcomeVerifier, Verdict};
use crate::format::{TexelFormat, IMAGE_TEXELS};
use crate::scenario::Validity;

/// Probe results are one `u32` per texel; 1 marks a texel where the probed value was found.
fn probe_found_everywhere(observation: &Observation) -> Verdict {
    if let Some(verdict) = check_len(&observation.data, IMAGE_TEXELS * 4) {
        return verdict;
    }
    check_elements(&observation.data, 4, |_, bytes| {
        let hit = bytemuck::pod_read_unaligned::<u32>(bytes);
        (hit != 1).then(|| (hit.to_string(), "1".to_string()))
    })
}

fn matches_image(format: TexelFormat, data: &[u8], expected: &[u8]) -> Verdict {
    if let Some(verdict) = check_len(data, expected.len()) {
        return verdict;
    }
    let size = format.bytes_per_texel();
    check_elements(data, size, |element, texel| {
        let want = &expected[element * size..(element + 1) * size];
        (!format.texels_match(texel, want)).then(|| (format.describe(texel), format.describe(want)))
    })
}

fn all_zero(format: TexelFormat, data: &[u8]) -> Verdict {
    if let Some(verdict) = check_len(data, IMAGE_TEXELS * format.bytes_per_texel()) {
        return verdict;
    }
    let expected = if format == TexelFormat::Rgba32f {
        "(0, 0, 0, 0 or 1)"
    } else {
        "0"
    };
    check_elements(data, format.bytes_per_texel(), |_, texel| {
        (!format.is_zero_texel(texel)).then(|| (format.describe(texel), expected.to_string()))
    })
}

/// Checks the image rendered from `texelFetch` results.
///
/// For the multisample format the observation is the output of the probe kernel, which already
/// looked for the expected value among the samples of each texel.
#[derive(Clone, Copy, Debug)]
pub struct TexelVerifier {
    format: TexelFormat,
}

impl TexelVerifier {
    pub fn new(format: TexelFormat) -> Self {
        Self { format }
    }
}

impl OutcomeVerifier for TexelVerifier {
    fn verify_valid(&self, observation: &Observation) -> Verdict {
        if self.format.is_multisample() {
            return probe_found_everywhere(observation);
        }
        matches_image(self.format, &observation.data, &self.format.pattern())
    }

    fn verify_invalid(&self, _validity: Validity, observation: &Observation) -> Verdict {
        if self.format.is_multisample() {
            return probe_found_everywhere(observation);
        }
        all_zero(self.format, &observation.data)
    }
}

/// Checks the destination of an image load/store copy.
#[derive(Clone, Copy, Debug)]
pub struct ImageVerifier {
    format: TexelFormat,
}

impl ImageVerifier {
    pub fn new(format: TexelFormat) -> Self {
        Self { format }
    }
}

impl OutcomeVerifier for ImageVerifier {
    fn verify_valid(&self, observation: &Observation) -> Verdict {
        if self.format.is_multisample() {
            return probe_found_everywhere(observation);
        }
        matches_image(self.format, &observation.data, &self.format.pattern())
    }

    fn verify_invalid(&self, validity: Validity, observation: &Observation) -> Verdict {
        if self.format.is_multisample() {
            return probe_found_everywhere(observation);
        }
        match validity {
            // Discarded stores leave the destination exactly as it was.
            Validity::DestinationInvalid => {
                let pattern;
                let before = match &observation.before {
                    Some(before) => before.as_slice(),
                    None => {
                        pattern = self.format.pattern();
                        pattern.as_slice()
                    }
                };
                if let Some(verdict) = check_len(&observation.data, before.len()) {
                    return verdict;
                }
                let size = self.format.bytes_per_texel();
                check_elements(&observation.data, size, |element, texel| {
                    let want = &before[element * size..(element + 1) * size];
                    (texel != want).then(|| (self.format.describe(texel), self.format.describe(want)))
                })
            }
            Validity::SourceInvalid | Validity::Valid => all_zero(self.format, &observation.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn probe(hits: &[u32]) -> Observation {
        Observation::new(bytemuck::cast_slice(hits).to_vec())
    }

    #[test]
    fn source_pattern_is_a_valid_fetch() {
        for format in TexelFormat::ALL.into_iter().filter(|f| !f.is_multisample()) {
            let observation = Observation::new(format.pattern());
            assert!(TexelVerifier::new(format).verify_valid(&observation).is_conformant(), "{format:?}");
        }
    }

    #[test]
    fn multisample_results_come_from_the_probe() {
        let verifier = TexelVerifier::new(TexelFormat::R32uiMultisample);
        assert!(verifier.verify_valid(&probe(&[1; IMAGE_TEXELS])).is_conformant());

        let mut hits = [1; IMAGE_TEXELS];
        hits[17] = 0;
        let Verdict::Violation(mismatch) = verifier.verify_invalid(Validity::SourceInvalid, &probe(&hits)) else {
            panic!("missed probe accepted");
        };
        assert_eq!((mismatch.element, mismatch.byte_offset), (17, 68));
    }

    #[test]
    fn float_zero_accepts_alpha_one() {
        let texels: Vec<f32> = (0..IMAGE_TEXELS).flat_map(|_| [0.0, 0.0, 0.0, 1.0]).collect();
        let observation = Observation::new(bytemuck::cast_slice(&texels).to_vec());
        assert!(TexelVerifier::new(TexelFormat::Rgba32f)
            .verify_invalid(Validity::SourceInvalid, &observation)
            .is_conformant());
    }

    #[test]
    fn discarded_store_must_leave_destination_untouched() {
        let verifier = ImageVerifier::new(TexelFormat::R8);
        let before = TexelFormat::R8.pattern();

        let untouched = Observation::new(before.clone()).with_before(before.clone());
        assert!(verifier
            .verify_invalid(Validity::DestinationInvalid, &untouched)
            .is_conformant());

        let mut written = before.clone();
        written[255] = 0;
        let observation = Observation::new(written).with_before(before);
        let Verdict::Violation(mismatch) = verifier.verify_invalid(Validity::DestinationInvalid, &observation) else {
            panic!("modified destination accepted");
        };
        assert_eq!(mismatch.element, 255);
        assert_eq!(mismatch.expected, "255");
    }

    #[test]
    fn short_read_back_is_a_violation() {
        let observation = Observation::new(vec![0; 10]);
        assert!(!ImageVerifier::new(TexelFormat::R8)
            .verify_invalid(Validity::SourceInvalid, &observation)
            .is_conformant());
    }

    proptest! {
        #[test]
        fn any_nonzero_texel_fails_the_zero_check(at in 0..IMAGE_TEXELS, value in 1u8..=255) {
            let mut data = vec![0u8; IMAGE_TEXELS];
            data[at] = value;
            let verdict = TexelVerifier::new(TexelFormat::R8)
                .verify_invalid(Validity::SourceInvalid, &Observation::new(data));
            let Verdict::Violation(mismatch) = verdict else {
                return Err(TestCaseError::fail("non-zero texel accepted"));
            };
            prop_assert_eq!(mismatch.element, at);
            prop_assert_eq!(mismatch.observed, value.to_string());
        }

        #[test]
        fn float_pattern_tolerates_small_error(at in 0..IMAGE_TEXELS * 4, error in -0.0009f32..0.0009) {
            let mut channels: Vec<f32> = TexelFormat::Rgba32f
                .pattern()
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect();
            channels[at] += error;
            let observation = Observation::new(bytemuck::cast_slice(&channels).to_vec());
            prop_assert!(TexelVerifier::new(TexelFormat::Rgba32f).verify_valid(&observation).is_conformant());
        }
    }
}
