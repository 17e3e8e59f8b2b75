use super::{check_elements, check_len, Observation, OutcomeVerifier, Verdict};
use crate::scenario::Validity;

/// Elements copied by the buffer kernels.
const ELEMENTS: usize = 4;

fn element(bytes: &[u8]) -> f32 {
    bytemuck::pod_read_unaligned(bytes)
}

fn describe_set(values: impl IntoIterator<Item = f32>) -> String {
    let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
    format!("one of {{{}}}", values.join(", "))
}

/// Compares the destination element by element against `expected`.
fn equals(data: &[u8], expected: [f32; ELEMENTS]) -> Verdict {
    if let Some(verdict) = check_len(data, ELEMENTS * 4) {
        return verdict;
    }
    check_elements(data, 4, |i, bytes| {
        let value = element(bytes);
        (value != expected[i]).then(|| (value.to_string(), expected[i].to_string()))
    })
}

/// Destination of the storage-to-storage copy.
///
/// Without extended robustness an out-of-bounds read must return exactly zero and an
/// out-of-bounds write must be discarded. With it, a read may also return any value from inside
/// the source buffer and a write may land anywhere inside the destination buffer, so each element
/// may hold its original value or any source value.
#[derive(Clone, Copy, Debug)]
pub struct StorageVerifier {
    extended: bool,
    source: [f32; ELEMENTS],
    destination: [f32; ELEMENTS],
}

impl StorageVerifier {
    pub fn new(extended: bool, source: [f32; ELEMENTS], destination: [f32; ELEMENTS]) -> Self {
        Self {
            extended,
            source,
            destination,
        }
    }
}

impl OutcomeVerifier for StorageVerifier {
    fn verify_valid(&self, observation: &Observation) -> Verdict {
        equals(&observation.data, self.source)
    }

    fn verify_invalid(&self, validity: Validity, observation: &Observation) -> Verdict {
        let data = &observation.data;
        match (validity, self.extended) {
            (Validity::Valid, _) => self.verify_valid(observation),
            (Validity::SourceInvalid, false) => equals(data, [0.0; ELEMENTS]),
            (Validity::DestinationInvalid, false) => equals(data, self.destination),
            (Validity::SourceInvalid, true) => {
                if let Some(verdict) = check_len(data, ELEMENTS * 4) {
                    return verdict;
                }
                check_elements(data, 4, |_, bytes| {
                    let value = element(bytes);
                    let permitted = value == 0.0 || self.source.contains(&value);
                    (!permitted).then(|| {
                        let set = std::iter::once(0.0).chain(self.source);
                        (value.to_string(), describe_set(set))
                    })
                })
            }
            (Validity::DestinationInvalid, true) => {
                if let Some(verdict) = check_len(data, ELEMENTS * 4) {
                    return verdict;
                }
                check_elements(data, 4, |i, bytes| {
                    let value = element(bytes);
                    let permitted = value == self.destination[i] || self.source.contains(&value);
                    (!permitted).then(|| {
                        let set = std::iter::once(self.destination[i]).chain(self.source);
                        (value.to_string(), describe_set(set))
                    })
                })
            }
        }
    }
}

/// Destination of the uniform-to-storage copy. Only the uniform read can be out of bounds, and it
/// must return zero.
#[derive(Clone, Copy, Debug)]
pub struct UniformVerifier {
    expected: [f32; ELEMENTS],
}

impl UniformVerifier {
    pub fn new(expected: [f32; ELEMENTS]) -> Self {
        Self { expected }
    }
}

impl OutcomeVerifier for UniformVerifier {
    fn verify_valid(&self, observation: &Observation) -> Verdict {
        equals(&observation.data, self.expected)
    }

    fn verify_invalid(&self, _validity: Validity, observation: &Observation) -> Verdict {
        equals(&observation.data, [0.0; ELEMENTS])
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    const SOURCE: [f32; 4] = [2.0, 3.0, 4.0, 5.0];
    const DESTINATION: [f32; 4] = [1.0; 4];

    fn observe(values: [f32; 4]) -> Observation {
        Observation::new(bytemuck::cast_slice(&values).to_vec())
    }

    #[test]
    fn baseline_robustness_requires_exact_results() {
        let verifier = StorageVerifier::new(false, SOURCE, DESTINATION);
        assert!(verifier.verify_valid(&observe(SOURCE)).is_conformant());
        assert!(verifier
            .verify_invalid(Validity::SourceInvalid, &observe([0.0; 4]))
            .is_conformant());
        assert!(verifier
            .verify_invalid(Validity::DestinationInvalid, &observe(DESTINATION))
            .is_conformant());

        let Verdict::Violation(mismatch) = verifier.verify_invalid(Validity::SourceInvalid, &observe([0.0, 0.0, 5.0, 0.0]))
        else {
            panic!("clamped read accepted");
        };
        assert_eq!((mismatch.element, mismatch.byte_offset), (2, 8));
        assert_eq!(mismatch.observed, "5");
        assert_eq!(mismatch.expected, "0");
    }

    #[test]
    fn extended_robustness_accepts_in_buffer_values() {
        let verifier = StorageVerifier::new(true, SOURCE, DESTINATION);
        assert!(verifier
            .verify_invalid(Validity::SourceInvalid, &observe([0.0, 3.0, 5.0, 0.0]))
            .is_conformant());
        assert!(verifier
            .verify_invalid(Validity::DestinationInvalid, &observe([1.0, 2.0, 1.0, 5.0]))
            .is_conformant());
    }

    #[test]
    fn extended_robustness_rejects_foreign_values() {
        let verifier = StorageVerifier::new(true, SOURCE, DESTINATION);
        let Verdict::Violation(mismatch) = verifier.verify_invalid(Validity::SourceInvalid, &observe([0.0, 7.0, 0.0, 0.0]))
        else {
            panic!("value from outside the source accepted");
        };
        assert_eq!(mismatch.element, 1);
        assert_eq!(mismatch.expected, "one of {0, 2, 3, 4, 5}");

        assert!(!verifier
            .verify_invalid(Validity::DestinationInvalid, &observe([1.0, 1.0, 0.0, 1.0]))
            .is_conformant());
    }

    #[test]
    fn uniform_reads_must_be_zero() {
        let verifier = UniformVerifier::new(SOURCE);
        assert!(verifier.verify_valid(&observe(SOURCE)).is_conformant());
        assert!(verifier
            .verify_invalid(Validity::SourceInvalid, &observe([0.0; 4]))
            .is_conformant());
        assert!(!verifier
            .verify_invalid(Validity::SourceInvalid, &observe([5.0; 4]))
            .is_conformant());
    }

    fn permitted_read() -> impl Strategy<Value = f32> {
        prop::sample::select(vec![0.0f32, 2.0, 3.0, 4.0, 5.0])
    }

    proptest! {
        #[test]
        fn any_mix_of_zero_and_source_values_is_a_permitted_read(values in prop::array::uniform4(permitted_read())) {
            let verifier = StorageVerifier::new(true, SOURCE, DESTINATION);
            prop_assert!(verifier.verify_invalid(Validity::SourceInvalid, &observe(values)).is_conformant());
        }

        #[test]
        fn strict_read_rejects_every_nonzero_value(at in 0usize..4, value in permitted_read()) {
            prop_assume!(value != 0.0);
            let mut values = [0.0; 4];
            values[at] = value;
            let verifier = StorageVerifier::new(false, SOURCE, DESTINATION);
            let verdict = verifier.verify_invalid(Validity::SourceInvalid, &observe(values));
            prop_assert!(matches!(verdict, Verdict::Violation(ref m) if m.element == at));
        }

        #[test]
        fn permitted_write_keeps_original_or_source_values(
            keep in prop::array::uniform4(any::<bool>()),
            values in prop::array::uniform4(prop::sample::select(SOURCE.to_vec())),
        ) {
            let mut observed = [0.0; 4];
            for i in 0..4 {
                observed[i] = if keep[i] { DESTINATION[i] } else { values[i] };
            }
            let verifier = StorageVerifier::new(true, SOURCE, DESTINATION);
            prop_assert!(verifier.verify_invalid(Validity::DestinationInvalid, &observe(observed)).is_conformant());
        }
    }
}
