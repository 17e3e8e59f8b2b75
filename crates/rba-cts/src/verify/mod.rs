//! Permitted-outcome predicates.
//!
//! A robust implementation has some freedom in what an out-of-bounds access produces, so most
//! checks accept a set of values rather than one. A verifier never fails with an error: it either
//! accepts the observation or reports the first element outside the permitted set.

mod buffer;
mod marker;
mod texel;

use std::fmt;

pub use buffer::{StorageVerifier, UniformVerifier};
pub use marker::MarkerVerifier;
pub use texel::{ImageVerifier, TexelVerifier};

use crate::scenario::Validity;

/// Data read back after one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    pub data: Vec<u8>,
    /// Contents of the written resource right before the run, when the fixture captured them.
    pub before: Option<Vec<u8>>,
}

impl Observation {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, before: None }
    }

    pub fn with_before(mut self, before: Vec<u8>) -> Self {
        self.before = Some(before);
        self
    }
}

/// First element of an observation outside the permitted set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub element: usize,
    pub byte_offset: usize,
    pub observed: String,
    pub expected: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "element {} (byte {}): got {}, expected {}",
            self.element, self.byte_offset, self.observed, self.expected
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Conformant,
    Violation(Mismatch),
}

impl Verdict {
    pub fn is_conformant(&self) -> bool {
        matches!(self, Self::Conformant)
    }
}

pub trait OutcomeVerifier {
    fn verify_valid(&self, observation: &Observation) -> Verdict;
    fn verify_invalid(&self, validity: Validity, observation: &Observation) -> Verdict;
}

/// Walks `data` in `element_size` chunks and reports the first chunk `check` rejects.
///
/// `check` returns the `(observed, expected)` descriptions of a rejected element. Trailing bytes
/// that do not fill a whole element count as a rejected element.
pub(crate) fn check_elements<F>(data: &[u8], element_size: usize, mut check: F) -> Verdict
where
    F: FnMut(usize, &[u8]) -> Option<(String, String)>,
{
    let chunks = data.chunks_exact(element_size);
    let tail = chunks.remainder();
    for (element, bytes) in chunks.enumerate() {
        if let Some((observed, expected)) = check(element, bytes) {
            return Verdict::Violation(Mismatch {
                element,
                byte_offset: element * element_size,
                observed,
                expected,
            });
        }
    }
    if !tail.is_empty() {
        let element = data.len() / element_size;
        return Verdict::Violation(Mismatch {
            element,
            byte_offset: element * element_size,
            observed: format!("{} trailing bytes", tail.len()),
            expected: "whole elements".to_string(),
        });
    }
    Verdict::Conformant
}

/// Reports a length mismatch before any element is compared.
pub(crate) fn check_len(data: &[u8], expected: usize) -> Option<Verdict> {
    (data.len() != expected).then(|| {
        Verdict::Violation(Mismatch {
            element: 0,
            byte_offset: 0,
            observed: format!("{} bytes", data.len()),
            expected: format!("{expected} bytes"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_rejected_element_is_reported() {
        let data = [0u8, 0, 7, 0, 9, 0];
        let verdict = check_elements(&data, 2, |_, bytes| {
            (bytes[0] != 0).then(|| (bytes[0].to_string(), "0".to_string()))
        });
        assert_eq!(
            verdict,
            Verdict::Violation(Mismatch {
                element: 1,
                byte_offset: 2,
                observed: "7".to_string(),
                expected: "0".to_string(),
            })
        );
    }

    #[test]
    fn partial_element_is_a_violation() {
        let verdict = check_elements(&[0u8; 5], 4, |_, _| None);
        assert!(!verdict.is_conformant());
    }

    #[test]
    fn mismatch_display_names_the_offset() {
        let mismatch = Mismatch {
            element: 3,
            byte_offset: 12,
            observed: "7".to_string(),
            expected: "one of {0, 2, 3, 4, 5}".to_string(),
        };
        assert_eq!(mismatch.to_string(), "element 3 (byte 12): got 7, expected one of {0, 2, 3, 4, 5}");
    }
}
