//! The test group and its five tests.

use crate::scenario::Mechanism;

pub const GROUP_NAME: &str = "robust_buffer_access_behavior";
pub const GROUP_DESCRIPTION: &str = "Verifies \"robust buffer access behavior\" functionality";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestEntry {
    pub mechanism: Mechanism,
    pub description: &'static str,
}

impl TestEntry {
    pub fn name(&self) -> &'static str {
        self.mechanism.name()
    }
}

/// Registration order is execution order.
pub const TESTS: [TestEntry; 5] = [
    TestEntry {
        mechanism: Mechanism::VertexBufferObjects,
        description: "Verifies that out-of-bound reads from VB result in zero",
    },
    TestEntry {
        mechanism: Mechanism::TexelFetch,
        description: "Verifies that out-of-bound fetches from texture result in zero",
    },
    TestEntry {
        mechanism: Mechanism::ImageLoadStore,
        description: "Verifies that out-of-bound to image result in zero or is discarded",
    },
    TestEntry {
        mechanism: Mechanism::StorageBuffer,
        description: "Verifies that out-of-bound access to SSBO is discarded or results in 0",
    },
    TestEntry {
        mechanism: Mechanism::UniformBuffer,
        description: "Verifies that out-of-bound access to UBO results in 0",
    },
];

/// Tests whose name contains any of `terms` (case-insensitive). No terms selects everything.
pub fn select(terms: &[String]) -> Vec<TestEntry> {
    if terms.is_empty() {
        return TESTS.to_vec();
    }
    TESTS
        .iter()
        .filter(|entry| {
            let name = entry.name();
            terms
                .iter()
                .any(|term| name.contains(term.to_ascii_lowercase().as_str()))
        })
        .copied()
        .collect()
}

pub fn find(name: &str) -> Option<TestEntry> {
    TESTS.iter().find(|entry| entry.name() == name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_order_is_fixed() {
        let names: Vec<&str> = TESTS.iter().map(TestEntry::name).collect();
        assert_eq!(
            names,
            [
                "vertex_buffer_objects",
                "texel_fetch",
                "image_load_store",
                "storage_buffer",
                "uniform_buffer"
            ]
        );
    }

    #[test]
    fn selection_matches_substrings() {
        assert_eq!(select(&[]).len(), 5);
        let buffers = select(&["BUFFER".to_string()]);
        assert_eq!(
            buffers.iter().map(TestEntry::name).collect::<Vec<_>>(),
            ["vertex_buffer_objects", "storage_buffer", "uniform_buffer"]
        );
        assert!(select(&["geometry".to_string()]).is_empty());
    }

    #[test]
    fn find_by_exact_name() {
        assert_eq!(find("texel_fetch").map(|e| e.mechanism), Some(Mechanism::TexelFetch));
        assert_eq!(find("texel"), None);
    }
}
