//! `${NAME}` placeholder templates.
//!
//! Placeholders are resolved by name in a single left-to-right pass, so the result does not
//! depend on the order parameters were added and a substituted value is never scanned again.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("placeholder `${{{0}}}` has no value")]
    Unresolved(String),
    #[error("placeholder starting at byte {0} is not terminated")]
    Unterminated(usize),
    #[error("parameter `{0}` does not appear in the template")]
    Unused(String),
}

/// Named values for [`Template::render`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateParams {
    values: BTreeMap<&'static str, String>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &'static str, value: impl ToString) {
        self.values.insert(name, value.to_string());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Template {
    text: &'static str,
}

impl Template {
    pub const fn new(text: &'static str) -> Self {
        Self { text }
    }

    pub fn render(&self, params: &TemplateParams) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.text.len());
        let mut used = BTreeSet::new();
        let mut rest = self.text;
        let mut consumed = 0;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(TemplateError::Unterminated(consumed + start));
            };
            let name = &after[..end];
            let Some((key, value)) = params.values.get_key_value(name) else {
                return Err(TemplateError::Unresolved(name.to_string()));
            };
            out.push_str(value);
            used.insert(*key);

            let advance = start + 2 + end + 1;
            consumed += advance;
            rest = &rest[advance..];
        }
        out.push_str(rest);

        if let Some(unused) = params.values.keys().find(|k| !used.contains(*k)) {
            return Err(TemplateError::Unused(unused.to_string()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    const SAMPLE: Template = Template::new("${VERSION}\nint plane = ${PLANE};\nivec2(${OFFSET}) + ivec2(${OFFSET});\n");

    #[test]
    fn substitution_is_order_independent() {
        let a = TemplateParams::new()
            .with("VERSION", "#version 450 core")
            .with("PLANE", 0)
            .with("OFFSET", 16);
        let b = TemplateParams::new()
            .with("OFFSET", 16)
            .with("PLANE", 0)
            .with("VERSION", "#version 450 core");
        let rendered = SAMPLE.render(&a).unwrap();
        assert_eq!(rendered, SAMPLE.render(&b).unwrap());
        assert_eq!(
            rendered,
            "#version 450 core\nint plane = 0;\nivec2(16) + ivec2(16);\n"
        );
    }

    #[test]
    fn missing_value_is_an_error() {
        let params = TemplateParams::new().with("VERSION", "#version 450 core").with("PLANE", 1);
        assert_eq!(
            SAMPLE.render(&params),
            Err(TemplateError::Unresolved("OFFSET".to_string()))
        );
    }

    #[test]
    fn unused_parameter_is_an_error() {
        let params = TemplateParams::new()
            .with("VERSION", "#version 450 core")
            .with("PLANE", 1)
            .with("OFFSET", 0)
            .with("SAMPLER", "sampler2D");
        assert_eq!(
            SAMPLE.render(&params),
            Err(TemplateError::Unused("SAMPLER".to_string()))
        );
    }

    #[test]
    fn unterminated_placeholder_reports_its_position() {
        let template = Template::new("abc ${NAME");
        assert_eq!(
            template.render(&TemplateParams::new()),
            Err(TemplateError::Unterminated(4))
        );
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let template = Template::new("[${A}]");
        let params = TemplateParams::new().with("A", "${B}");
        assert_eq!(template.render(&params).unwrap(), "[${B}]");
    }

    proptest! {
        #[test]
        fn rendering_is_deterministic(value in "[ -~]{0,40}") {
            let template = Template::new("pre ${X} post");
            let params = TemplateParams::new().with("X", &value);
            let first = template.render(&params).unwrap();
            prop_assert_eq!(&first, &format!("pre {value} post"));
            prop_assert_eq!(first, template.render(&params.clone()).unwrap());
        }
    }
}
