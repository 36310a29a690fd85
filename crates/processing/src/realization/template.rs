//! `{name}` placeholder templates
//!
//! `{{` and `}}` are literal braces. Every placeholder must have a value;
//! values that are never used are ignored.

use std::collections::BTreeMap;
use std::fmt::Display;

use ngprep_core::{Error, Result};

pub const CFE_TEMPLATE: &str = include_str!("../../templates/cfe.ini");
pub const NOAHOWP_TEMPLATE: &str = include_str!("../../templates/noahowp.namelist.input");
pub const TROUTE_TEMPLATE: &str = include_str!("../../templates/troute.yaml");
pub const REALIZATION_TEMPLATE: &str = include_str!("../../templates/realization.json");
pub const CALIBRATION_TEMPLATE: &str = include_str!("../../templates/ngen_cal_conf.yaml");

/// Placeholder values for one rendering
#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    values: BTreeMap<String, String>,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Display) -> &mut Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Substitute every `{name}` in `template`
pub fn render(template: &str, values: &TemplateValues) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(Error::Template(format!("unclosed placeholder at byte {}", pos)));
                }
                if !is_identifier(&name) {
                    return Err(Error::Template(format!("invalid placeholder {{{}}} at byte {}", name, pos)));
                }
                let value = values
                    .get(&name)
                    .ok_or_else(|| Error::Template(format!("no value for placeholder {{{}}}", name)))?;
                out.push_str(value);
            }
            '}' => {
                return Err(Error::Template(format!("single '}}' at byte {}", pos)));
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes() {
        let mut values = TemplateValues::new();
        values.set("bexp", 4.05).set("name", "cat-1").set("unused", 1);
        let out = render("b={bexp}[] id={name}", &values).unwrap();
        assert_eq!(out, "b=4.05[] id=cat-1");
    }

    #[test]
    fn test_escaped_braces() {
        let values = TemplateValues::new();
        assert_eq!(render("{{id}} }}", &values).unwrap(), "{id} }");
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let values = TemplateValues::new();
        let err = render("x={missing}", &values).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_malformed_placeholders() {
        let mut values = TemplateValues::new();
        values.set("a", 1);
        assert!(render("{a", &values).is_err());
        assert!(render("{a b}", &values).is_err());
        assert!(render("a}", &values).is_err());
        assert!(render("{}", &values).is_err());
    }

    #[test]
    fn test_bundled_templates_placeholders() {
        let mut cfe = TemplateValues::new();
        for name in [
            "bexp", "dksat", "psisat", "slope", "smcmax", "smcwlt", "max_gw_storage", "gw_Coeff",
            "gw_Expon", "gw_storage", "refkdt",
        ] {
            cfe.set(name, 1);
        }
        let ini = render(CFE_TEMPLATE, &cfe).unwrap();
        assert!(ini.contains("soil_params.b=1[]"));
        assert!(!ini.contains('{'));

        let mut troute = TemplateValues::new();
        for name in [
            "geo_file_path", "cpu_pool", "start_datetime", "time_step_size", "nts", "max_loop_size",
            "stream_output_time",
        ] {
            troute.set(name, 1);
        }
        assert!(render(TROUTE_TEMPLATE, &troute).is_ok());

        // realization.json is edited as JSON, not rendered
        let realization: serde_json::Value = serde_json::from_str(REALIZATION_TEMPLATE).unwrap();
        assert_eq!(realization["time"]["output_interval"], 3600);
    }
}
