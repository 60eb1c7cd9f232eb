use std::ffi::OsString;

use super::ParameterFactory;

/// Encoding arguments taken verbatim from the config file.
pub struct TemplateParameterFactory {
    args: Vec<String>,
}

impl TemplateParameterFactory {
    pub fn new(args: Vec<String>) -> Self {
        TemplateParameterFactory { args }
    }
}

impl ParameterFactory for TemplateParameterFactory {
    fn parameters(&self) -> Vec<OsString> {
        self.args.iter().map(OsString::from).collect()
    }
}
