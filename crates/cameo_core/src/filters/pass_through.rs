use crate::backend::Capabilities;
use crate::filter::Filter;
use crate::shader::ProgramSource;

/// Draws contents unchanged apart from opacity
///
/// The compositor keeps one shared instance for layers without filters, and
/// its program is the fallback for filters that fail to compile.
#[derive(Debug)]
pub struct PassThroughFilter {
    enabled: bool,
}

impl PassThroughFilter {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl Default for PassThroughFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for PassThroughFilter {
    fn label(&self) -> &str {
        "pass-through"
    }

    fn program_source(&mut self, _caps: &Capabilities) -> ProgramSource {
        ProgramSource::pass_through()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
