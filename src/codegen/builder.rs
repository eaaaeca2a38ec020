use crate::codegen::FragmentCompiler;
use crate::{Error, Result};
use cranelift::codegen::isa;
use cranelift::codegen::settings::{self, Configurable};
use log::debug;
use target_lexicon::Triple;

pub struct FragmentCompilerBuilder {
    target: Option<Triple>,
    opt_level: String,
}

impl FragmentCompilerBuilder {
    pub fn new() -> Self {
        FragmentCompilerBuilder {
            target: None,
            opt_level: "speed".to_string(),
        }
    }

    /// Emit code for `triple` instead of the host. Such code can be saved but
    /// only loaded on a matching machine.
    pub fn target(mut self, triple: Triple) -> Self {
        self.target = Some(triple);
        self
    }

    /// Cranelift `opt_level`: "none", "speed" or "speed_and_size".
    pub fn opt_level(mut self, level: &str) -> Self {
        self.opt_level = level.to_string();
        self
    }

    pub fn build(self) -> Result<FragmentCompiler> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", &self.opt_level)
            .map_err(|e| Error::Codegen(e.to_string()))?;

        let isa_builder = match self.target {
            Some(triple) => isa::lookup(triple).map_err(|e| Error::Codegen(e.to_string()))?,
            None => cranelift_native::builder().map_err(|e| Error::Codegen(e.to_string()))?,
        };
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| Error::Codegen(e.to_string()))?;
        debug!("fragment compiler for {}", isa.triple());

        Ok(FragmentCompiler { isa })
    }
}

impl Default for FragmentCompilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
