//! Compiler entry points

use tracing::info;

use crate::ast::Program;
use crate::config::EmitterConfig;
use crate::emitter::{EmitOutput, LazyUnit};
use crate::error::EmitResult;
use crate::function;

/// The compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    config: EmitterConfig,
}

impl Compiler {
    /// Create a compiler with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compiler with a configuration
    pub fn with_config(config: EmitterConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Compile a script, module or eval unit
    pub fn compile(&self, program: &Program) -> EmitResult<EmitOutput> {
        let output = function::compile_program(program, self.config)?;
        info!(
            instructions = output.script.code.len(),
            functions = output.script.functions.len(),
            lazy = output.lazy.len(),
            warnings = output.warnings.len(),
            "compiled program"
        );
        Ok(output)
    }

    /// Compile the body of a function emitted as a lazy placeholder
    pub fn compile_lazy(&self, unit: &LazyUnit) -> EmitResult<EmitOutput> {
        function::compile_lazy(unit, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ProgramKind, ScopeData, Span};

    fn empty(kind: ProgramKind) -> Program {
        Program {
            kind,
            strict: false,
            scope: ScopeData::default(),
            body: Vec::new(),
            span: Span::new(1, 0),
        }
    }

    #[test]
    fn test_compile_empty_script() {
        let output = Compiler::new().compile(&empty(ProgramKind::Script)).unwrap();
        assert_eq!(output.script.main_code().len(), 1);
        assert_eq!(output.script.count_of("RetRval"), 1);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_module_is_strict() {
        let output = Compiler::new().compile(&empty(ProgramKind::Module)).unwrap();
        assert!(output.script.flags.is_strict);
    }

    #[test]
    fn test_strict_config() {
        let compiler = Compiler::with_config(EmitterConfig::new().with_strict(true));
        let output = compiler.compile(&empty(ProgramKind::Script)).unwrap();
        assert!(output.script.flags.is_strict);
    }
}
