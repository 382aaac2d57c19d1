//! Emitter configuration

/// Limits and switches for one compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterConfig {
    /// Longest instruction stream per unit, prologue included
    pub max_code_length: usize,
    /// Most formal parameters a function may declare
    pub max_parameters: usize,
    /// Largest constant pool per unit
    pub max_constants: usize,
    /// Most fixed frame slots per unit
    pub max_frame_slots: usize,
    /// Deepest operand stack per unit
    pub max_stack_depth: u32,
    /// Fill the source annotation table
    pub source_notes: bool,
    /// Emit binder-approved inner functions as lazy placeholders
    pub lazy_functions: bool,
    /// Treat the unit as strict mode code
    pub strict: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_code_length: 0x7fff_ffff,
            max_parameters: u16::MAX as usize,
            max_constants: u32::MAX as usize,
            max_frame_slots: u32::MAX as usize,
            max_stack_depth: u32::MAX,
            source_notes: true,
            lazy_functions: false,
            strict: false,
        }
    }
}

impl EmitterConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instruction stream limit
    pub fn with_max_code_length(mut self, max: usize) -> Self {
        self.max_code_length = max;
        self
    }

    /// Set the parameter limit
    pub fn with_max_parameters(mut self, max: usize) -> Self {
        self.max_parameters = max;
        self
    }

    /// Set the constant pool limit
    pub fn with_max_constants(mut self, max: usize) -> Self {
        self.max_constants = max;
        self
    }

    /// Set the frame slot limit
    pub fn with_max_frame_slots(mut self, max: usize) -> Self {
        self.max_frame_slots = max;
        self
    }

    /// Set the operand stack limit
    pub fn with_max_stack_depth(mut self, max: u32) -> Self {
        self.max_stack_depth = max;
        self
    }

    /// Enable or disable source annotations
    pub fn with_source_notes(mut self, enabled: bool) -> Self {
        self.source_notes = enabled;
        self
    }

    /// Enable or disable lazy inner functions
    pub fn with_lazy_functions(mut self, enabled: bool) -> Self {
        self.lazy_functions = enabled;
        self
    }

    /// Force strict mode
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
