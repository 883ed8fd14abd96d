//! Interpreter configuration and execution modes.
//!
//! `VmConfig` holds the fixed capacities and tolerances the engine is built
//! with. `ExecMode` picks a preset policy the way a host embeds the
//! interpreter: an interactive prompt keeps going after a fault and prints it,
//! a batch run stops at the first fault, and an embedded host only looks at
//! the returned status.

/// What the outermost boundary does with a fault.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Run the recovery sweep and report the fault.
    #[default]
    Recover,
    /// Report the fault, then abort the process so it can be inspected.
    Abort,
}

/// Host embedding mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecMode {
    /// Prompt-style host: faults are printed and the next statement runs.
    #[default]
    Interactive,
    /// Script runner: faults are printed and the run ends.
    Batch,
    /// Library host: faults are silent, the caller reads the status.
    Embedded,
}

impl ExecMode {
    /// Whether fault messages are written to stderr.
    #[inline]
    pub fn shows_messages(self) -> bool {
        !matches!(self, Self::Embedded)
    }

    /// Whether the host should stop feeding statements after a fault.
    #[inline]
    pub fn stops_on_fault(self) -> bool {
        matches!(self, Self::Batch)
    }
}

/// Fixed limits and tolerances.
#[derive(Clone, Debug, PartialEq)]
pub struct VmConfig {
    /// Evaluation stack entries.
    pub stack_capacity: usize,
    /// Call frames.
    pub frame_capacity: usize,
    /// Tolerance for `< > <= >= == !=` and subscript truncation.
    pub epsilon: f64,
    /// Nested `begintemplate` depth.
    pub template_nesting: usize,
    /// Depth of the `object_push` context stack.
    pub object_context_depth: usize,
    /// Slots in the deferred-unref pool.
    pub defer_slots: usize,
    pub fault_policy: FaultPolicy,
    pub mode: ExecMode,
    /// Segments per section seen by `for_segment`.
    pub segment_count: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_capacity: 1000,
            frame_capacity: 512,
            epsilon: 1e-11,
            template_nesting: 20,
            object_context_depth: 10,
            defer_slots: 4,
            fault_policy: FaultPolicy::Recover,
            mode: ExecMode::Interactive,
            segment_count: 1,
        }
    }
}

impl VmConfig {
    /// Defaults for the given mode.
    pub fn for_mode(mode: ExecMode) -> Self {
        VmConfig {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    #[must_use]
    pub fn with_defer_slots(mut self, slots: usize) -> Self {
        self.defer_slots = slots.max(1);
        self
    }

    #[must_use]
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    #[must_use]
    pub fn with_segment_count(mut self, count: usize) -> Self {
        self.segment_count = count.max(1);
        self
    }
}

#[cfg(test)]
mod tests;
