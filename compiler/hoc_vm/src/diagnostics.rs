//! Optional profile counters.
//!
//! Stored as `Option<ExecCounters>` on the interpreter. When `None` every
//! increment is skipped; hosts turn them on with `enable_counters()`.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecCounters {
    pub instructions: u64,
    pub calls: u64,
    pub native_calls: u64,
    pub objects_created: u64,
    pub objects_destroyed: u64,
    pub faults: u64,
}

impl ExecCounters {
    #[inline]
    pub fn count_instruction(&mut self) {
        self.instructions = self.instructions.wrapping_add(1);
    }

    #[inline]
    pub fn count_call(&mut self) {
        self.calls = self.calls.wrapping_add(1);
    }

    #[inline]
    pub fn count_native_call(&mut self) {
        self.native_calls = self.native_calls.wrapping_add(1);
    }

    #[inline]
    pub fn count_object_created(&mut self) {
        self.objects_created = self.objects_created.wrapping_add(1);
    }

    #[inline]
    pub fn count_object_destroyed(&mut self) {
        self.objects_destroyed = self.objects_destroyed.wrapping_add(1);
    }

    #[inline]
    pub fn count_fault(&mut self) {
        self.faults = self.faults.wrapping_add(1);
    }

    /// Format a summary report.
    pub fn report(&self) -> String {
        format!(
            "Execution profile:\n  \
             Instructions:      {}\n  \
             Calls:             {}\n  \
             Native calls:      {}\n  \
             Objects created:   {}\n  \
             Objects destroyed: {}\n  \
             Faults:            {}",
            self.instructions,
            self.calls,
            self.native_calls,
            self.objects_created,
            self.objects_destroyed,
            self.faults,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_every_counter() {
        let mut counters = ExecCounters::default();
        counters.count_instruction();
        counters.count_instruction();
        counters.count_object_created();
        let report = counters.report();
        assert!(report.contains("Instructions:      2"));
        assert!(report.contains("Objects created:   1"));
        assert!(report.contains("Faults:            0"));
    }
}
