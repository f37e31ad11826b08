//! Mapping of samples to insert parameters.

use crate::model::{CpuSample, ProcessSample};
use crate::writer::queries::{
    CPU_METRICS_TABLE, INSERT_CPU_METRICS, INSERT_PROCESSES_METRICS, PROCESSES_METRICS_TABLE,
};
use crate::writer::store::SqlValue;

/// A sample that becomes one row of a metrics table.
pub trait InsertRow {
    const TABLE: &'static str;
    const QUERY: &'static str;

    /// Parameters in the positional order of [`Self::QUERY`].
    fn params(&self) -> Vec<SqlValue>;
}

impl InsertRow for CpuSample {
    const TABLE: &'static str = CPU_METRICS_TABLE;
    const QUERY: &'static str = INSERT_CPU_METRICS;

    fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.cpu.as_str()),
            SqlValue::from(self.percent),
            SqlValue::from(self.user),
            SqlValue::from(self.system),
            SqlValue::from(self.idle),
            SqlValue::from(self.nice),
            SqlValue::from(self.iowait),
            SqlValue::from(self.irq),
            SqlValue::from(self.softirq),
            SqlValue::from(self.steal),
            SqlValue::from(self.guest),
            SqlValue::from(self.guest_nice),
        ]
    }
}

impl InsertRow for ProcessSample {
    const TABLE: &'static str = PROCESSES_METRICS_TABLE;
    const QUERY: &'static str = INSERT_PROCESSES_METRICS;

    fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.pid),
            SqlValue::from(self.parent_pid),
            SqlValue::from(self.name.as_str()),
            SqlValue::from(self.status.as_str()),
            SqlValue::from(self.username.as_str()),
            SqlValue::from(self.cpu_percent),
            SqlValue::from(self.memory_percent),
            SqlValue::from(self.cmdline.as_str()),
            SqlValue::from(self.cwd.as_str()),
            SqlValue::from(self.exe.as_str()),
        ]
    }
}
