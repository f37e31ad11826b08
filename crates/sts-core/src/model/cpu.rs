/// One logical CPU core at one sampling instant.
///
/// Time buckets are seconds since boot; `percent` is utilization since the
/// previous reading of the same collector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSample {
    /// Core identifier as found in `/proc/stat` (e.g. `"cpu0"`).
    pub cpu: String,
    pub percent: f64,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub nice: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}
