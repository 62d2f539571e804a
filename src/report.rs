//! Fixed-width result table.

use std::fmt;

use crate::bench::BenchReport;

const RULE: &str = "+----------------------+-----------------+";

/// The numbers shown in the result table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub buffer_gb: f64,
    pub thread_count: usize,
    pub total_gb: f64,
    pub elapsed_secs: f64,
    pub throughput_gbps: f64,
}

impl From<&BenchReport> for Metrics {
    fn from(report: &BenchReport) -> Self {
        Self {
            buffer_gb: report.buffer_gb(),
            thread_count: report.thread_count,
            total_gb: report.total_gb(),
            elapsed_secs: report.elapsed_secs(),
            throughput_gbps: report.throughput_gbps(),
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "| Performance Metrics  |    Value        |")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "| Buffer Size:         | {:>8.2} GB     |", self.buffer_gb)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "| Thread Count:        | {:>8}        |", self.thread_count)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "| Total Data:          | {:>8.2} GB     |", self.total_gb)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "| Elapsed Time:        | {:>8.2} s      |", self.elapsed_secs)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "| Throughput:          | {:>8.2} GB/s   |", self.throughput_gbps)?;
        writeln!(f, "{RULE}")
    }
}
