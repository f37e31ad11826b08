//! Insert statements for the two metrics tables.
//!
//! `time` is `now()`, the start time of the current transaction, so every
//! row of one batch carries the same ingestion timestamp.
//!
//! Parameters carry explicit casts so the prepared parameter types do not
//! depend on the exact column types of the pre-existing schema.

pub const CPU_METRICS_TABLE: &str = "cpu_metrics";
pub const PROCESSES_METRICS_TABLE: &str = "processes_metrics";

pub const INSERT_CPU_METRICS: &str = "
INSERT INTO cpu_metrics(
  time,
  cpu,
  percent,
  time_user,
  time_system,
  time_idle,
  time_nice,
  time_iowait,
  time_irq,
  time_softirq,
  time_steal,
  time_guest,
  time_guest_nice
) VALUES (
  now(),
  $1::text,
  $2::double precision,
  $3::double precision,
  $4::double precision,
  $5::double precision,
  $6::double precision,
  $7::double precision,
  $8::double precision,
  $9::double precision,
  $10::double precision,
  $11::double precision,
  $12::double precision
)";

pub const INSERT_PROCESSES_METRICS: &str = "
INSERT INTO processes_metrics(
  time,
  pid,
  parent_pid,
  name,
  status,
  username,
  cpu_percent,
  memory_percent,
  cmd_line,
  current_working_directory,
  executable_path
) VALUES (
  now(),
  $1::integer,
  $2::integer,
  $3::text,
  $4::text,
  $5::text,
  $6::double precision,
  $7::real,
  $8::text,
  $9::text,
  $10::text
)";

/// Table named by an `INSERT INTO <table>(...)` statement.
pub fn insert_target(query: &str) -> Option<&str> {
    let rest = query.trim_start().strip_prefix("INSERT INTO")?.trim_start();
    let end = rest.find(|c: char| c == '(' || c.is_whitespace())?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_target_names_table() {
        assert_eq!(insert_target(INSERT_CPU_METRICS), Some(CPU_METRICS_TABLE));
        assert_eq!(
            insert_target(INSERT_PROCESSES_METRICS),
            Some(PROCESSES_METRICS_TABLE)
        );
        assert_eq!(insert_target("SELECT 1"), None);
    }

    #[test]
    fn placeholders_match_column_counts() {
        assert!(INSERT_CPU_METRICS.contains("$12"));
        assert!(!INSERT_CPU_METRICS.contains("$13"));
        assert!(INSERT_PROCESSES_METRICS.contains("$10"));
        assert!(!INSERT_PROCESSES_METRICS.contains("$11"));
    }
}
