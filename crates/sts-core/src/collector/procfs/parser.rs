//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file contents, testable with string inputs.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Fields of `/proc/[pid]/stat` used by the process collector.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The comm field can contain spaces and parentheses, so it is delimited by
/// the first `(` and the last `)`.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;
    let comm = content[open_paren + 1..close_paren].to_string();

    // Fields after ')' start at `state` (field 3 in proc(5)).
    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    if fields.len() < 20 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 20+, got {}",
            fields.len()
        )));
    }

    let parse_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: parse_u64(1, "ppid")? as u32,
        utime: parse_u64(11, "utime")?,
        stime: parse_u64(12, "stime")?,
        starttime: parse_u64(19, "starttime")?,
    })
}

/// Fields of `/proc/[pid]/status` used by the process collector.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    pub name: String,
    /// Real UID; `None` when the line is missing.
    pub uid: Option<u32>,
    /// Resident set size in kB; `None` for kernel threads and zombies.
    pub vm_rss: Option<u64>,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut status = ProcStatus::default();
    let mut saw_name = false;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Name" => {
                status.name = value.to_string();
                saw_name = true;
            }
            // Uid: real effective saved fs
            "Uid" => {
                status.uid = value.split_whitespace().next().and_then(|s| s.parse().ok());
            }
            "VmRSS" => {
                status.vm_rss = value.split_whitespace().next().and_then(|s| s.parse().ok());
            }
            _ => {}
        }
    }

    if !saw_name {
        return Err(ParseError::new("missing Name in status"));
    }
    Ok(status)
}

/// Parses `MemTotal` (kB) out of `/proc/meminfo`.
pub fn parse_mem_total(content: &str) -> Result<u64, ParseError> {
    content
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::new("missing MemTotal in meminfo"))
}

/// Parses the first field (seconds since boot) of `/proc/uptime`.
pub fn parse_uptime(content: &str) -> Result<f64, ParseError> {
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::new("invalid uptime format"))
}

/// Per-core counters from a `cpuN` line of `/proc/stat`, in USER_HZ ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuTimes {
    pub cpu: String,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    /// Sum of all non-guest buckets (guest time is already part of `user`).
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn busy(&self) -> u64 {
        self.total() - self.idle - self.iowait
    }
}

/// Parses the per-core lines of `/proc/stat`, in file order.
///
/// The aggregate `cpu` line is skipped.
pub fn parse_per_cpu_times(content: &str) -> Result<Vec<CpuTimes>, ParseError> {
    let mut cpus = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(label) = parts.first() else {
            continue;
        };
        let Some(id) = label.strip_prefix("cpu") else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        if id.parse::<u32>().is_err() {
            return Err(ParseError::new(format!("invalid cpu label '{}'", label)));
        }
        if parts.len() < 5 {
            return Err(ParseError::new(format!("not enough fields for {}", label)));
        }

        // Older kernels omit the trailing buckets.
        let get_val = |idx: usize| -> Result<u64, ParseError> {
            match parts.get(idx) {
                Some(s) => s
                    .parse()
                    .map_err(|_| ParseError::new(format!("invalid counter in {}", label))),
                None => Ok(0),
            }
        };

        cpus.push(CpuTimes {
            cpu: label.to_string(),
            user: get_val(1)?,
            nice: get_val(2)?,
            system: get_val(3)?,
            idle: get_val(4)?,
            iowait: get_val(5)?,
            irq: get_val(6)?,
            softirq: get_val(7)?,
            steal: get_val(8)?,
            guest: get_val(9)?,
            guest_nice: get_val(10)?,
        });
    }

    if cpus.is_empty() {
        return Err(ParseError::new("no per-cpu lines in stat"));
    }
    Ok(cpus)
}

/// Parses `/etc/passwd` content and returns a map of UID -> username.
///
/// Format: username:password:uid:gid:gecos:home:shell
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3
            && let Ok(uid) = parts[2].parse::<u32>()
        {
            map.insert(uid, parts[0].to_string());
        }
    }
    map
}

/// Resolver for UID -> username mapping.
#[derive(Debug, Clone, Default)]
pub struct UserResolver {
    uid_to_name: HashMap<u32, String>,
}

impl UserResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads user mappings from /etc/passwd content.
    pub fn load_from_content(&mut self, content: &str) {
        self.uid_to_name = parse_passwd(content);
    }

    /// Resolves UID to username, returns UID as string if not found.
    pub fn resolve(&self, uid: u32) -> String {
        self.uid_to_name
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }

    pub fn is_loaded(&self) -> bool {
        !self.uid_to_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passwd() {
        let content = "\
root:x:0:0:root:/root:/bin/bash
# comment
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
user:x:1000:1000:User Name:/home/user:/bin/bash
";
        let map = parse_passwd(content);
        assert_eq!(map.get(&0), Some(&"root".to_string()));
        assert_eq!(map.get(&1), Some(&"daemon".to_string()));
        assert_eq!(map.get(&1000), Some(&"user".to_string()));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_user_resolver() {
        let mut resolver = UserResolver::new();
        assert!(!resolver.is_loaded());
        resolver.load_from_content(
            "root:x:0:0::/root:/bin/bash\nuser:x:1000:1000::/home/user:/bin/bash",
        );

        assert_eq!(resolver.resolve(0), "root");
        assert_eq!(resolver.resolve(1000), "user");
        assert_eq!(resolver.resolve(9999), "9999");
        assert!(resolver.is_loaded());
    }

    #[test]
    fn test_parse_proc_stat_basic() {
        let content = "1234 (bash) S 1233 1234 1234 34816 1235 4194304 5000 50000 10 20 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 5 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 1234);
        assert_eq!(stat.comm, "bash");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.ppid, 1233);
        assert_eq!(stat.utime, 100);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.starttime, 100000);
    }

    #[test]
    fn test_parse_proc_stat_with_parentheses_in_comm() {
        let content = "5001 (test(1) x) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 1 0 500100 10000000 1000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 5001);
        assert_eq!(stat.comm, "test(1) x");
        assert_eq!(stat.ppid, 1);
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        let err = parse_proc_stat("42 (short) R 1 2 3").unwrap_err();
        assert!(err.message.contains("not enough fields"));
    }

    #[test]
    fn test_parse_proc_status() {
        let content = "\
Name:\tbash
Pid:\t1234
PPid:\t1233
Uid:\t1000\t1001\t1000\t1000
VmRSS:\t    8000 kB
";
        let status = parse_proc_status(content).unwrap();
        assert_eq!(status.name, "bash");
        assert_eq!(status.uid, Some(1000));
        assert_eq!(status.vm_rss, Some(8000));
    }

    #[test]
    fn test_parse_proc_status_kernel_thread() {
        let status = parse_proc_status("Name:\tkworker/0:1\nUid:\t0\t0\t0\t0\n").unwrap();
        assert_eq!(status.vm_rss, None);
        assert!(parse_proc_status("Pid:\t1\n").is_err());
    }

    #[test]
    fn test_parse_mem_total_and_uptime() {
        assert_eq!(
            parse_mem_total("MemTotal:       16384000 kB\nMemFree: 1 kB\n"),
            Ok(16384000)
        );
        assert!(parse_mem_total("MemFree: 1 kB\n").is_err());
        assert_eq!(parse_uptime("12345.67 98765.43\n"), Ok(12345.67));
        assert!(parse_uptime("").is_err());
    }

    #[test]
    fn test_parse_per_cpu_times() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 10 5 1
cpu1 2500 125 750 20000
intr 1000000 50 0
btime 1700000000
";
        let cpus = parse_per_cpu_times(content).unwrap();
        assert_eq!(cpus.len(), 2);
        assert_eq!(cpus[0].cpu, "cpu0");
        assert_eq!(cpus[0].steal, 10);
        assert_eq!(cpus[0].guest_nice, 1);
        assert_eq!(cpus[0].total(), 2500 + 125 + 750 + 20000 + 250 + 50 + 25 + 10);
        assert_eq!(cpus[0].busy(), cpus[0].total() - 20000 - 250);
        assert_eq!(cpus[1].cpu, "cpu1");
        assert_eq!(cpus[1].iowait, 0);
    }

    #[test]
    fn test_parse_per_cpu_times_rejects_garbage() {
        assert!(parse_per_cpu_times("cpu  1 2 3 4\n").is_err());
        assert!(parse_per_cpu_times("cpu0 1 x 3 4\n").is_err());
    }
}
