//! Process table enumeration from `/proc/[pid]/`.
//!
//! Every field of a [`ProcessSample`] is read independently. A field that
//! cannot be read is logged and left at its zero value; the sample itself is
//! kept. Only a process whose directory vanished mid-enumeration is dropped.

use crate::collector::procfs::cpu::CLK_TCK;
use crate::collector::procfs::parser::{
    ParseError, ProcStat, ProcStatus, UserResolver, parse_mem_total, parse_proc_stat,
    parse_proc_status, parse_uptime,
};
use crate::collector::traits::FileSystem;
use crate::error::{CollectionError, FieldReadError};
use crate::model::{ProcessSample, ProcessStatus};
use std::io;
use std::path::Path;
use tracing::{debug, error};

/// How often a field is expected to be unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Volatility {
    /// Fails routinely for other users' or short-lived processes (debug log).
    Expected,
    /// Should always be readable (error log).
    Unexpected,
}

const PASSWD_PATH: &str = "/etc/passwd";

/// Host-wide inputs read once per enumeration.
struct HostContext {
    mem_total_kb: Option<u64>,
    uptime_secs: Option<f64>,
    users: UserResolver,
}

/// Raw per-field results for one process, before degradation.
struct ProcessFields {
    pid: u32,
    parent_pid: Result<i32, FieldReadError>,
    name: Result<String, FieldReadError>,
    username: Result<String, FieldReadError>,
    status: Result<char, FieldReadError>,
    cpu_percent: Result<f64, FieldReadError>,
    memory_percent: Result<f32, FieldReadError>,
    cmdline: Result<String, FieldReadError>,
    cwd: Result<String, FieldReadError>,
    exe: Result<String, FieldReadError>,
}

impl ProcessFields {
    fn into_sample(self) -> ProcessSample {
        use Volatility::{Expected, Unexpected};
        let pid = self.pid;

        let code = degrade(pid, "status", Unexpected, self.status.map(Some));
        let status = match code {
            Some(code) => ProcessStatus::from_code(code).unwrap_or_else(|| {
                error!(pid, code = %code, "undefined process status");
                ProcessStatus::Undefined
            }),
            None => ProcessStatus::Undefined,
        };

        ProcessSample {
            pid: pid as i32,
            parent_pid: degrade(pid, "parent_pid", Unexpected, self.parent_pid),
            name: degrade(pid, "name", Unexpected, self.name),
            username: degrade(pid, "username", Unexpected, self.username),
            status,
            cpu_percent: degrade(pid, "cpu_percent", Unexpected, self.cpu_percent),
            memory_percent: degrade(pid, "memory_percent", Unexpected, self.memory_percent),
            cmdline: degrade(pid, "cmdline", Expected, self.cmdline),
            cwd: degrade(pid, "cwd", Expected, self.cwd),
            exe: degrade(pid, "exe", Expected, self.exe),
        }
    }
}

/// Unwraps a field result, logging and defaulting on failure.
fn degrade<T: Default>(
    pid: u32,
    field: &'static str,
    volatility: Volatility,
    result: Result<T, FieldReadError>,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            match volatility {
                Volatility::Expected => debug!(pid, field, error = %e, "process field unavailable"),
                Volatility::Unexpected => error!(pid, field, error = %e, "process field unavailable"),
            }
            T::default()
        }
    }
}

/// Enumerates processes and builds one [`ProcessSample`] each.
pub struct ProcessReader<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> ProcessReader<F> {
    pub fn new(fs: F, proc_path: &str) -> Self {
        Self {
            fs,
            proc_path: proc_path.to_string(),
        }
    }

    /// PIDs currently listed under the proc directory, ascending.
    pub fn pids(&self) -> Result<Vec<u32>, CollectionError> {
        let entries =
            self.fs
                .read_dir(Path::new(&self.proc_path))
                .map_err(|source| CollectionError::Io {
                    path: self.proc_path.clone(),
                    source,
                })?;

        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|entry| entry.file_name()?.to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    /// Reads every visible process.
    ///
    /// A process that exits between the listing and the read of its `stat`
    /// is left out, so the result can be shorter than [`Self::pids`].
    pub fn read_all(&self) -> Result<Vec<ProcessSample>, CollectionError> {
        let pids = self.pids()?;
        let host = self.host_context();

        let mut samples = Vec::with_capacity(pids.len());
        for pid in pids {
            match self.read_process(pid, &host) {
                Some(sample) => samples.push(sample),
                None => debug!(pid, "process exited during collection"),
            }
        }
        Ok(samples)
    }

    /// Reads one process; `None` if it no longer exists.
    fn read_process(&self, pid: u32, host: &HostContext) -> Option<ProcessSample> {
        let dir = format!("{}/{}", self.proc_path, pid);

        let stat_path = format!("{}/stat", dir);
        let stat = match self.fs.read_to_string(Path::new(&stat_path)) {
            Ok(content) => parse_proc_stat(&content).map_err(|e| parse_error(&stat_path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !self.fs.exists(Path::new(&dir)) => {
                return None;
            }
            Err(e) => Err(io_error(&stat_path, &e)),
        };

        let status_path = format!("{}/status", dir);
        let status: Result<ProcStatus, FieldReadError> =
            self.read(&status_path).and_then(|content| {
                parse_proc_status(&content).map_err(|e| parse_error(&status_path, e))
            });

        let name = match (&status, &stat) {
            (Ok(status), _) if !status.name.is_empty() => Ok(status.name.clone()),
            (_, Ok(stat)) => Ok(stat.comm.clone()),
            (Err(e), Err(_)) => Err(e.clone()),
            (Ok(_), Err(e)) => Err(e.clone()),
        };

        let username = status.as_ref().map_err(Clone::clone).and_then(|s| {
            s.uid.map(|uid| host.users.resolve(uid)).ok_or_else(|| {
                parse_error(&status_path, ParseError::new("missing Uid in status"))
            })
        });

        let memory_percent = status.as_ref().map_err(Clone::clone).and_then(|s| {
            match (s.vm_rss, host.mem_total_kb) {
                // kernel threads and zombies have no resident memory
                (None, _) => Ok(0.0),
                (Some(_), None) => Err(FieldReadError::Unavailable("/proc/meminfo")),
                (Some(_), Some(0)) => Ok(0.0),
                (Some(rss), Some(total)) => Ok((rss as f64 * 100.0 / total as f64) as f32),
            }
        });

        let cpu_percent = stat.as_ref().map_err(Clone::clone).and_then(|s| {
            let uptime = host
                .uptime_secs
                .ok_or(FieldReadError::Unavailable("/proc/uptime"))?;
            Ok(lifetime_cpu_percent(s, uptime))
        });

        let fields = ProcessFields {
            pid,
            parent_pid: stat.as_ref().map(|s| s.ppid as i32).map_err(Clone::clone),
            status: stat.as_ref().map(|s| s.state).map_err(Clone::clone),
            name,
            username,
            cpu_percent,
            memory_percent,
            cmdline: self
                .read(&format!("{}/cmdline", dir))
                .map(|raw| raw.replace('\0', " ").trim().to_string()),
            cwd: self.link(&format!("{}/cwd", dir)),
            exe: self.link(&format!("{}/exe", dir)),
        };

        Some(fields.into_sample())
    }

    fn host_context(&self) -> HostContext {
        let meminfo = format!("{}/meminfo", self.proc_path);
        let mem_total_kb = self
            .read(&meminfo)
            .and_then(|c| parse_mem_total(&c).map_err(|e| parse_error(&meminfo, e)))
            .inspect_err(|e| error!(error = %e, "memory percent unavailable this cycle"))
            .ok();

        let uptime = format!("{}/uptime", self.proc_path);
        let uptime_secs = self
            .read(&uptime)
            .and_then(|c| parse_uptime(&c).map_err(|e| parse_error(&uptime, e)))
            .inspect_err(|e| error!(error = %e, "cpu percent unavailable this cycle"))
            .ok();

        HostContext {
            mem_total_kb,
            uptime_secs,
            users: self.users(),
        }
    }

    /// User table as of now; uids it does not know render as numbers.
    fn users(&self) -> UserResolver {
        let mut users = UserResolver::new();
        match self.fs.read_to_string(Path::new(PASSWD_PATH)) {
            Ok(content) => users.load_from_content(&content),
            Err(e) => debug!(path = PASSWD_PATH, error = %e, "failed to read user table"),
        }
        if !users.is_loaded() {
            debug!("no users known, user names will be numeric");
        }
        users
    }

    fn read(&self, path: &str) -> Result<String, FieldReadError> {
        self.fs
            .read_to_string(Path::new(path))
            .map_err(|e| io_error(path, &e))
    }

    fn link(&self, path: &str) -> Result<String, FieldReadError> {
        self.fs
            .read_link(Path::new(path))
            .map(|target| target.to_string_lossy().into_owned())
            .map_err(|e| io_error(path, &e))
    }
}

/// Average CPU usage over the process lifetime, like `ps` reports it.
///
/// Not clamped: a multi-threaded process can exceed 100.
fn lifetime_cpu_percent(stat: &ProcStat, uptime_secs: f64) -> f64 {
    let cpu_secs = (stat.utime + stat.stime) as f64 / CLK_TCK;
    let elapsed = uptime_secs - stat.starttime as f64 / CLK_TCK;
    if elapsed <= 0.0 {
        return 0.0;
    }
    100.0 * cpu_secs / elapsed
}

fn io_error(path: &str, e: &io::Error) -> FieldReadError {
    FieldReadError::Io {
        path: path.to_string(),
        message: e.to_string(),
    }
}

fn parse_error(path: &str, e: ParseError) -> FieldReadError {
    FieldReadError::Parse {
        path: path.to_string(),
        message: e.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, stat_line};

    fn find(samples: &[ProcessSample], pid: i32) -> &ProcessSample {
        samples.iter().find(|s| s.pid == pid).unwrap()
    }

    #[test]
    fn test_pids_are_numeric_and_sorted() {
        let fs = MockFs::typical_system();
        fs.add_file("/proc/self/stat", "ignored");
        let reader = ProcessReader::new(fs, "/proc");
        assert_eq!(reader.pids().unwrap(), vec![1, 1000, 1001]);
    }

    #[test]
    fn test_read_all_typical_system() {
        let reader = ProcessReader::new(MockFs::typical_system(), "/proc");
        let samples = reader.read_all().unwrap();
        assert_eq!(samples.len(), 3);

        let bash = find(&samples, 1000);
        assert_eq!(bash.parent_pid, 1);
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.username, "user");
        assert_eq!(bash.status, ProcessStatus::Running);
        assert_eq!(bash.cpu_percent, 10.0);
        assert_eq!(bash.memory_percent, 1.0);
        assert_eq!(bash.cmdline, "/bin/bash --login");
        assert_eq!(bash.cwd, "/home/user");
        assert_eq!(bash.exe, "/usr/bin/bash");

        let init = find(&samples, 1);
        assert_eq!(init.username, "root");
        assert_eq!(init.status, ProcessStatus::Sleep);
    }

    #[test]
    fn test_zombie_degrades_missing_fields() {
        let reader = ProcessReader::new(MockFs::typical_system(), "/proc");
        let samples = reader.read_all().unwrap();

        let zombie = find(&samples, 1001);
        assert_eq!(zombie.status, ProcessStatus::Zombie);
        assert_eq!(zombie.status.as_str(), "Zombie");
        assert_eq!(zombie.parent_pid, 1000);
        assert_eq!(zombie.memory_percent, 0.0);
        assert_eq!(zombie.cmdline, "");
        assert_eq!(zombie.cwd, "");
        assert_eq!(zombie.exe, "");
    }

    #[test]
    fn test_unknown_status_is_undefined() {
        let reader = ProcessReader::new(MockFs::with_odd_processes(), "/proc");
        let samples = reader.read_all().unwrap();
        assert_eq!(samples.len(), 5);

        let odd = find(&samples, 2000);
        assert_eq!(odd.status, ProcessStatus::Undefined);
        assert_eq!(odd.name, "exiting");

        let sshd = find(&samples, 2001);
        assert_eq!(sshd.username, "root");
        assert_eq!(sshd.cwd, "");
        assert_eq!(sshd.exe, "");
        assert_eq!(sshd.cmdline, "sshd: /usr/sbin/sshd -D");
    }

    #[test]
    fn test_vanished_process_is_skipped() {
        let fs = MockFs::typical_system();
        let reader = ProcessReader::new(fs.clone(), "/proc");
        let host = reader.host_context();

        fs.remove("/proc/1001");
        assert!(reader.read_process(1001, &host).is_none());

        // directory still there, only stat unreadable: sample kept
        fs.remove("/proc/1000/stat");
        let bash = reader.read_process(1000, &host).unwrap();
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.status, ProcessStatus::Undefined);
    }

    #[test]
    fn test_unreadable_stat_keeps_sample() {
        let fs = MockFs::typical_system();
        fs.add_file("/proc/1000/stat", "garbage");
        let reader = ProcessReader::new(fs, "/proc");

        let samples = reader.read_all().unwrap();
        let bash = find(&samples, 1000);
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.parent_pid, 0);
        assert_eq!(bash.status, ProcessStatus::Undefined);
        assert_eq!(bash.cpu_percent, 0.0);
        assert_eq!(bash.memory_percent, 1.0);
    }

    #[test]
    fn test_status_missing_falls_back_to_comm() {
        let fs = MockFs::typical_system();
        fs.remove("/proc/1000/status");
        let reader = ProcessReader::new(fs, "/proc");

        let samples = reader.read_all().unwrap();
        let bash = find(&samples, 1000);
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.username, "");
        assert_eq!(bash.memory_percent, 0.0);
        assert_eq!(bash.cpu_percent, 10.0);
    }

    #[test]
    fn test_missing_host_files_degrade_percents() {
        let fs = MockFs::typical_system();
        fs.remove("/proc/meminfo");
        fs.remove("/proc/uptime");
        let reader = ProcessReader::new(fs, "/proc");

        let samples = reader.read_all().unwrap();
        let bash = find(&samples, 1000);
        assert_eq!(bash.cpu_percent, 0.0);
        assert_eq!(bash.memory_percent, 0.0);
        assert_eq!(bash.name, "bash");
    }

    #[test]
    fn test_unknown_uid_renders_numeric() {
        let fs = MockFs::typical_system();
        fs.add_process(
            3000,
            &stat_line(3000, "worker", 'S', 1, 0, 0, 1_000_000),
            "Name:\tworker\nUid:\t4242\t4242\t4242\t4242\n",
            "",
            "",
            "",
        );
        let reader = ProcessReader::new(fs, "/proc");

        let samples = reader.read_all().unwrap();
        assert_eq!(find(&samples, 3000).username, "4242");
    }

    #[test]
    fn test_users_reloaded_on_every_read() {
        let fs = MockFs::typical_system();
        let reader = ProcessReader::new(fs.clone(), "/proc");
        reader.read_all().unwrap();

        let passwd = fs.read_to_string(Path::new(PASSWD_PATH)).unwrap();
        fs.add_file(
            PASSWD_PATH,
            format!("{}\nnewbie:x:4242:4242::/home/newbie:/bin/sh\n", passwd),
        );
        fs.add_process(
            3000,
            &stat_line(3000, "worker", 'S', 1, 0, 0, 1_000_000),
            "Name:\tworker\nUid:\t4242\t4242\t4242\t4242\n",
            "",
            "",
            "",
        );

        let samples = reader.read_all().unwrap();
        assert_eq!(find(&samples, 3000).username, "newbie");
    }

    #[test]
    fn test_missing_passwd_renders_numeric() {
        let fs = MockFs::typical_system();
        fs.remove(PASSWD_PATH);
        let reader = ProcessReader::new(fs, "/proc");

        let samples = reader.read_all().unwrap();
        assert_eq!(find(&samples, 1000).username, "1000");
        assert_eq!(find(&samples, 1).username, "0");
    }

    #[test]
    fn test_missing_proc_dir_is_collection_error() {
        let reader = ProcessReader::new(MockFs::new(), "/proc");
        assert!(matches!(
            reader.read_all(),
            Err(CollectionError::Io { .. })
        ));
    }

    #[test]
    fn test_lifetime_cpu_percent() {
        let stat = ProcStat {
            utime: 300,
            stime: 100,
            starttime: 1000,
            ..ProcStat::default()
        };
        assert_eq!(lifetime_cpu_percent(&stat, 30.0), 20.0);
        assert_eq!(lifetime_cpu_percent(&stat, 10.0), 0.0);
    }
}
