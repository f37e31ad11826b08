//! Pre-built mock filesystem scenarios for testing.
//!
//! These provide realistic `/proc` states for the collector tests.

use super::filesystem::MockFs;

/// Renders a `/proc/[pid]/stat` line with the fields the collector reads.
pub fn stat_line(
    pid: u32,
    comm: &str,
    state: char,
    ppid: u32,
    utime: u64,
    stime: u64,
    starttime: u64,
) -> String {
    format!(
        "{pid} ({comm}) {state} {ppid} {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 {starttime} 12345678 100 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0"
    )
}

fn status_file(name: &str, pid: u32, ppid: u32, uid: u32, vm_rss_kb: Option<u64>) -> String {
    let mut status = format!(
        "Name:\t{name}\nUmask:\t0022\nState:\tS (sleeping)\nPid:\t{pid}\nPPid:\t{ppid}\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\nGid:\t{uid}\t{uid}\t{uid}\t{uid}\n"
    );
    if let Some(rss) = vm_rss_kb {
        status.push_str(&format!("VmSize:\t  {}\tkB\nVmRSS:\t  {}\tkB\n", rss * 4, rss));
    }
    status.push_str("Threads:\t1\n");
    status
}

impl MockFs {
    /// A four-core host with init, a login shell and a zombie.
    ///
    /// Uptime is 12000 s and MemTotal is 16384000 kB, so pid 1000 (bash)
    /// has a lifetime CPU usage of exactly 10% and memory usage of 1%.
    pub fn typical_system() -> Self {
        let fs = Self::new();

        fs.add_file(
            "/etc/passwd",
            "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
user:x:1000:1000:User:/home/user:/bin/bash
",
        );

        fs.add_file("/proc/uptime", "12000.00 40000.00\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );

        fs.add_process(
            1,
            &stat_line(1, "systemd", 'S', 0, 1200, 0, 1),
            &status_file("systemd", 1, 0, 0, Some(8192)),
            "/sbin/init\0splash\0",
            "/",
            "/usr/lib/systemd/systemd",
        );
        fs.add_process(
            1000,
            &stat_line(1000, "bash", 'R', 1, 15000, 5000, 1_000_000),
            &status_file("bash", 1000, 1, 1000, Some(163840)),
            "/bin/bash\0--login\0",
            "/home/user",
            "/usr/bin/bash",
        );
        // Zombies keep no memory map, cwd or exe.
        fs.add_process(
            1001,
            &stat_line(1001, "defunct", 'Z', 1000, 0, 0, 1_100_000),
            &status_file("defunct", 1001, 1000, 1000, None),
            "",
            "",
            "",
        );

        fs
    }

    /// `typical_system` plus a process in a state outside the closed set
    /// (`X`, dead) and a root-owned daemon whose links are unreadable.
    pub fn with_odd_processes() -> Self {
        let fs = Self::typical_system();

        fs.add_process(
            2000,
            &stat_line(2000, "exiting", 'X', 1, 10, 10, 1_150_000),
            &status_file("exiting", 2000, 1, 1000, Some(1024)),
            "exiting\0",
            "/tmp",
            "/usr/bin/exiting",
        );
        fs.add_process(
            2001,
            &stat_line(2001, "sshd", 'S', 1, 100, 100, 500),
            &status_file("sshd", 2001, 1, 0, Some(4096)),
            "sshd: /usr/sbin/sshd -D\0",
            "",
            "",
        );

        fs
    }
}
