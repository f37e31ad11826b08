use std::fmt;

/// Closed set of process states stored in `processes_metrics.status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Running,
    Sleep,
    UninterruptibleSleep,
    Stop,
    StoppedByDebugger,
    Idle,
    Zombie,
    Wait,
    Lock,
    #[default]
    Undefined,
}

impl ProcessStatus {
    /// Maps a `/proc/[pid]/stat` state code.
    ///
    /// Returns `None` for codes outside the closed set so the caller can
    /// report them before falling back to [`ProcessStatus::Undefined`].
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'R' => Some(Self::Running),
            'S' => Some(Self::Sleep),
            'D' => Some(Self::UninterruptibleSleep),
            'T' => Some(Self::Stop),
            't' => Some(Self::StoppedByDebugger),
            'I' => Some(Self::Idle),
            'Z' => Some(Self::Zombie),
            'W' => Some(Self::Wait),
            'L' => Some(Self::Lock),
            _ => None,
        }
    }

    /// Value persisted in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Sleep => "Sleep",
            Self::UninterruptibleSleep => "Uninterruptible sleep",
            Self::Stop => "Stop",
            Self::StoppedByDebugger => "Stopped by debugger",
            Self::Idle => "Idle",
            Self::Zombie => "Zombie",
            Self::Wait => "Wait",
            Self::Lock => "Lock",
            Self::Undefined => "Undefined",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One process at one sampling instant.
///
/// Fields that could not be read are left empty or zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSample {
    pub pid: i32,
    pub parent_pid: i32,
    pub name: String,
    pub username: String,
    pub status: ProcessStatus,
    pub cpu_percent: f64,
    pub memory_percent: f32,
    pub cmdline: String,
    pub cwd: String,
    pub exe: String,
}
