//! Log output: stdout always, plus an optional size-rotated file and an
//! optional syslog sink.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendCount, AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use syslog::{Facility, Formatter3164, Logger, LoggerBackend};
use tracing::{Level, Metadata};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logging options.
#[derive(clap::Args, Debug)]
pub struct LogArgs {
    /// Log level: trace, debug, info, warn (warning), error.
    #[arg(long, env = "STS_LOGGING_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write logs to a size-rotated file.
    #[arg(
        long,
        env = "STS_LOGGING_TO_FILE_ENABLED",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub log_to_file: bool,

    /// Log file path. Required with --log-to-file.
    #[arg(long, env = "STS_LOGGING_TO_FILE_FILENAME")]
    pub log_file: Option<String>,

    /// Size in megabytes at which the log file is rotated.
    #[arg(
        long,
        env = "STS_LOGGING_TO_FILE_FILE_SIZE_MB",
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub log_file_size_mb: u64,

    /// Rotated files to keep (0 keeps all).
    #[arg(
        long,
        env = "STS_LOGGING_TO_FILE_MAX_BACKUPS_FILES_NUMBER",
        default_value = "1"
    )]
    pub log_file_max_backups: usize,

    /// Days to keep rotated files (0 disables age-based removal).
    #[arg(long, env = "STS_LOGGING_TO_FILE_MAX_BACKUPS_FILE_AGE", default_value = "0")]
    pub log_file_max_age_days: u32,

    /// Also send logs to syslog.
    #[arg(
        long,
        env = "STS_LOGGING_TO_SYSLOG_ENABLED",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub log_to_syslog: bool,

    /// Syslog transport: udp, tcp or unix. Unset uses the local syslog socket.
    #[arg(long, env = "STS_SYSLOG_PROTOCOL")]
    pub syslog_protocol: Option<String>,

    /// Syslog server `host:port`, or socket path for unix.
    #[arg(long, env = "STS_SYSLOG_ADDRESS")]
    pub syslog_address: Option<String>,
}

/// Parses a level name. `fatal` and `panic` map to `error`.
pub fn parse_level(name: &str) -> Result<Level, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "warning" => Ok(Level::WARN),
        "fatal" | "panic" => Ok(Level::ERROR),
        other => Level::from_str(other).map_err(|_| format!("not a valid log level: {:?}", name)),
    }
}

fn build_filter(level: Level) -> Result<EnvFilter, String> {
    let mut filter = EnvFilter::from_default_env();
    for target in ["stsd", "sts_core"] {
        let directive = format!("{}={}", target, level)
            .parse()
            .map_err(|e| format!("invalid log directive: {}", e))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Initializes the global subscriber.
pub fn init_logging(args: &LogArgs) -> Result<(), String> {
    let filter = build_filter(parse_level(&args.log_level)?)?;

    let file_layer = if args.log_to_file {
        let path = args
            .log_file
            .as_deref()
            .ok_or_else(|| "--log-file is required when file logging is enabled".to_string())?;
        let max_bytes = usize::try_from(args.log_file_size_mb.saturating_mul(1024 * 1024))
            .unwrap_or(usize::MAX);
        let file = rotating_file(
            Path::new(path),
            max_bytes,
            args.log_file_max_backups,
            args.log_file_max_age_days,
        )?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    let syslog_layer = if args.log_to_syslog {
        let target = SyslogTarget::parse(
            args.syslog_protocol.as_deref(),
            args.syslog_address.as_deref(),
        )?;
        Some(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_ansi(false)
                .with_level(false)
                .with_target(false)
                .with_writer(SyslogMakeWriter::new(target.connect()?)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .with(syslog_layer)
        .try_init()
        .map_err(|e| format!("failed to initialize logging: {}", e))
}

/// Opens `path` for appending, rotating it once it reaches `max_bytes`.
///
/// With `max_age_days > 0` rotated files are removed by age, otherwise
/// `max_backups` of them are kept (all of them when 0).
pub fn rotating_file(
    path: &Path,
    max_bytes: usize,
    max_backups: usize,
    max_age_days: u32,
) -> Result<Box<dyn Write + Send>, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("failed to open log file {}: {}", path.display(), e))?;

    let limit = ContentLimit::Bytes(max_bytes);
    let file: Box<dyn Write + Send> = if max_age_days > 0 {
        let age = chrono::Duration::days(i64::from(max_age_days));
        Box::new(FileRotate::new(
            path,
            AppendTimestamp::default(FileLimit::Age(age)),
            limit,
            Compression::None,
            #[cfg(unix)]
            None,
        ))
    } else if max_backups == 0 {
        Box::new(FileRotate::new(
            path,
            AppendTimestamp::default(FileLimit::Unlimited),
            limit,
            Compression::None,
            #[cfg(unix)]
            None,
        ))
    } else {
        Box::new(FileRotate::new(
            path,
            AppendCount::new(max_backups),
            limit,
            Compression::None,
            #[cfg(unix)]
            None,
        ))
    };
    Ok(file)
}

/// Where syslog messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyslogTarget {
    /// The local syslog socket (`/dev/log` or equivalent).
    Local,
    Unix(String),
    Tcp(String),
    Udp(String),
}

impl SyslogTarget {
    pub fn parse(protocol: Option<&str>, address: Option<&str>) -> Result<Self, String> {
        let protocol = protocol.map(str::trim).unwrap_or("").to_ascii_lowercase();
        if protocol.is_empty() {
            return Ok(SyslogTarget::Local);
        }

        let address = address
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| format!("--syslog-address is required for protocol {}", protocol))?
            .to_string();

        match protocol.as_str() {
            "unix" | "unixgram" => Ok(SyslogTarget::Unix(address)),
            "tcp" => Ok(SyslogTarget::Tcp(address)),
            "udp" => Ok(SyslogTarget::Udp(address)),
            other => Err(format!("unsupported syslog protocol: {:?}", other)),
        }
    }

    fn connect(&self) -> Result<Logger<LoggerBackend, Formatter3164>, String> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: "stsd".to_string(),
            pid: std::process::id(),
        };

        let logger = match self {
            SyslogTarget::Local => syslog::unix(formatter),
            SyslogTarget::Unix(path) => syslog::unix_custom(formatter, path),
            SyslogTarget::Tcp(server) => syslog::tcp(formatter, server.as_str()),
            SyslogTarget::Udp(server) => syslog::udp(formatter, "0.0.0.0:0", server.as_str()),
        };
        logger.map_err(|e| format!("failed to connect to syslog ({:?}): {}", self, e))
    }
}

/// Hands each formatted event to syslog with the event's severity.
#[derive(Clone)]
struct SyslogMakeWriter {
    logger: Arc<Mutex<Logger<LoggerBackend, Formatter3164>>>,
}

impl SyslogMakeWriter {
    fn new(logger: Logger<LoggerBackend, Formatter3164>) -> Self {
        Self {
            logger: Arc::new(Mutex::new(logger)),
        }
    }
}

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> SyslogWriter {
        SyslogWriter {
            logger: self.logger.clone(),
            level: Level::INFO,
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> SyslogWriter {
        SyslogWriter {
            logger: self.logger.clone(),
            level: *meta.level(),
        }
    }
}

struct SyslogWriter {
    logger: Arc<Mutex<Logger<LoggerBackend, Formatter3164>>>,
    level: Level,
}

impl Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        let message = line.trim_end();
        if message.is_empty() {
            return Ok(buf.len());
        }

        let mut logger = self.logger.lock().unwrap_or_else(|e| e.into_inner());
        let sent = match self.level {
            Level::ERROR => logger.err(message),
            Level::WARN => logger.warning(message),
            Level::INFO => logger.info(message),
            _ => logger.debug(message),
        };
        sent.map_err(|e| io::Error::other(e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
