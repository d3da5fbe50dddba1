use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const DEFAULT_LOG_FILTER: &str = "warn,qa_chatbot=info";
const DEFAULT_LOG_FILE_PATH: &str = "logs/qa-chatbot.log";
const DEFAULT_LOG_FILE_NAME: &str = "qa-chatbot.log";

/// Keeps the non-blocking file writer flushing until the process exits.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Both => "both",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            format: parse_log_format(get_var("LOG_FORMAT").as_deref()),
            output: parse_log_output(get_var("LOG_OUTPUT").as_deref()),
            file_path: parse_log_file_path(get_var("LOG_FILE_PATH").as_deref()),
        }
    }
}

fn normalized(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_ascii_lowercase()
}

fn parse_log_format(raw: Option<&str>) -> LogFormat {
    match normalized(raw).as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

fn parse_log_output(raw: Option<&str>) -> LogOutput {
    match normalized(raw).as_str() {
        "file" => LogOutput::File,
        "both" => LogOutput::Both,
        _ => LogOutput::Stderr,
    }
}

fn parse_log_file_path(raw: Option<&str>) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH))
}

/// Daily-rotated file writer; the directory is created on demand.
fn rolling_file_writer(path: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE_NAME));

    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn install(format: LogFormat, writer: BoxMakeWriter) -> InitResult {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

fn file_writer_or_stderr(settings: &LogSettings) -> (BoxMakeWriter, Option<WorkerGuard>) {
    let with_stderr = settings.output == LogOutput::Both;

    match rolling_file_writer(&settings.file_path) {
        Ok((file, guard)) => {
            let writer = if with_stderr {
                BoxMakeWriter::new(std::io::stderr.and(file))
            } else {
                BoxMakeWriter::new(file)
            };
            (writer, Some(guard))
        }
        Err(err) => {
            eprintln!(
                "qa-chatbot: failed to initialize LOG_OUTPUT={} at '{}': {}; {}",
                settings.output.as_str(),
                settings.file_path.display(),
                err,
                if with_stderr {
                    "using stderr only"
                } else {
                    "using stderr instead"
                }
            );
            (BoxMakeWriter::new(std::io::stderr), None)
        }
    }
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let (writer, guard) = match settings.output {
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), None),
        LogOutput::File | LogOutput::Both => file_writer_or_stderr(settings),
    };

    if install(settings.format, writer).is_ok()
        && let Some(guard) = guard
    {
        let _ = FILE_GUARD.set(guard);
    }
}
