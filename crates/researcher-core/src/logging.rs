use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

pub const LOG_DIR_ENV: &str = "RESEARCHER_LOG_DIR";
pub const RETENTION_ENV: &str = "RESEARCHER_LOG_RETENTION_DAYS";
const DEFAULT_RETENTION_DAYS: u64 = 90;

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret",
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token",
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

/// Where finished runs are journaled and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogSettings {
    pub dir: PathBuf,
    pub retention_days: u64,
}

impl RunLogSettings {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    pub fn with_retention_days(mut self, days: u64) -> Self {
        self.retention_days = days;
        self
    }

    /// Enabled only when `RESEARCHER_LOG_DIR` is set.
    pub fn from_env() -> Option<Self> {
        let dir = std::env::var(LOG_DIR_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())?;
        let retention = std::env::var(RETENTION_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        Some(Self::new(dir).with_retention_days(retention))
    }
}

#[derive(Debug, Clone)]
pub struct RunLogInput {
    pub run_id: String,
    pub host: String,
    pub status: &'static str,
    pub query: String,
    pub report_chars: usize,
    pub log_count: usize,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct RunLogRecord {
    timestamp: String,
    run_id: String,
    host: String,
    status: &'static str,
    query: String,
    report_chars: usize,
    log_count: usize,
    error: Option<String>,
    redactions: Vec<&'static str>,
}

#[derive(Serialize)]
struct AuditLogRecord<'a> {
    timestamp: &'a str,
    run_id: &'a str,
    redactions: &'a [&'static str],
}

impl RunLogSettings {
    fn month_dir(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{:04}", timestamp.year()))
            .join(format!("{:02}", timestamp.month()))
    }

    /// Delete journal files older than the retention window, then empty directories.
    fn prune(&self) -> Result<()> {
        if self.retention_days == 0 || !self.dir.exists() {
            return Ok(());
        }
        let window = Duration::from_secs(self.retention_days.saturating_mul(86_400));
        let cutoff = SystemTime::now()
            .checked_sub(window)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        prune_older_than(&self.dir, cutoff)
    }
}

/// Masks secrets and remembers which patterns fired.
#[derive(Default)]
struct Redactor {
    fired: BTreeSet<&'static str>,
}

impl Redactor {
    fn redact(&mut self, input: &str) -> String {
        let mut output = input.to_string();
        for (name, regex) in REDACTION_PATTERNS.iter() {
            if !regex.is_match(&output) {
                continue;
            }
            output = regex
                .replace_all(&output, |caps: &Captures| match caps.get(2) {
                    Some(_) => format!("{}[REDACTED]", &caps[1]),
                    None => "[REDACTED]".to_string(),
                })
                .into_owned();
            self.fired.insert(name);
        }
        output
    }

    fn fields(&self) -> Vec<&'static str> {
        self.fired.iter().copied().collect()
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer
        .write_all(b"\n")
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Append one finished run to `<dir>/<yyyy>/<mm>/runs.jsonl`, redacting secrets.
pub fn log_run_completion(settings: &RunLogSettings, input: RunLogInput) -> Result<()> {
    let timestamp = Utc::now();
    let mut redactor = Redactor::default();

    let record = RunLogRecord {
        timestamp: timestamp.to_rfc3339(),
        query: redactor.redact(&input.query),
        error: input.error.as_deref().map(|error| redactor.redact(error)),
        redactions: redactor.fields(),
        run_id: input.run_id,
        host: input.host,
        status: input.status,
        report_chars: input.report_chars,
        log_count: input.log_count,
    };

    let month_dir = settings.month_dir(timestamp);
    append_json_line(&month_dir.join("runs.jsonl"), &record)?;

    if !record.redactions.is_empty() {
        let audit = AuditLogRecord {
            timestamp: &record.timestamp,
            run_id: &record.run_id,
            redactions: &record.redactions,
        };
        append_json_line(&month_dir.join("audit.jsonl"), &audit)?;
        warn!(
            run_id = %record.run_id,
            fields = ?record.redactions,
            "redacted potential secrets from run log"
        );
    }

    settings.prune()
}

fn prune_older_than(dir: &Path, cutoff: SystemTime) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_older_than(&path, cutoff)?;
            if path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
            continue;
        }
        let expired = metadata.modified().is_ok_and(|modified| modified < cutoff);
        if metadata.is_file() && expired {
            fs::remove_file(&path).ok();
        }
    }

    Ok(())
}
