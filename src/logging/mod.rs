use serde::{Deserialize, Serialize};

pub(super) mod file_log;
pub(super) mod multilog;

/// One line of the JSON log file.
#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    #[serde(with = "lowercase_level")]
    pub level: log::Level,
    pub message: String,
    pub target: String,
    pub module: String,
    pub file: String,
    pub line: u32,
}

/// Levels are written as `error`, `warn`, ..., `trace`.
mod lowercase_level {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(level: &log::Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<log::Level, D::Error> {
        let level = String::deserialize(deserializer)?;
        level.parse().map_err(D::Error::custom)
    }
}

impl From<&log::Record<'_>> for LogEntry {
    fn from(record: &log::Record) -> Self {
        Self {
            level: record.level(),
            message: record.args().to_string(),
            target: record.target().into(),
            module: record.module_path().unwrap_or_default().into(),
            file: record.file().unwrap_or_default().into(),
            line: record.line().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry() {
        let entry = LogEntry::from(
            &log::Record::builder()
                .args(format_args!("Creating partition /dev/sda1"))
                .level(log::Level::Warn)
                .target("storagectl::commit")
                .module_path(Some("storagectl::commit::system"))
                .file(Some("src/commit/system.rs"))
                .line(Some(7))
                .build(),
        );

        assert_eq!(entry.level, log::Level::Warn);
        assert_eq!(entry.message, "Creating partition /dev/sda1");
        assert_eq!(entry.module, "storagectl::commit::system");
        assert_eq!(entry.line, 7);

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""level":"warn""#), "{json}");

        let parsed: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.level, log::Level::Warn);
        assert_eq!(parsed.target, "storagectl::commit");
        assert_eq!(parsed.file, "src/commit/system.rs");

        serde_json::from_str::<LogEntry>(&json.replace("warn", "loud")).unwrap_err();
    }
}
