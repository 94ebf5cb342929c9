use std::{fs::File, io::Write, path::Path, sync::Mutex};

use log::{LevelFilter, Log, Metadata, Record};

use osutils::files;

use super::LogEntry;

/// Writes every record as one JSON object per line. A file that cannot be
/// created disables the logger instead of failing the program.
pub struct FileLog {
    target: Option<Mutex<File>>,
    max_level: LevelFilter,
}

impl FileLog {
    pub fn new(target: impl AsRef<Path>) -> Self {
        let file = match files::create_file(target.as_ref()) {
            Ok(f) => Some(Mutex::new(f)),
            Err(err) => {
                eprintln!("Logging setup error: failed to create log file: {err:?}");
                None
            }
        };

        Self {
            target: file,
            max_level: LevelFilter::Trace,
        }
    }

    pub fn with_max_level(self, max_level: LevelFilter) -> Self {
        Self { max_level, ..self }
    }

    pub fn into_logger(self) -> Box<dyn Log> {
        Box::new(self)
    }

    fn write_entry(&self, record: &Record) -> Result<(), Box<dyn std::error::Error + '_>> {
        if let Some(file) = self.target.as_ref() {
            let mut serialized = serde_json::to_string(&LogEntry::from(record))?;
            serialized.push('\n');

            let mut file = file.lock()?;
            file.write_all(serialized.as_bytes())?;
        }
        Ok(())
    }
}

impl Log for FileLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.target.is_some() && metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        // Losing a line is better than failing the operation being logged
        let _ = self.write_entry(record);
    }

    fn flush(&self) {
        if let Some(Ok(mut file)) = self.target.as_ref().map(Mutex::lock) {
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use log::Level;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_filter() {
        let dir = tempdir().unwrap();
        let logger = FileLog::new(dir.path().join("storagectl.log"))
            .with_max_level(LevelFilter::Info)
            .into_logger();

        assert!(logger.enabled(&Metadata::builder().level(Level::Warn).build()));
        assert!(!logger.enabled(&Metadata::builder().level(Level::Debug).build()));
    }

    #[test]
    fn test_unusable_target() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as log file
        let log = FileLog::new(dir.path());
        assert!(log.target.is_none());
        assert!(!log
            .into_logger()
            .enabled(&Metadata::builder().level(Level::Error).build()));
    }

    #[test]
    fn test_json_lines() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("logs/storagectl.log");
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        fs::write(&target, "stale content\n").unwrap();

        let logger = FileLog::new(&target).into_logger();
        for message in ["Probing", "Committing 3 actions"] {
            logger.log(
                &Record::builder()
                    .args(format_args!("{message}"))
                    .level(Level::Info)
                    .target("storagectl::storage")
                    .module_path(Some("storagectl::storage"))
                    .file(Some(file!()))
                    .line(Some(12))
                    .build(),
            );
        }
        logger.flush();

        let content = fs::read_to_string(target).unwrap();
        let entries: Vec<LogEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "Probing");
        assert_eq!(entries[1].message, "Committing 3 actions");
        assert_eq!(entries[1].level, Level::Info);
        assert_eq!(entries[1].target, "storagectl::storage");
        assert_eq!(entries[1].line, 12);
    }
}
