use log::{LevelFilter, Log, Metadata};

/// Fans log records out to several loggers.
pub struct MultiLogger {
    loggers: Vec<Box<dyn Log>>,
    max_level: LevelFilter,
    target_filters: Vec<(String, LevelFilter)>,
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
            max_level: LevelFilter::Trace,
            target_filters: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn Log>) -> Self {
        self.loggers.push(logger);
        self
    }

    pub fn with_max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    /// Caps the level of all records whose target starts with `target`, for
    /// every logger.
    pub fn with_target_filter(mut self, target: impl Into<String>, level: LevelFilter) -> Self {
        self.target_filters.push((target.into(), level));
        self
    }

    pub fn add_logger(&mut self, logger: Box<dyn Log>) {
        self.loggers.push(logger);
    }

    pub fn init(self) -> Result<(), log::SetLoggerError> {
        log::set_max_level(self.max_level);
        log::set_boxed_logger(Box::new(self))
    }

    fn passes_filters(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
            && self
                .target_filters
                .iter()
                .filter(|(target, _)| metadata.target().starts_with(target.as_str()))
                .all(|(_, level)| metadata.level() <= *level)
    }
}

impl Log for MultiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.passes_filters(metadata) && self.loggers.iter().any(|l| l.enabled(metadata))
    }

    fn log(&self, record: &log::Record) {
        if !self.passes_filters(record.metadata()) {
            return;
        }
        self.loggers
            .iter()
            .filter(|l| l.enabled(record.metadata()))
            .for_each(|l| l.log(record));
    }

    fn flush(&self) {
        self.loggers.iter().for_each(|l| l.flush());
    }
}
