//! Backup configuration.

/// Configuration shared by the replicas of one backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Capacity of every segment, and the minimum frame size.
    pub segment_size: usize,

    /// Number of frames the backup's storage holds.
    pub frame_count: usize,

    /// Worker threads for storage writes and loads (0 = run on the caller).
    pub io_threads: usize,

    /// Worker threads for eager recovery builds (0 = run on the caller).
    pub recovery_threads: usize,

    /// Whether `open` waits for the initial persistence by default.
    pub sync_open: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            segment_size: Self::DEFAULT_SEGMENT_SIZE,
            frame_count: 64,
            io_threads: 2,
            recovery_threads: 1,
            sync_open: false,
        }
    }
}

impl BackupConfig {
    /// Default segment capacity (8 MiB).
    pub const DEFAULT_SEGMENT_SIZE: usize = 8 * 1024 * 1024;

    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment capacity.
    #[must_use]
    pub const fn segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the number of storage frames.
    #[must_use]
    pub const fn frame_count(mut self, count: usize) -> Self {
        self.frame_count = count;
        self
    }

    /// Sets the number of storage worker threads.
    #[must_use]
    pub const fn io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    /// Sets the number of recovery worker threads.
    #[must_use]
    pub const fn recovery_threads(mut self, threads: usize) -> Self {
        self.recovery_threads = threads;
        self
    }

    /// Sets whether `open` waits for the initial persistence by default.
    #[must_use]
    pub const fn sync_open(mut self, value: bool) -> Self {
        self.sync_open = value;
        self
    }

    /// Configuration that runs every job on the calling thread.
    ///
    /// Useful for tests that want deterministic ordering.
    #[must_use]
    pub fn inline() -> Self {
        Self::default().io_threads(0).recovery_threads(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BackupConfig::default();
        assert_eq!(config.segment_size, 8 * 1024 * 1024);
        assert_eq!(config.frame_count, 64);
        assert_eq!(config.io_threads, 2);
        assert_eq!(config.recovery_threads, 1);
        assert!(!config.sync_open);
    }

    #[test]
    fn builder_pattern() {
        let config = BackupConfig::new()
            .segment_size(64 * 1024)
            .frame_count(2)
            .sync_open(true);

        assert_eq!(config.segment_size, 64 * 1024);
        assert_eq!(config.frame_count, 2);
        assert!(config.sync_open);
    }

    #[test]
    fn inline_has_no_workers() {
        let config = BackupConfig::inline();
        assert_eq!(config.io_threads, 0);
        assert_eq!(config.recovery_threads, 0);
    }
}
