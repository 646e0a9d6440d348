//! Foreground-process probe seam.
//!
//! The production probe is OS-specific and owned by the platform adapter;
//! the core only needs an optional process name. Headless hosts can pin one
//! via configuration.

/// Reports the process that currently owns the foreground window, if known.
pub trait ForegroundProbe: Send + Sync {
    fn foreground_process(&self) -> Option<String>;
}

/// Probe backed by configuration; returns the pinned name or nothing.
#[derive(Debug, Default)]
pub struct ConfiguredForeground {
    pinned: Option<String>,
}

impl ConfiguredForeground {
    pub fn new(pinned: Option<String>) -> Self {
        Self { pinned }
    }
}

impl ForegroundProbe for ConfiguredForeground {
    fn foreground_process(&self) -> Option<String> {
        self.pinned.clone()
    }
}

/// Fixed-value probe for tests.
#[derive(Debug)]
pub struct StaticForeground(pub Option<String>);

impl ForegroundProbe for StaticForeground {
    fn foreground_process(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_probe_returns_pin() {
        assert_eq!(
            ConfiguredForeground::new(Some("EliteDangerous64.exe".into())).foreground_process(),
            Some("EliteDangerous64.exe".into())
        );
        assert_eq!(ConfiguredForeground::new(None).foreground_process(), None);
    }
}
