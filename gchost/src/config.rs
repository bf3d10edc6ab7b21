use {std::env, tracing::warn};

/// What the host does when it hits a fatal condition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FatalPolicy
{
    /// Abort the process, like an embedded runtime would.
    Abort,

    /// Unwind with a [`Fatal`][`crate::Fatal`] payload.
    ///
    /// Nothing in this workspace catches that payload,
    /// so the unwind reaches the test harness or the thread boundary.
    Unwind,
}

/// Tunables of a host.
#[derive(Clone, Debug)]
pub struct HostConfig
{
    /// Maximum number of entries on the protect stack.
    pub protect_stack_size: usize,

    /// Maximum number of entries in the precious set.
    pub precious_limit: usize,

    /// Longest vector that can be allocated.
    pub max_vector_length: usize,

    /// Collect garbage before every allocation.
    ///
    /// This is extremely slow, but any object that is not properly
    /// protected is reclaimed at the first opportunity,
    /// so protection bugs surface immediately.
    pub gc_torture: bool,

    pub fatal: FatalPolicy,
}

impl Default for HostConfig
{
    fn default() -> Self
    {
        Self{
            protect_stack_size: 50_000,
            precious_limit: 1 << 20,
            max_vector_length: i32::MAX as usize,
            gc_torture: false,
            fatal: FatalPolicy::Abort,
        }
    }
}

impl HostConfig
{
    /// The default configuration with overrides from the environment.
    ///
    /// `GCHOST_MAX_PPSIZE` sets [`protect_stack_size`][`Self::protect_stack_size`],
    /// `GCHOST_GCTORTURE` (any value other than `0`) enables
    /// [`gc_torture`][`Self::gc_torture`].
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self
    {
        let mut config = Self::default();

        if let Ok(value) = env::var("GCHOST_MAX_PPSIZE") {
            match value.parse() {
                Ok(size) => config.protect_stack_size = size,
                Err(err) => warn!(%value, %err, "ignoring GCHOST_MAX_PPSIZE"),
            }
        }

        if let Ok(value) = env::var("GCHOST_GCTORTURE") {
            config.gc_torture = value != "0";
        }

        config
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn from_env_overrides_defaults()
    {
        env::set_var("GCHOST_MAX_PPSIZE", "128");
        env::set_var("GCHOST_GCTORTURE", "1");
        let config = HostConfig::from_env();
        assert_eq!(config.protect_stack_size, 128);
        assert!(config.gc_torture);
        assert_eq!(config.fatal, FatalPolicy::Abort);

        env::set_var("GCHOST_MAX_PPSIZE", "lots");
        env::set_var("GCHOST_GCTORTURE", "0");
        let config = HostConfig::from_env();
        assert_eq!(config.protect_stack_size, 50_000);
        assert!(!config.gc_torture);
    }
}
