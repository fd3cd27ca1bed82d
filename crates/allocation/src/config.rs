//! Allocator configuration.

use anyhow::Context;
use serde::Deserialize;

/// Environment variable overriding [`AllocatorConfig::max_fraction_digits`].
pub const MAX_FRACTION_DIGITS_ENV: &str = "FULFIL_MAX_FRACTION_DIGITS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Fraction digits accepted in a proposed quantity (`0` = whole units only).
    pub max_fraction_digits: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_fraction_digits: 4,
        }
    }
}

impl AllocatorConfig {
    /// Defaults overridden by `FULFIL_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_FRACTION_DIGITS_ENV) {
            config.max_fraction_digits = raw
                .trim()
                .parse()
                .with_context(|| format!("{MAX_FRACTION_DIGITS_ENV} must be a non-negative integer, got {raw:?}"))?;
        }
        Ok(config)
    }
}
