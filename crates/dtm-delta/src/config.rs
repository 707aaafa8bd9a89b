//! Delta service configuration.

use chrono::{FixedOffset, NaiveDateTime, Offset as _, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use dtm_core::{Error, Result, validate_name};

/// Default number of read-check-write attempts per executor.
pub const DEFAULT_MAX_CAS_RETRIES: usize = 16;

/// Configuration for [`crate::DeltaService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaServiceConfig {
    /// Environment name; datamart roots live under `/{env_name}`.
    pub env_name: String,
    /// Time zone for delta dates, as a fixed UTC offset.
    #[serde(with = "offset_serde")]
    pub time_zone: FixedOffset,
    /// Maximum attempts for an executor's read-check-write cycle before it
    /// reports a conflict.
    pub max_cas_retries: usize,
}

impl Default for DeltaServiceConfig {
    fn default() -> Self {
        Self {
            env_name: "dev".to_string(),
            time_zone: Utc.fix(),
            max_cas_retries: DEFAULT_MAX_CAS_RETRIES,
        }
    }
}

impl DeltaServiceConfig {
    /// Creates a config for `env_name` with defaults for everything else.
    #[must_use]
    pub fn for_env(env_name: impl Into<String>) -> Self {
        Self {
            env_name: env_name.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// - `DTM_ENV_NAME`: environment name (default `dev`)
    /// - `DTM_TIME_ZONE`: UTC offset such as `+03:00` (default `+00:00`)
    /// - `DTM_DELTA_MAX_CAS_RETRIES`: executor attempts (default 16)
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value or the
    /// resulting config fails validation.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(env_name) = env_string("DTM_ENV_NAME") {
            config.env_name = env_name;
        }
        if let Some(offset) = env_string("DTM_TIME_ZONE") {
            config.time_zone = parse_offset("DTM_TIME_ZONE", &offset)?;
        }
        if let Some(retries) = env_usize("DTM_DELTA_MAX_CAS_RETRIES")? {
            config.max_cas_retries = retries;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment name is invalid or retries are zero.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.env_name, "DTM_ENV_NAME")?;
        if self.max_cas_retries == 0 {
            return Err(Error::InvalidInput(
                "DTM_DELTA_MAX_CAS_RETRIES must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Current local time in the configured zone, truncated to whole seconds.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        Utc::now()
            .with_timezone(&self.time_zone)
            .naive_local()
            .trunc_subsecs(0)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<usize>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
}

fn parse_offset(name: &str, value: &str) -> Result<FixedOffset> {
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return Ok(Utc.fix());
    }
    value.parse::<FixedOffset>().map_err(|e| {
        Error::InvalidInput(format!("{name} must be a UTC offset such as +03:00: {e}"))
    })
}

mod offset_serde {
    use chrono::FixedOffset;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(offset: &FixedOffset, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(offset)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FixedOffset, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::parse_offset("time_zone", &value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DeltaServiceConfig::default();
        assert_eq!(config.env_name, "dev");
        assert_eq!(config.time_zone.local_minus_utc(), 0);
        assert_eq!(config.max_cas_retries, DEFAULT_MAX_CAS_RETRIES);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(
            parse_offset("X", "+03:00").unwrap().local_minus_utc(),
            3 * 3600
        );
        assert_eq!(parse_offset("X", "UTC").unwrap().local_minus_utc(), 0);
        assert!(parse_offset("X", "Europe/Moscow").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DeltaServiceConfig::for_env("Bad Env");
        assert!(config.validate().is_err());

        config.env_name = "test".into();
        config.max_cas_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_now_has_whole_seconds() {
        let config = DeltaServiceConfig::default();
        assert_eq!(config.now().and_utc().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_serde_roundtrip_uses_offset_string() {
        let config = DeltaServiceConfig {
            time_zone: FixedOffset::east_opt(3 * 3600).unwrap(),
            ..DeltaServiceConfig::for_env("prod")
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["time_zone"], "+03:00");
        let back: DeltaServiceConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
