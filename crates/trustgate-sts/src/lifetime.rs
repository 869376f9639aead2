use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use trustgate_config::LifetimeSettings;

use crate::error::{StsError, StsResult};

/// Lifetime a client asked for. Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestedLifetime {
    pub created: Option<OffsetDateTime>,
    pub expires: Option<OffsetDateTime>,
}

/// Validity window of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl Lifetime {
    #[must_use]
    pub fn starting_at(created: OffsetDateTime, span: Duration) -> Self {
        Self {
            created,
            expires: created + span,
        }
    }

    #[must_use]
    pub fn span(&self) -> Duration {
        self.expires - self.created
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifetimePolicy {
    pub default: Duration,
    pub max: Duration,
    pub accept_client_lifetime: bool,
    pub fail_lifetime_exceedance: bool,
    pub future_time_to_live: Duration,
}

impl Default for LifetimePolicy {
    fn default() -> Self {
        Self {
            default: Duration::seconds(300),
            max: Duration::hours(12),
            accept_client_lifetime: false,
            fail_lifetime_exceedance: true,
            future_time_to_live: Duration::seconds(60),
        }
    }
}

impl LifetimePolicy {
    pub fn from_settings(settings: &LifetimeSettings) -> StsResult<Self> {
        let convert = |d: std::time::Duration| {
            Duration::try_from(d).map_err(|e| StsError::configuration(e.to_string()))
        };
        Ok(Self {
            default: convert(settings.default)?,
            max: convert(settings.max)?,
            accept_client_lifetime: settings.accept_client_lifetime,
            fail_lifetime_exceedance: settings.fail_lifetime_exceedance,
            future_time_to_live: convert(settings.future_time_to_live)?,
        })
    }

    #[must_use]
    pub fn accepting_client_lifetime(mut self) -> Self {
        self.accept_client_lifetime = true;
        self
    }

    /// Resolves the lifetime of a token issued at `now`.
    pub fn resolve(
        &self,
        requested: Option<&RequestedLifetime>,
        now: OffsetDateTime,
    ) -> StsResult<Lifetime> {
        let requested = match requested {
            Some(r) if self.accept_client_lifetime && (r.created.is_some() || r.expires.is_some()) => r,
            Some(_) => {
                tracing::debug!("Client lifetime ignored, using default lifetime");
                return Ok(Lifetime::starting_at(now, self.default));
            }
            None => return Ok(Lifetime::starting_at(now, self.default)),
        };

        let created = requested.created.unwrap_or(now);
        if created > now + self.future_time_to_live {
            return Err(StsError::invalid_time_range(
                "requested Created time lies too far in the future",
            ));
        }
        let mut expires = requested.expires.unwrap_or(created + self.default);
        if expires <= created {
            return Err(StsError::invalid_time_range("Expires must be after Created"));
        }
        if expires <= now {
            return Err(StsError::invalid_time_range("requested lifetime has already ended"));
        }
        if expires - created > self.max {
            if self.fail_lifetime_exceedance {
                return Err(StsError::invalid_time_range(format!(
                    "requested lifetime exceeds the maximum of {} seconds",
                    self.max.whole_seconds()
                )));
            }
            tracing::debug!(max = self.max.whole_seconds(), "Requested lifetime clamped");
            expires = created + self.max;
        }
        Ok(Lifetime { created, expires })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[test]
    fn test_default_lifetime() {
        let now = now();
        let lifetime = LifetimePolicy::default().resolve(None, now).unwrap();
        assert_eq!(lifetime.created, now);
        assert_eq!(lifetime.span(), Duration::seconds(300));
    }

    #[test]
    fn test_client_lifetime_ignored_unless_accepted() {
        let now = now();
        let requested = RequestedLifetime {
            created: Some(now),
            expires: Some(now + Duration::hours(1)),
        };
        let lifetime = LifetimePolicy::default().resolve(Some(&requested), now).unwrap();
        assert_eq!(lifetime.span(), Duration::seconds(300));

        let accepted = LifetimePolicy::default()
            .accepting_client_lifetime()
            .resolve(Some(&requested), now)
            .unwrap();
        assert_eq!(accepted.span(), Duration::hours(1));
    }

    #[test]
    fn test_future_created_rejected() {
        let now = now();
        let requested = RequestedLifetime {
            created: Some(now + Duration::minutes(5)),
            expires: Some(now + Duration::minutes(10)),
        };
        let err = LifetimePolicy::default()
            .accepting_client_lifetime()
            .resolve(Some(&requested), now)
            .unwrap_err();
        assert!(matches!(err, StsError::InvalidTimeRange { .. }));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let now = now();
        let requested = RequestedLifetime {
            created: Some(now),
            expires: Some(now - Duration::minutes(1)),
        };
        assert!(
            LifetimePolicy::default()
                .accepting_client_lifetime()
                .resolve(Some(&requested), now)
                .is_err()
        );
    }

    #[test]
    fn test_exceedance_fails_or_clamps() {
        let now = now();
        let requested = RequestedLifetime {
            created: Some(now),
            expires: Some(now + Duration::hours(24)),
        };
        let policy = LifetimePolicy::default().accepting_client_lifetime();
        assert!(policy.resolve(Some(&requested), now).is_err());

        let lenient = LifetimePolicy {
            fail_lifetime_exceedance: false,
            ..policy
        };
        let lifetime = lenient.resolve(Some(&requested), now).unwrap();
        assert_eq!(lifetime.span(), Duration::hours(12));
    }
}
