//! Supported providers and their metadata.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, UpkeepError};

// =============================================================================
// Provider Enum
// =============================================================================

/// External services an application can be attached to.
///
/// The set is closed: credentials and bindings can only reference these slugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Source control (workflow runs).
    Github,
    /// Hosting platform.
    Vercel,
    /// CDN / Pages.
    Cloudflare,
}

impl Provider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[Self::Github, Self::Vercel, Self::Cloudflare];

    /// Stable slug used in storage, config and the CLI.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Vercel => "vercel",
            Self::Cloudflare => "cloudflare",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Github => "GitHub",
            Self::Vercel => "Vercel",
            Self::Cloudflare => "Cloudflare",
        }
    }

    /// Parse from a slug (case-insensitive).
    ///
    /// # Errors
    /// Returns a validation error for slugs outside the provider set.
    pub fn from_slug(slug: &str) -> Result<Self> {
        let lower = slug.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.slug() == lower)
            .copied()
            .ok_or_else(|| {
                UpkeepError::validation("provider", format!("unknown provider '{slug}'"))
            })
    }

    /// Default REST API base URL.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Github => "https://api.github.com",
            Self::Vercel => "https://api.vercel.com",
            Self::Cloudflare => "https://api.cloudflare.com/client/v4",
        }
    }

    /// Default timeout for a single provider call.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        Duration::from_secs(10)
    }

    /// What a binding's `resource` string names for this provider.
    #[must_use]
    pub const fn resource_hint(self) -> &'static str {
        match self {
            Self::Github => "owner/repo",
            Self::Vercel => "project id or name",
            Self::Cloudflare => "account_id/project",
        }
    }

    /// Whether a credential for this provider may carry a team identifier.
    #[must_use]
    pub const fn supports_team(self) -> bool {
        matches!(self, Self::Vercel)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

impl std::str::FromStr for Provider {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slug(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slug_is_case_insensitive() {
        assert_eq!(Provider::from_slug("GitHub").unwrap(), Provider::Github);
        assert_eq!(Provider::from_slug(" vercel ").unwrap(), Provider::Vercel);
    }

    #[test]
    fn from_slug_rejects_unknown_provider() {
        let err = Provider::from_slug("netlify").unwrap_err();
        assert!(matches!(err, UpkeepError::Validation { ref field, .. } if field == "provider"));
    }

    #[test]
    fn slug_round_trips_for_all_providers() {
        for &p in Provider::ALL {
            assert_eq!(Provider::from_slug(p.slug()).unwrap(), p);
            assert_eq!(p.to_string(), p.slug());
        }
    }

    #[test]
    fn only_vercel_carries_team() {
        assert!(Provider::Vercel.supports_team());
        assert!(!Provider::Github.supports_team());
        assert!(!Provider::Cloudflare.supports_team());
    }
}
