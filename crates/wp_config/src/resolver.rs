//! Profile catalog and selector resolution.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::profile::Profile;

/// Profile used when the selector is absent or unknown.
pub const DEFAULT_PROFILE: &str = "dev";

const BUILTIN_PROFILES: [(&str, &str); 2] = [
    ("dev", include_str!("../profiles/dev.yaml")),
    ("prod", include_str!("../profiles/prod.yaml")),
];

/// A closed set of validated profiles.
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileCatalog {
    /// Load the profiles embedded in this crate.
    pub fn builtin() -> ConfigResult<Self> {
        let mut profiles = Vec::with_capacity(BUILTIN_PROFILES.len());
        for (name, document) in BUILTIN_PROFILES {
            let profile: Profile =
                serde_yaml::from_str(document).map_err(|source| ConfigError::Malformed {
                    name: name.to_string(),
                    source,
                })?;
            profiles.push(profile);
        }
        Self::from_profiles(profiles)
    }

    /// Build a catalog from already-parsed profiles.
    ///
    /// Every profile is validated and the default profile must be present.
    pub fn from_profiles(profiles: impl IntoIterator<Item = Profile>) -> ConfigResult<Self> {
        let mut catalog = BTreeMap::new();
        for profile in profiles {
            profile.validate()?;
            let name = profile.name.clone();
            if catalog.insert(name.clone(), profile).is_some() {
                return Err(ConfigError::DuplicateProfile(name));
            }
        }

        if !catalog.contains_key(DEFAULT_PROFILE) {
            return Err(ConfigError::MissingDefault(DEFAULT_PROFILE.to_string()));
        }

        debug!("Loaded {} profiles", catalog.len());
        Ok(Self { profiles: catalog })
    }

    /// Pick the profile for a selector, falling back to the default one.
    pub fn resolve(&self, selector: Option<&str>) -> &Profile {
        let selected = selector
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|name| {
                let found = self.profiles.get(name);
                if found.is_none() {
                    warn!("Unknown environment '{}', using '{}'", name, DEFAULT_PROFILE);
                }
                found
            });

        match selected {
            Some(profile) => profile,
            None => {
                debug!("Resolved default profile '{}'", DEFAULT_PROFILE);
                &self.profiles[DEFAULT_PROFILE]
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(|s| s.as_str()).collect()
    }
}

/// Resolve a selector against the built-in catalog.
pub fn resolve(selector: Option<&str>) -> ConfigResult<Profile> {
    let catalog = ProfileCatalog::builtin()?;
    Ok(catalog.resolve(selector).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DatabaseConfig;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ProfileCatalog::builtin().unwrap();
        assert_eq!(catalog.names(), vec!["dev", "prod"]);
    }

    #[test]
    fn test_resolve_known_selector() {
        let profile = resolve(Some("prod")).unwrap();
        assert_eq!(profile.name, "prod");
        assert!(profile.production);
        assert!(matches!(profile.database, DatabaseConfig::Provisioned(_)));
        assert_eq!(profile.network.nat_count, 3);
    }

    #[test]
    fn test_missing_selector_falls_back_to_dev() {
        let profile = resolve(None).unwrap();
        assert_eq!(profile.name, "dev");
        assert!(!profile.production);
        assert!(matches!(profile.database, DatabaseConfig::Serverless(_)));
    }

    #[test]
    fn test_unknown_selector_falls_back_to_dev() {
        assert_eq!(resolve(Some("sandbox")).unwrap().name, "dev");
        assert_eq!(resolve(Some("  ")).unwrap().name, "dev");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let catalog = ProfileCatalog::builtin().unwrap();
        assert_eq!(catalog.resolve(Some("nope")), catalog.resolve(None));
    }

    #[test]
    fn test_catalog_requires_default() {
        let catalog = ProfileCatalog::builtin().unwrap();
        let prod = catalog.get("prod").unwrap().clone();
        let err = ProfileCatalog::from_profiles(vec![prod]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDefault(_)));
    }

    #[test]
    fn test_catalog_rejects_invalid_profile() {
        let catalog = ProfileCatalog::builtin().unwrap();
        let mut dev = catalog.get("dev").unwrap().clone();
        dev.network.nat_count = 5;
        let err = ProfileCatalog::from_profiles(vec![dev]).unwrap_err();
        assert_eq!(err.field(), Some("network.nat_count"));
    }
}
