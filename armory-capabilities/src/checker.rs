//! Capability checkers and the canonical probe catalog.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use armory_primitives::CapabilityId;
use tracing::trace;

/// How a capability is detected against the local environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityProbe {
    /// Satisfied when the named binary is found on the search path.
    Binary(&'static str),
    /// Satisfied when the named environment variable is set and non-empty.
    EnvCredential(&'static str),
    /// Assumed satisfied unless explicitly overridden. Never probed live.
    Network,
}

/// Answers whether named runtime preconditions currently hold.
pub trait CapabilityChecker: Send + Sync {
    /// Returns `true` if the capability is available. Unknown identifiers
    /// are reported unavailable rather than failing.
    fn check(&self, capability: &CapabilityId) -> bool;

    /// Returns the subset of `capabilities` that fail [`check`](Self::check),
    /// preserving input order.
    fn check_all(&self, capabilities: &[CapabilityId]) -> Vec<CapabilityId> {
        capabilities
            .iter()
            .filter(|capability| !self.check(capability))
            .cloned()
            .collect()
    }

    /// Returns the currently satisfied subset of the checker's catalog.
    fn available(&self) -> Vec<CapabilityId>;
}

/// Environment-backed checker with deterministic override injection.
///
/// Overrides are consulted before any probe, which lets tests and pinned
/// deployments dictate capability state. The override map is mutated during
/// construction or test setup only and read thereafter, so it carries no
/// lock of its own.
#[derive(Debug)]
pub struct EnvCapabilityChecker {
    overrides: HashMap<CapabilityId, bool>,
    catalog: Vec<(CapabilityId, CapabilityProbe)>,
}

impl EnvCapabilityChecker {
    /// Creates a checker over the canonical capability catalog.
    ///
    /// # Panics
    ///
    /// Panics if a canonical identifier fails validation, which would be a
    /// programming error in this crate.
    #[must_use]
    pub fn new() -> Self {
        let catalog = [
            ("git", CapabilityProbe::Binary("git")),
            ("bash", CapabilityProbe::Binary("bash")),
            ("network", CapabilityProbe::Network),
            ("notion_api", CapabilityProbe::EnvCredential("NOTION_TOKEN")),
            ("github_api", CapabilityProbe::EnvCredential("GITHUB_TOKEN")),
            ("gitlab_api", CapabilityProbe::EnvCredential("GITLAB_TOKEN")),
            ("whisper", CapabilityProbe::EnvCredential("WHISPER_URL")),
            ("ollama", CapabilityProbe::Binary("ollama")),
        ]
        .into_iter()
        .map(|(id, probe)| (CapabilityId::new(id).expect("canonical id"), probe))
        .collect();

        Self {
            overrides: HashMap::new(),
            catalog,
        }
    }

    /// Creates a checker over a caller-supplied catalog.
    #[must_use]
    pub fn with_catalog(catalog: Vec<(CapabilityId, CapabilityProbe)>) -> Self {
        Self {
            overrides: HashMap::new(),
            catalog,
        }
    }

    /// Forces a capability to the supplied state ahead of live probing.
    pub fn set_override(&mut self, capability: CapabilityId, available: bool) {
        self.overrides.insert(capability, available);
    }

    /// Removes a previously injected override.
    pub fn clear_override(&mut self, capability: &CapabilityId) {
        self.overrides.remove(capability);
    }

    fn probe(&self, capability: &CapabilityId) -> bool {
        let Some((_, probe)) = self.catalog.iter().find(|(id, _)| id == capability) else {
            trace!(capability = %capability, "unknown capability treated as unavailable");
            return false;
        };

        match probe {
            CapabilityProbe::Binary(name) => binary_on_path(name),
            CapabilityProbe::EnvCredential(var) => {
                env::var(var).is_ok_and(|value| !value.is_empty())
            }
            CapabilityProbe::Network => true,
        }
    }
}

impl Default for EnvCapabilityChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityChecker for EnvCapabilityChecker {
    fn check(&self, capability: &CapabilityId) -> bool {
        if let Some(state) = self.overrides.get(capability) {
            return *state;
        }
        self.probe(capability)
    }

    fn available(&self) -> Vec<CapabilityId> {
        self.catalog
            .iter()
            .map(|(id, _)| id)
            .filter(|id| self.check(id))
            .cloned()
            .collect()
    }
}

fn binary_on_path(name: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };

    env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> CapabilityId {
        CapabilityId::new(name).expect("id")
    }

    #[test]
    fn override_wins_over_probe() {
        let mut checker = EnvCapabilityChecker::new();
        checker.set_override(id("network"), false);
        assert!(!checker.check(&id("network")));

        checker.clear_override(&id("network"));
        assert!(checker.check(&id("network")));
    }

    #[test]
    fn unknown_capability_is_unavailable() {
        let checker = EnvCapabilityChecker::new();
        assert!(!checker.check(&id("quantum_tunnel")));
    }

    #[test]
    fn check_all_reports_missing_in_input_order() {
        let mut checker = EnvCapabilityChecker::new();
        checker.set_override(id("git"), false);
        checker.set_override(id("bash"), true);
        checker.set_override(id("ollama"), false);

        let missing = checker.check_all(&[id("git"), id("bash"), id("ollama")]);
        assert_eq!(missing, vec![id("git"), id("ollama")]);
    }

    #[test]
    fn shell_binary_is_found_on_path() {
        let checker =
            EnvCapabilityChecker::with_catalog(vec![(id("shell"), CapabilityProbe::Binary("sh"))]);
        assert!(checker.check(&id("shell")));
    }

    #[test]
    fn absent_credential_is_unavailable() {
        let checker = EnvCapabilityChecker::with_catalog(vec![(
            id("phantom_api"),
            CapabilityProbe::EnvCredential("ARMORY_TEST_PHANTOM_TOKEN"),
        )]);
        assert!(!checker.check(&id("phantom_api")));
    }

    #[test]
    fn available_respects_overrides() {
        let mut checker = EnvCapabilityChecker::new();
        for (capability, _) in EnvCapabilityChecker::new().catalog {
            checker.set_override(capability, false);
        }
        checker.set_override(id("network"), true);

        assert_eq!(checker.available(), vec![id("network")]);
    }
}
