/// Runtime settings shared by every entry point
///
/// Each context is started with an optional JS object; missing fields fall
/// back to the defaults below, so `{}` and `undefined` are both valid.

use crate::relay::{DEFAULT_BUFFER_CAPACITY, RelayError};
use crate::serializer::SerializerLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HOOK_KEY: &str = "__MINIMAL_REACT_DEVTOOLS_GLOBAL_HOOK__";
pub const REACT_HOOK_KEY: &str = "__REACT_DEVTOOLS_GLOBAL_HOOK__";
pub const LEGACY_REACT_HOOK_KEY: &str = "_REACT_DEVTOOLS_GLOBAL_HOOK";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevtoolsConfig {
    pub hook: HookSettings,
    pub serializer: SerializerLimits,
    pub detector: DetectorSettings,
    pub relay: RelaySettings,
}

impl DevtoolsConfig {
    pub fn from_json(json: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HookSettings {
    /// Global our own hook is published under
    pub hook_key: String,
    /// Globals where another devtools hook may already live, in lookup order
    pub react_hook_keys: Vec<String>,
    /// With no foreign hook present, also publish ours under the first
    /// React key so renderers loading later register with it
    pub claim_react_hook: bool,
}

impl Default for HookSettings {
    fn default() -> Self {
        HookSettings {
            hook_key: HOOK_KEY.to_string(),
            react_hook_keys: vec![REACT_HOOK_KEY.to_string(), LEGACY_REACT_HOOK_KEY.to_string()],
            claim_react_hook: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorSettings {
    /// Delays of the re-checks after the initial attempt
    pub retry_delays_ms: Vec<u32>,
    pub rescan_interval_ms: u32,
    /// Re-scan ticks before the scanner stops on its own
    pub max_rescans: u32,
    /// Root elements counted per scan
    pub max_roots: usize,
}

impl DetectorSettings {
    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(u64::from(*ms)))
            .collect()
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.rescan_interval_ms))
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        DetectorSettings {
            retry_delays_ms: vec![1000, 2000, 5000, 10000],
            rescan_interval_ms: 5000,
            max_rescans: 60,
            max_roots: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelaySettings {
    /// Commits the background keeps per tab for panels that connect late
    pub buffer_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        RelaySettings {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}
