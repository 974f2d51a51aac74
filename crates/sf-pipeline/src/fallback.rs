//! Device name fallback resolution
//!
//! The remote catalog is never fully known: third-party devices come and go,
//! and planners ask for things by type as often as by exact name. Resolution
//! guarantees forward progress with an ordered fallback chain:
//!
//! 1. exact match against always-available stock devices
//! 2. case-insensitive stock match
//! 3. configured blacklist replacement
//! 4. type-keyword match onto a native device chain
//! 5. verbatim, leaving the outcome to the loader

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Stock devices that are always loadable, no plugin scan needed.
pub const STOCK_DEVICES: &[&str] = &[
    "EQ Eight",
    "EQ Three",
    "Channel EQ",
    "Compressor",
    "Glue Compressor",
    "Multiband Dynamics",
    "Reverb",
    "Delay",
    "Echo",
    "Simple Delay",
    "Saturator",
    "Limiter",
    "Pedal",
    "Overdrive",
    "Corpus",
    "Erosion",
    "Vinyl Distortion",
    "Auto Filter",
    "Auto Pan",
    "Chorus-Ensemble",
    "Phaser-Flanger",
    "Spectral Resonator",
    "Spectral Time",
    "Utility",
    "Tuner",
    "Gate",
    "Drum Buss",
];

/// Type keyword → ordered native fallback chain. Longer, more specific keys
/// come first so they win over their substrings.
const NATIVE_FALLBACKS: &[(&str, &[&str])] = &[
    ("glue compressor", &["Glue Compressor", "Compressor"]),
    ("eq eight", &["EQ Eight"]),
    ("equalizer", &["EQ Eight", "EQ Three"]),
    ("compressor", &["Compressor", "Glue Compressor"]),
    ("comp", &["Compressor", "Glue Compressor"]),
    ("limiter", &["Limiter"]),
    ("de-esser", &["Multiband Dynamics"]),
    ("deesser", &["Multiband Dynamics"]),
    ("multiband", &["Multiband Dynamics"]),
    ("dynamics", &["Multiband Dynamics", "Gate"]),
    ("reverb", &["Reverb"]),
    ("echo", &["Echo", "Delay"]),
    ("delay", &["Delay", "Echo", "Simple Delay"]),
    ("saturation", &["Saturator", "Pedal"]),
    ("saturator", &["Saturator", "Pedal", "Overdrive"]),
    ("distortion", &["Saturator", "Pedal", "Overdrive"]),
    ("overdrive", &["Overdrive", "Saturator"]),
    ("drive", &["Saturator", "Overdrive"]),
    ("chorus", &["Chorus-Ensemble"]),
    ("phaser", &["Phaser-Flanger"]),
    ("flanger", &["Phaser-Flanger"]),
    ("modulation", &["Chorus-Ensemble", "Phaser-Flanger"]),
    ("gate", &["Gate"]),
    ("filter", &["Auto Filter"]),
    ("utility", &["Utility"]),
    ("tuner", &["Tuner"]),
    ("eq", &["EQ Eight", "EQ Three", "Channel EQ"]),
];

/// Configured device preferences: blacklisted names and their replacements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicePreferences {
    /// Device name → replacement chain, tried in order
    #[serde(default)]
    pub blacklist: HashMap<String, Vec<String>>,
}

impl DevicePreferences {
    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.blacklist.contains_key(name)
    }

    pub fn replacements(&self, name: &str) -> Option<&[String]> {
        self.blacklist.get(name).map(|v| v.as_slice())
    }
}

/// Normalized keyword match: underscores and hyphens count as spaces.
fn keyword_matches(name_lower: &str, key: &str) -> bool {
    if name_lower.contains(key) {
        return true;
    }
    let squashed = name_lower.replace(['_', '-'], " ");
    squashed.contains(key)
}

/// Resolve a requested device name to something loadable.
///
/// Returns `(resolved_name, is_fallback)`; `is_fallback` is true when the
/// resolved name differs from what was asked for. An explicit caller
/// fallback is not applied here — the executor tries the primary first and
/// only reaches for alternatives when the load fails.
pub fn resolve_device_name(requested: &str, prefs: &DevicePreferences) -> (String, bool) {
    if STOCK_DEVICES.contains(&requested) {
        return (requested.to_string(), false);
    }
    for stock in STOCK_DEVICES {
        if stock.eq_ignore_ascii_case(requested) {
            return (stock.to_string(), false);
        }
    }
    if let Some(replacements) = prefs.replacements(requested) {
        if let Some(first) = replacements.first() {
            return (first.clone(), true);
        }
    }
    let lower = requested.to_lowercase();
    for (key, chain) in NATIVE_FALLBACKS {
        if keyword_matches(&lower, key) {
            return (chain[0].to_string(), true);
        }
    }
    // Third-party or unknown: let the loader decide.
    (requested.to_string(), false)
}

/// Full ordered fallback chain for a device name: configured replacements
/// first, then the native chain for the first matching type keyword.
pub fn fallback_chain(requested: &str, prefs: &DevicePreferences) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();

    if let Some(replacements) = prefs.replacements(requested) {
        chain.extend(replacements.iter().cloned());
    }

    let lower = requested.to_lowercase();
    for (key, natives) in NATIVE_FALLBACKS {
        if keyword_matches(&lower, key) {
            for native in *natives {
                if !chain.iter().any(|c| c == native) {
                    chain.push(native.to_string());
                }
            }
            break;
        }
    }
    chain
}
