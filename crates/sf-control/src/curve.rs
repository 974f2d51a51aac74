//! Semantic value curves
//!
//! The host exchanges parameter values in normalized form, but declared
//! min/max ranges are not trustworthy for every control type: frequency
//! parameters in particular often report `[0, 1]` while their true range is
//! 20 Hz–20 kHz. Classification is therefore keyword-first: a parameter's
//! name (and the owning device's name) decides which curve maps human units
//! to normalized values. dB-style controls, whose declared spans are
//! reliable, keep using the declared range.
//!
//! Classification is recomputed per call and never persisted.

use serde::{Deserialize, Serialize};

/// Frequency curves always interpolate over the audible band, whatever the
/// declared range claims.
pub const FREQ_MIN_HZ: f32 = 20.0;
pub const FREQ_MAX_HZ: f32 = 20_000.0;

/// Value curve assigned to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    Linear,
    FrequencyLog,
    Decibel,
    TimeLog,
    Percentage,
    Toggle,
    Enum,
    Unknown,
}

const TOGGLE_KEYWORDS: &[&str] = &["on", "enabled", "active", "mute", "bypass"];
const ENUM_KEYWORDS: &[&str] = &["type", "mode", "shape", "slope", "law"];
const DECIBEL_KEYWORDS: &[&str] = &["gain", "output", "volume", "threshold", "drive", "makeup"];
const PERCENT_KEYWORDS: &[&str] = &["mix", "wet", "dry", "width", "pan", "blend", "feedback"];
const TIME_KEYWORDS: &[&str] = &["attack", "release", "decay", "delay", "time"];

/// Classify a parameter by name, device context, and declared range.
///
/// Precedence: toggle, enum, frequency, time, decibel, percentage, then
/// linear against the declared range (pass-through if it is degenerate).
pub fn classify(param: &str, _device: &str, min: f32, max: f32) -> Curve {
    let lower = param.to_lowercase();
    let words = tokens(&lower);

    if has_any_token(&words, TOGGLE_KEYWORDS) && min == 0.0 && max == 1.0 {
        return Curve::Toggle;
    }
    if has_any_token(&words, ENUM_KEYWORDS) && is_small_integer_span(min, max) {
        return Curve::Enum;
    }
    if lower.contains("freq") || lower.contains("cutoff") || words.iter().any(|w| *w == "hz") {
        return Curve::FrequencyLog;
    }
    if TIME_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Curve::TimeLog;
    }
    if has_any_token(&words, DECIBEL_KEYWORDS) && max > min {
        return Curve::Decibel;
    }
    if has_any_token(&words, PERCENT_KEYWORDS) {
        return Curve::Percentage;
    }

    if max > min {
        Curve::Linear
    } else {
        Curve::Unknown
    }
}

/// Convert a human value (Hz, dB, ms, %, on/off) to the host's normalized
/// representation. Returns the curve that was applied.
pub fn to_normalized(param: &str, device: &str, min: f32, max: f32, human: f32) -> (f32, Curve) {
    let curve = classify(param, device, min, max);
    let normalized = match curve {
        Curve::Toggle => {
            if human >= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        // Discrete selectors take raw step values; fractions snap back.
        Curve::Enum => human.round().clamp(min, max),
        Curve::FrequencyLog => log_norm(human, FREQ_MIN_HZ, FREQ_MAX_HZ),
        Curve::TimeLog => {
            let (lo, hi) = time_span(param, device);
            log_norm(human, lo, hi)
        }
        Curve::Decibel | Curve::Linear => lin_norm(human, min, max),
        Curve::Percentage => (human / 100.0).clamp(0.0, 1.0),
        Curve::Unknown => human.clamp(0.0, 1.0),
    };
    (normalized, curve)
}

/// Convert a normalized readback into human units, through the same curve
/// [`to_normalized`] would pick for this parameter.
pub fn from_normalized(param: &str, device: &str, min: f32, max: f32, normalized: f32) -> f32 {
    match classify(param, device, min, max) {
        Curve::Toggle => {
            if normalized >= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        Curve::Enum => normalized.round(),
        Curve::FrequencyLog => log_denorm(normalized, FREQ_MIN_HZ, FREQ_MAX_HZ),
        Curve::TimeLog => {
            let (lo, hi) = time_span(param, device);
            log_denorm(normalized, lo, hi)
        }
        Curve::Decibel | Curve::Linear => min + normalized.clamp(0.0, 1.0) * (max - min),
        Curve::Percentage => normalized.clamp(0.0, 1.0) * 100.0,
        Curve::Unknown => normalized,
    }
}

/// Millisecond span for a log-time parameter.
///
/// Attack ramps are much shorter than reverb tails; the span follows the
/// keyword, with the device name disambiguating decay controls.
fn time_span(param: &str, device: &str) -> (f32, f32) {
    let lower = param.to_lowercase();
    if lower.contains("attack") {
        (0.1, 1000.0)
    } else if lower.contains("release") {
        (1.0, 3000.0)
    } else if lower.contains("decay") && device.to_lowercase().contains("reverb") {
        (200.0, 60_000.0)
    } else if lower.contains("decay")
        || lower.contains("delay")
        || device.to_lowercase().contains("delay")
    {
        (1.0, 2000.0)
    } else {
        (1.0, 10_000.0)
    }
}

fn tokens(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn has_any_token(words: &[&str], keywords: &[&str]) -> bool {
    words.iter().any(|w| keywords.contains(w))
}

fn is_small_integer_span(min: f32, max: f32) -> bool {
    min.fract() == 0.0 && max.fract() == 0.0 && max > min && (max - min) <= 16.0
}

fn log_norm(value: f32, lo: f32, hi: f32) -> f32 {
    (value.clamp(lo, hi) / lo).ln() / (hi / lo).ln()
}

fn log_denorm(normalized: f32, lo: f32, hi: f32) -> f32 {
    lo * ((hi / lo).ln() * normalized.clamp(0.0, 1.0)).exp()
}

fn lin_norm(value: f32, min: f32, max: f32) -> f32 {
    if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        value.clamp(0.0, 1.0)
    }
}
