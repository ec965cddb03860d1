//! Request and context types accepted by the vibration controller

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use super::error::VibrationError;

/// Longest time based vibration accepted unless configured otherwise (30 minutes)
pub const DEFAULT_MAX_DURATION_MS: i64 = 1_800_000;

pub const INTENSITY_MIN: i32 = 0;
pub const INTENSITY_MAX: i32 = 100;
pub const FREQUENCY_MIN: i32 = -100;
pub const FREQUENCY_MAX: i32 = 100;

/// What the caller wants the actuator to do
///
/// `millis` and `count` are signed on purpose: callers on the dynamic boundary
/// hand over whatever integer they got and validation rejects the bad ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VibrationRequest {
    /// Plain motor run for a fixed time
    #[serde(rename = "time")]
    Duration {
        #[serde(rename = "duration")]
        millis: i64,
    },

    /// Preset effect from the catalog, played `count` times
    #[serde(rename = "preset")]
    Effect {
        #[serde(rename = "effectId")]
        effect_id: String,
        count: i32,
    },
}

impl VibrationRequest {
    /// Time based request, `millis` is validated when the session is created
    pub fn duration(millis: i64) -> Self {
        VibrationRequest::Duration { millis }
    }

    /// Preset request played `count` times
    pub fn effect(effect_id: impl Into<String>, count: i32) -> Self {
        VibrationRequest::Effect {
            effect_id: effect_id.into(),
            count,
        }
    }

    /// Stop mode a session started from this request runs under
    pub fn mode(&self) -> StopMode {
        match self {
            VibrationRequest::Duration { .. } => StopMode::Time,
            VibrationRequest::Effect { .. } => StopMode::Preset,
        }
    }
}

impl Display for VibrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VibrationRequest::Duration { millis } => write!(f, "time({}ms)", millis),
            VibrationRequest::Effect { effect_id, count } => {
                write!(f, "preset({} x{})", effect_id, count)
            }
        }
    }
}

/// Usage classes used to arbitrate between competing vibration sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Usage {
    /// Lowest priority, used when the caller does not say
    #[default]
    Unknown,
    /// Alarms and timers
    Alarm,
    /// Incoming calls
    Ring,
    Notification,
    Communication,
    /// Touch feedback
    Touch,
    Media,
    /// Physical feedback such as key clicks
    PhysicalFeedback,
    /// Games and other simulated reality
    SimulateReality,
}

impl Usage {
    pub const ALL: [Usage; 9] = [
        Usage::Unknown,
        Usage::Alarm,
        Usage::Ring,
        Usage::Notification,
        Usage::Communication,
        Usage::Touch,
        Usage::Media,
        Usage::PhysicalFeedback,
        Usage::SimulateReality,
    ];

    /// Name used in config files and on the bridge
    pub fn as_str(&self) -> &'static str {
        match self {
            Usage::Unknown => "unknown",
            Usage::Alarm => "alarm",
            Usage::Ring => "ring",
            Usage::Notification => "notification",
            Usage::Communication => "communication",
            Usage::Touch => "touch",
            Usage::Media => "media",
            Usage::PhysicalFeedback => "physicalFeedback",
            Usage::SimulateReality => "simulateReality",
        }
    }
}

impl Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Usage {
    type Err = VibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Usage::ALL
            .iter()
            .copied()
            .find(|usage| usage.as_str() == s)
            .ok_or_else(|| VibrationError::invalid_parameter(format!("unknown usage '{}'", s)))
    }
}

/// Intensity and frequency adjustment applied on top of the played waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibratorParameter {
    /// Motor strength in percent, 0..=100
    pub intensity: i32,
    /// Offset from the default frequency, -100..=100
    pub frequency: i32,
}

impl Default for VibratorParameter {
    fn default() -> Self {
        Self {
            intensity: INTENSITY_MAX,
            frequency: 0,
        }
    }
}

impl VibratorParameter {
    pub fn validate(&self) -> Result<(), VibrationError> {
        if !(INTENSITY_MIN..=INTENSITY_MAX).contains(&self.intensity) {
            return Err(VibrationError::invalid_parameter(format!(
                "intensity {} outside {}..={}",
                self.intensity, INTENSITY_MIN, INTENSITY_MAX
            )));
        }
        if !(FREQUENCY_MIN..=FREQUENCY_MAX).contains(&self.frequency) {
            return Err(VibrationError::invalid_parameter(format!(
                "frequency {} outside {}..={}",
                self.frequency, FREQUENCY_MIN, FREQUENCY_MAX
            )));
        }
        Ok(())
    }
}

/// Attribute attached to `start_vibration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageContext {
    /// Usage class used for arbitration
    pub usage: Usage,
    /// Defaults to full intensity and unchanged frequency when omitted
    #[serde(default)]
    pub parameter: VibratorParameter,
}

impl UsageContext {
    pub fn new(usage: Usage) -> Self {
        Self {
            usage,
            parameter: VibratorParameter::default(),
        }
    }

    pub fn with_parameter(mut self, parameter: VibratorParameter) -> Self {
        self.parameter = parameter;
        self
    }
}

/// Which kind of session a stop request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    /// Sessions started from a duration
    Time,
    /// Sessions started from a preset effect
    Preset,
}

impl StopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopMode::Time => "time",
            StopMode::Preset => "preset",
        }
    }
}

impl Display for StopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopMode {
    type Err = VibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(StopMode::Time),
            "preset" => Ok(StopMode::Preset),
            "" => Err(VibrationError::invalid_parameter("stop mode is empty")),
            other => Err(VibrationError::invalid_parameter(format!(
                "unknown stop mode '{}'",
                other
            ))),
        }
    }
}

/// Legacy system vibrate modes with fixed durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemVibrateMode {
    /// 1000 ms, also used for unrecognised names
    #[default]
    Long,
    /// 35 ms tick
    Short,
}

impl SystemVibrateMode {
    pub const LONG_DURATION_MS: i64 = 1000;
    pub const SHORT_DURATION_MS: i64 = 35;

    pub fn duration_ms(&self) -> i64 {
        match self {
            SystemVibrateMode::Long => Self::LONG_DURATION_MS,
            SystemVibrateMode::Short => Self::SHORT_DURATION_MS,
        }
    }

    /// Anything other than "short" falls back to long, like the legacy API
    pub fn from_name(name: &str) -> Self {
        match name {
            "short" => SystemVibrateMode::Short,
            _ => SystemVibrateMode::Long,
        }
    }
}
