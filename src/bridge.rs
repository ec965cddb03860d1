//! JSON line protocol in front of [`VibratorHandle`]
//!
//! One request object per line in, one response object per line out:
//!
//! ```text
//! {"id": 7, "op": "startVibration", "args": [{"type": "time", "duration": 500}, {"usage": "alarm"}]}
//! {"id": 7, "ok": true}
//! ```
//!
//! Arguments arrive as loose JSON values, so every argument shape check that
//! the typed API gets from the compiler happens here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::controller::VibratorHandle;
use crate::vibrator::{
    ErrorShape, StopMode, SystemVibrateMode, Usage, UsageContext, VibrationError,
    VibrationRequest, VibratorParameter,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    #[serde(default)]
    pub id: Option<u64>,
    pub op: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl BridgeResponse {
    fn success(id: Option<u64>, result: Option<Value>) -> Self {
        Self {
            id,
            ok: true,
            result,
            error: None,
        }
    }

    fn failure(id: Option<u64>, error: ErrorShape) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error(transparent)]
    Vibration(#[from] VibrationError),
}

impl BridgeError {
    /// Protocol errors are reported to the caller as parameter errors
    pub fn shape(&self) -> ErrorShape {
        match self {
            BridgeError::Vibration(e) => e.shape(),
            other => VibrationError::invalid_parameter(other.to_string()).shape(),
        }
    }
}

/// Typed form of a bridge request
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCall {
    Vibrate(VibrationRequest),
    StartVibration {
        request: VibrationRequest,
        context: UsageContext,
    },
    Stop(Option<StopMode>),
    IsSupportEffect(String),
    SupportedEffects,
}

pub fn parse_call(request: &BridgeRequest) -> Result<BridgeCall, BridgeError> {
    let first = request.args.first().filter(|value| !value.is_null());

    match request.op.as_str() {
        "vibrate" => Ok(BridgeCall::Vibrate(parse_vibrate(first)?)),
        "startVibration" => {
            let effect = parse_effect(first)?;
            let context = parse_attribute(request.args.get(1))?;
            Ok(BridgeCall::StartVibration {
                request: effect,
                context,
            })
        }
        // Anything but a string (a callback, say) stops whatever runs
        "stop" | "stopVibration" => match first {
            Some(Value::String(mode)) => Ok(BridgeCall::Stop(Some(mode.parse()?))),
            _ => Ok(BridgeCall::Stop(None)),
        },
        "isSupportEffect" => match first {
            Some(Value::String(effect_id)) => Ok(BridgeCall::IsSupportEffect(effect_id.clone())),
            _ => Err(invalid("isSupportEffect expects an effect id string").into()),
        },
        "supportedEffects" => Ok(BridgeCall::SupportedEffects),
        other => Err(BridgeError::UnknownOperation(other.to_string())),
    }
}

/// `vibrate` takes a duration, an effect id, a `{mode}` object or nothing
///
/// A bare string is always an effect id played once; the long/short names
/// are only read from the `mode` field.
fn parse_vibrate(arg: Option<&Value>) -> Result<VibrationRequest, VibrationError> {
    let mode = match arg {
        None => SystemVibrateMode::default(),
        Some(Value::Number(_)) => return Ok(VibrationRequest::duration(integer(arg, "duration")?)),
        Some(Value::String(effect_id)) => return Ok(VibrationRequest::effect(effect_id.clone(), 1)),
        Some(Value::Object(options)) => match options.get("mode") {
            Some(Value::String(name)) => SystemVibrateMode::from_name(name),
            None | Some(Value::Null) => SystemVibrateMode::default(),
            Some(_) => return Err(invalid("vibrate mode must be a string")),
        },
        Some(_) => {
            return Err(invalid(
                "vibrate expects a duration, an effect id or an options object",
            ))
        }
    };
    Ok(VibrationRequest::duration(mode.duration_ms()))
}

fn parse_effect(arg: Option<&Value>) -> Result<VibrationRequest, VibrationError> {
    let Some(Value::Object(effect)) = arg else {
        return Err(invalid("startVibration expects an effect object"));
    };

    match effect.get("type").and_then(Value::as_str) {
        Some("time") => Ok(VibrationRequest::duration(integer(
            effect.get("duration"),
            "duration",
        )?)),
        Some("preset") => {
            let effect_id = match effect.get("effectId") {
                Some(Value::String(id)) => id.clone(),
                _ => return Err(invalid("preset effect needs an effectId string")),
            };
            let count = match effect.get("count") {
                None | Some(Value::Null) => 1,
                value => {
                    let count = integer(value, "count")?;
                    i32::try_from(count)
                        .map_err(|_| invalid(format!("count {} out of range", count)))?
                }
            };
            Ok(VibrationRequest::effect(effect_id, count))
        }
        Some("file") => Err(VibrationError::operation_failed(
            "file based vibration is not supported",
        )),
        Some(other) => Err(invalid(format!("unknown effect type '{}'", other))),
        None => Err(invalid("effect type is missing")),
    }
}

fn parse_attribute(arg: Option<&Value>) -> Result<UsageContext, VibrationError> {
    let Some(Value::Object(attribute)) = arg else {
        return Err(invalid("startVibration expects an attribute object"));
    };

    let usage = match attribute.get("usage") {
        Some(Value::String(name)) => name.parse::<Usage>()?,
        _ => return Err(invalid("attribute needs a usage string")),
    };

    let defaults = VibratorParameter::default();
    let parameter = VibratorParameter {
        intensity: optional_i32(attribute, "intensity", defaults.intensity)?,
        frequency: optional_i32(attribute, "frequency", defaults.frequency)?,
    };
    Ok(UsageContext::new(usage).with_parameter(parameter))
}

fn optional_i32(
    object: &Map<String, Value>,
    key: &str,
    default: i32,
) -> Result<i32, VibrationError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(default),
        value => {
            let number = integer(value, key)?;
            i32::try_from(number).map_err(|_| invalid(format!("{} {} out of range", key, number)))
        }
    }
}

/// Whole number out of a JSON value, fractional parts are truncated
fn integer(value: Option<&Value>, name: &str) -> Result<i64, VibrationError> {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .ok_or_else(|| invalid(format!("{} is not a usable number", name))),
        _ => Err(invalid(format!("{} must be a number", name))),
    }
}

fn invalid(reason: impl Into<String>) -> VibrationError {
    VibrationError::invalid_parameter(reason)
}

pub async fn execute(
    handle: &VibratorHandle,
    call: BridgeCall,
) -> Result<Option<Value>, VibrationError> {
    match call {
        BridgeCall::Vibrate(request) => handle.vibrate(request).await.map(|()| None),
        BridgeCall::StartVibration { request, context } => handle
            .start_vibration(request, context)
            .await
            .map(|()| None),
        BridgeCall::Stop(mode) => handle.stop_vibration(mode).await.map(|()| None),
        BridgeCall::IsSupportEffect(effect_id) => handle
            .is_support_effect(&effect_id)
            .await
            .map(|supported| Some(Value::Bool(supported))),
        BridgeCall::SupportedEffects => Ok(Some(Value::from(handle.supported_effects()))),
    }
}

/// Parses, executes and answers one protocol line
pub async fn handle_line(handle: &VibratorHandle, line: &str) -> BridgeResponse {
    let request: BridgeRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            let e = BridgeError::from(e);
            warn!("{}", e);
            return BridgeResponse::failure(None, e.shape());
        }
    };
    debug!("Bridge request {:?}: {}", request.id, request.op);

    let call = match parse_call(&request) {
        Ok(call) => call,
        Err(e) => {
            warn!("Bridge request {:?} rejected: {}", request.id, e);
            return BridgeResponse::failure(request.id, e.shape());
        }
    };

    match execute(handle, call).await {
        Ok(result) => BridgeResponse::success(request.id, result),
        Err(e) => {
            debug!("Bridge request {:?} failed: {}", request.id, e.reason());
            BridgeResponse::failure(request.id, e.shape())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(op: &str, args: Value) -> BridgeRequest {
        serde_json::from_value(json!({ "id": 1, "op": op, "args": args })).unwrap()
    }

    fn parsed(op: &str, args: Value) -> Result<BridgeCall, BridgeError> {
        parse_call(&request(op, args))
    }

    fn code(result: Result<BridgeCall, BridgeError>) -> i32 {
        result.unwrap_err().shape().code
    }

    #[test]
    fn vibrate_accepts_every_legacy_shape() {
        let cases = [
            (json!([250]), 250),
            (json!([{ "mode": "short" }]), 35),
            (json!([{ "mode": "long" }]), 1000),
            (json!([{ "mode": "buzz" }]), 1000),
            (json!([{}]), 1000),
            (json!([]), 1000),
            (json!([null]), 1000),
        ];
        for (args, millis) in cases {
            assert_eq!(
                parsed("vibrate", args).unwrap(),
                BridgeCall::Vibrate(VibrationRequest::duration(millis))
            );
        }
        assert_eq!(code(parsed("vibrate", json!([true]))), 401);
        assert_eq!(code(parsed("vibrate", json!([{ "mode": 3 }]))), 401);
    }

    #[test]
    fn vibrate_string_is_an_effect_id() {
        for id in ["haptic.clock.timer", "", "xxx", "short"] {
            assert_eq!(
                parsed("vibrate", json!([id])).unwrap(),
                BridgeCall::Vibrate(VibrationRequest::effect(id, 1))
            );
        }
    }

    #[test]
    fn start_vibration_reads_effect_and_attribute() {
        let call = parsed(
            "startVibration",
            json!([
                { "type": "preset", "effectId": "haptic.clock.timer", "count": 3 },
                { "usage": "alarm", "intensity": 40 }
            ]),
        )
        .unwrap();

        assert_eq!(
            call,
            BridgeCall::StartVibration {
                request: VibrationRequest::effect("haptic.clock.timer", 3),
                context: UsageContext::new(Usage::Alarm).with_parameter(VibratorParameter {
                    intensity: 40,
                    frequency: 0,
                }),
            }
        );

        let call = parsed(
            "startVibration",
            json!([{ "type": "preset", "effectId": "haptic.fail" }, { "usage": "unknown" }]),
        )
        .unwrap();
        assert!(matches!(
            call,
            BridgeCall::StartVibration { request: VibrationRequest::Effect { count: 1, .. }, .. }
        ));
    }

    #[test]
    fn start_vibration_shape_errors() {
        let time = json!({ "type": "time", "duration": 10 });

        assert_eq!(code(parsed("startVibration", json!([time]))), 401);
        assert_eq!(code(parsed("startVibration", json!([time, { "usage": "" }]))), 401);
        assert_eq!(code(parsed("startVibration", json!([time, { "usage": "loud" }]))), 401);
        assert_eq!(code(parsed("startVibration", json!([time, { "usage": 1 }]))), 401);
        assert_eq!(
            code(parsed(
                "startVibration",
                json!([{ "type": "time", "duration": "10" }, { "usage": "alarm" }])
            )),
            401
        );
        assert_eq!(
            code(parsed(
                "startVibration",
                json!([{ "type": "preset", "count": 1 }, { "usage": "alarm" }])
            )),
            401
        );
        assert_eq!(
            code(parsed(
                "startVibration",
                json!([{ "type": "file", "hapticFd": {} }, { "usage": "alarm" }])
            )),
            14600101
        );
    }

    #[test]
    fn stop_mode_strings_are_checked() {
        assert_eq!(
            parsed("stopVibration", json!(["preset"])).unwrap(),
            BridgeCall::Stop(Some(StopMode::Preset))
        );
        assert_eq!(parsed("stop", json!([])).unwrap(), BridgeCall::Stop(None));
        assert_eq!(parsed("stop", json!([42])).unwrap(), BridgeCall::Stop(None));
        assert_eq!(code(parsed("stopVibration", json!([""]))), 401);
        assert_eq!(code(parsed("stopVibration", json!(["all"]))), 401);
    }

    #[test]
    fn is_support_effect_needs_a_string() {
        assert_eq!(
            parsed("isSupportEffect", json!(["haptic.fail"])).unwrap(),
            BridgeCall::IsSupportEffect("haptic.fail".into())
        );
        assert_eq!(code(parsed("isSupportEffect", json!([]))), 401);
        assert_eq!(code(parsed("isSupportEffect", json!([7]))), 401);
    }

    #[test]
    fn unknown_operation_is_a_parameter_error() {
        assert_eq!(code(parsed("explode", json!([]))), 401);
    }

    #[test]
    fn responses_omit_empty_fields() {
        let ok = serde_json::to_value(BridgeResponse::success(Some(3), None)).unwrap();
        assert_eq!(ok, json!({ "id": 3, "ok": true }));

        let failed = serde_json::to_value(BridgeResponse::failure(
            None,
            VibrationError::PermissionDenied.shape(),
        ))
        .unwrap();
        assert_eq!(
            failed,
            json!({ "id": null, "ok": false, "error": { "code": 201, "message": "Permission denied." } })
        );
    }
}
