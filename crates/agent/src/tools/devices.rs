//! Smart-home device tools. They validate their input and echo a confirmation; there is
//! no device backend behind them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_args, whole_number, Tool, ToolArgs, ToolContext, ToolError};
use crate::llm::ToolSchema;

const DEFAULT_VOLUME: u32 = 50;

fn invalid(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments { tool: tool.to_string(), message: message.into() }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ColorTemperature {
    Daylight,
    Cool,
    Warm,
}

impl ColorTemperature {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Daylight => "daylight",
            Self::Cool => "cool",
            Self::Warm => "warm",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LightArgs {
    brightness: f64,
    color_temp: ColorTemperature,
}

pub struct SetLightValues;

#[async_trait]
impl Tool for SetLightValues {
    fn name(&self) -> &'static str {
        "set_light_values"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Sets the brightness and color temperature of a light.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "brightness": {
                        "type": "number",
                        "description": "Light level from 0 to 100. Zero is off and 100 is full brightness"
                    },
                    "color_temp": {
                        "type": "string",
                        "enum": ["daylight", "cool", "warm"],
                        "description": "Color temperature of the light fixture, which can be `daylight`, `cool` or `warm`."
                    }
                },
                "required": ["brightness", "color_temp"]
            }),
        }
    }

    async fn execute(&self, args: ToolArgs, _context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let args: LightArgs = parse_args(self.name(), args)?;
        let brightness = whole_number(self.name(), "brightness", args.brightness)?;
        if brightness > 100 {
            return Err(invalid(self.name(), "`brightness` must be between 0 and 100"));
        }

        info!(
            event_name = "tool.devices.lights",
            brightness,
            color_temp = args.color_temp.as_str(),
            "light values set"
        );
        Ok(json!({ "brightness": brightness, "color_temp": args.color_temp.as_str() }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ThermostatMode {
    Heat,
    Cool,
    Auto,
    Off,
}

impl ThermostatMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Auto => "auto",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThermostatArgs {
    temperature: f64,
    mode: ThermostatMode,
}

pub struct SetThermostat;

#[async_trait]
impl Tool for SetThermostat {
    fn name(&self) -> &'static str {
        "set_thermostat"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Control the smart thermostat temperature and mode".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "temperature": {
                        "type": "number",
                        "description": "Target temperature in Celsius (16-30)"
                    },
                    "mode": {
                        "type": "string",
                        "enum": ["heat", "cool", "auto", "off"],
                        "description": "Thermostat mode: heat, cool, auto, or off"
                    }
                },
                "required": ["temperature", "mode"]
            }),
        }
    }

    async fn execute(&self, args: ToolArgs, _context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let args: ThermostatArgs = parse_args(self.name(), args)?;
        if !(16.0..=30.0).contains(&args.temperature) {
            return Err(invalid(self.name(), "`temperature` must be between 16 and 30 Celsius"));
        }

        info!(
            event_name = "tool.devices.thermostat",
            temperature = args.temperature,
            mode = args.mode.as_str(),
            "thermostat adjusted"
        );
        Ok(json!({
            "temperature": args.temperature,
            "mode": args.mode.as_str(),
            "status": "adjusted"
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MusicAction {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
}

impl MusicAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }
}

#[derive(Debug, Deserialize)]
struct MusicArgs {
    action: MusicAction,
    #[serde(default)]
    volume: Option<f64>,
}

pub struct ControlMusic;

#[async_trait]
impl Tool for ControlMusic {
    fn name(&self) -> &'static str {
        "control_music"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Control music playback and volume".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["play", "pause", "stop", "next", "previous"],
                        "description": "Music action: play, pause, stop, next, previous"
                    },
                    "volume": {
                        "type": "number",
                        "description": "Volume level (0-100), optional"
                    }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, args: ToolArgs, _context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let args: MusicArgs = parse_args(self.name(), args)?;
        let volume = match args.volume {
            Some(volume) => whole_number(self.name(), "volume", volume)?,
            None => DEFAULT_VOLUME,
        };
        if volume > 100 {
            return Err(invalid(self.name(), "`volume` must be between 0 and 100"));
        }

        info!(event_name = "tool.devices.music", action = args.action.as_str(), volume, "music control");
        Ok(json!({ "action": args.action.as_str(), "volume": volume, "status": "success" }))
    }
}
