//! Demo tools registered by the gateway binary.
//!
//! Both return static data so a fresh install can exercise the tool loop
//! end to end without any external service.

use chatrelay_core::Tool;
use serde_json::{Value, json};

/// Static weather lookup for a handful of cities.
pub fn get_weather() -> Tool {
    Tool::new(
        "get_weather",
        "Get the current weather for a location. Returns temperature, conditions, and forecast. \
         Supports multiple cities including San Francisco, New York, London, Tokyo, Paris, and Sydney.",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "location": {
                "type": "string",
                "description": "The city name (e.g., 'San Francisco', 'New York', 'London')"
            },
            "unit": {
                "type": "string",
                "enum": ["celsius", "fahrenheit"],
                "description": "Temperature unit (default: fahrenheit)"
            }
        },
        "required": ["location"]
    }))
    .with_sync(|args: Value| -> Result<Value, String> { Ok(weather_for(&args)) })
}

/// Static clock for a handful of timezones.
pub fn get_time() -> Tool {
    Tool::new(
        "get_time",
        "Get the current time in a specific timezone. Supports UTC, PST, EST, GMT, JST, and AEST.",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "timezone": {
                "type": "string",
                "description": "The timezone (e.g., 'PST', 'EST', 'UTC')"
            }
        },
        "required": ["timezone"]
    }))
    .with_sync(|args: Value| -> Result<Value, String> { Ok(time_in(&args)) })
}

/// Every demo tool.
pub fn demo_tools() -> Vec<Tool> {
    vec![get_weather(), get_time()]
}

fn weather_for(args: &Value) -> Value {
    let location = args["location"].as_str().unwrap_or("Unknown");
    let unit = args["unit"].as_str().unwrap_or("fahrenheit");

    let (temp_f, temp_c, conditions) = match location.to_lowercase().as_str() {
        "san francisco" => (62, 17, "Foggy"),
        "new york" => (75, 24, "Partly Cloudy"),
        "london" => (55, 13, "Rainy"),
        "tokyo" => (70, 21, "Clear"),
        "paris" => (68, 20, "Sunny"),
        "sydney" => (80, 27, "Sunny"),
        _ => (72, 22, "Clear"),
    };
    let temperature = if unit == "celsius" { temp_c } else { temp_f };

    json!({
        "location": location,
        "temperature": temperature,
        "unit": unit,
        "conditions": conditions,
        "forecast": "Clear skies expected",
    })
}

fn time_in(args: &Value) -> Value {
    let timezone = args["timezone"].as_str().unwrap_or("UTC");
    let time = match timezone.to_uppercase().as_str() {
        "UTC" | "GMT" => "14:30",
        "PST" => "06:30",
        "EST" => "09:30",
        "JST" => "23:30",
        "AEST" => "00:30",
        _ => "12:00",
    };
    json!({ "timezone": timezone, "time": time, "format": "24-hour" })
}
