//! Sensor catalogue and raw value decoding.
//!
//! Each sensor is a ComfoNet PDO identified by a numeric id.  The gateway
//! sends values as little-endian integers whose width and scaling depend on
//! the sensor; the table below records what is known about each one.

use serde::{Deserialize, Serialize};

/// Numeric PDO identifier.
pub type SensorId = u16;

/// How a sensor's raw bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    U8,
    U16,
    U32,
    I16,
    /// Signed 16-bit value in tenths (temperatures).
    TenthsI16,
    /// Unknown layout; delivered as text.
    Raw,
}

impl DataType {
    /// PDO type code sent in a subscription request.
    pub fn wire_code(self) -> u32 {
        match self {
            DataType::Bool => 0,
            DataType::U8 | DataType::Raw => 1,
            DataType::U16 => 2,
            DataType::U32 => 3,
            DataType::I16 | DataType::TenthsI16 => 6,
        }
    }

    fn width(self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::U8 => Some(1),
            DataType::U16 | DataType::I16 | DataType::TenthsI16 => Some(2),
            DataType::U32 => Some(4),
            DataType::Raw => None,
        }
    }
}

/// Static description of one sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorMeta {
    pub id: SensorId,
    /// Gateway-style label, e.g. `SENSOR_FAN_EXHAUST_DUTY`.
    pub name: &'static str,
    pub data_type: DataType,
    pub unit: &'static str,
}

const fn meta(id: SensorId, name: &'static str, data_type: DataType, unit: &'static str) -> SensorMeta {
    SensorMeta {
        id,
        name,
        data_type,
        unit,
    }
}

/// Every sensor the client knows how to decode, ordered by id.
pub const SENSORS: &[SensorMeta] = &[
    meta(16, "SENSOR_AWAY_INDICATOR", DataType::U8, ""),
    meta(49, "SENSOR_OPERATING_MODE", DataType::U8, ""),
    meta(56, "SENSOR_OPERATING_MODE_BIS", DataType::U8, ""),
    meta(65, "SENSOR_FAN_SPEED_MODE", DataType::U8, ""),
    meta(66, "SENSOR_BYPASS_ACTIVATION_MODE", DataType::U8, ""),
    meta(67, "SENSOR_TEMPERATURE_PROFILE", DataType::U8, ""),
    meta(81, "SENSOR_FAN_NEXT_CHANGE", DataType::U32, "s"),
    meta(117, "SENSOR_FAN_EXHAUST_DUTY", DataType::U8, "%"),
    meta(118, "SENSOR_FAN_SUPPLY_DUTY", DataType::U8, "%"),
    meta(119, "SENSOR_FAN_EXHAUST_FLOW", DataType::U16, "m³/h"),
    meta(120, "SENSOR_FAN_SUPPLY_FLOW", DataType::U16, "m³/h"),
    meta(121, "SENSOR_FAN_EXHAUST_SPEED", DataType::U16, "rpm"),
    meta(122, "SENSOR_FAN_SUPPLY_SPEED", DataType::U16, "rpm"),
    meta(128, "SENSOR_POWER_CURRENT", DataType::U16, "W"),
    meta(129, "SENSOR_POWER_TOTAL_YEAR", DataType::U16, "kWh"),
    meta(130, "SENSOR_POWER_TOTAL", DataType::U16, "kWh"),
    meta(144, "SENSOR_PREHEATER_POWER_TOTAL_YEAR", DataType::U16, "kWh"),
    meta(145, "SENSOR_PREHEATER_POWER_TOTAL", DataType::U16, "kWh"),
    meta(146, "SENSOR_PREHEATER_POWER_CURRENT", DataType::U16, "W"),
    meta(192, "SENSOR_DAYS_TO_REPLACE_FILTER", DataType::U16, "days"),
    meta(209, "SENSOR_CURRENT_RMOT", DataType::TenthsI16, "°C"),
    meta(213, "SENSOR_AVOIDED_HEATING_CURRENT", DataType::U16, "W"),
    meta(214, "SENSOR_AVOIDED_HEATING_TOTAL_YEAR", DataType::U16, "kWh"),
    meta(215, "SENSOR_AVOIDED_HEATING_TOTAL", DataType::U16, "kWh"),
    meta(216, "SENSOR_AVOIDED_COOLING_CURRENT", DataType::U16, "W"),
    meta(217, "SENSOR_AVOIDED_COOLING_TOTAL_YEAR", DataType::U16, "kWh"),
    meta(218, "SENSOR_AVOIDED_COOLING_TOTAL", DataType::U16, "kWh"),
    meta(221, "SENSOR_TEMPERATURE_SUPPLY", DataType::TenthsI16, "°C"),
    meta(227, "SENSOR_BYPASS_STATE", DataType::U8, "%"),
    meta(274, "SENSOR_TEMPERATURE_EXTRACT", DataType::TenthsI16, "°C"),
    meta(275, "SENSOR_TEMPERATURE_EXHAUST", DataType::TenthsI16, "°C"),
    meta(276, "SENSOR_TEMPERATURE_OUTDOOR", DataType::TenthsI16, "°C"),
    meta(290, "SENSOR_HUMIDITY_EXTRACT", DataType::U8, "%"),
    meta(291, "SENSOR_HUMIDITY_EXHAUST", DataType::U8, "%"),
    meta(292, "SENSOR_HUMIDITY_OUTDOOR", DataType::U8, "%"),
    meta(294, "SENSOR_HUMIDITY_SUPPLY", DataType::U8, "%"),
];

/// Looks up a sensor by id.
pub fn lookup(id: SensorId) -> Option<&'static SensorMeta> {
    SENSORS
        .binary_search_by_key(&id, |m| m.id)
        .ok()
        .map(|idx| &SENSORS[idx])
}

/// Label used for ids missing from [`SENSORS`].
pub fn unknown_label(id: SensorId) -> String {
    format!("SENSOR UNKNOWN {id}")
}

/// Label for any id, known or not.
pub fn label(id: SensorId) -> String {
    lookup(id)
        .map(|m| m.name.to_string())
        .unwrap_or_else(|| unknown_label(id))
}

/// Unit for any id; empty for unknown sensors.
pub fn unit(id: SensorId) -> &'static str {
    lookup(id).map(|m| m.unit).unwrap_or("")
}

/// PDO type code to request for `id`.
pub fn wire_type(id: SensorId) -> u32 {
    lookup(id).map(|m| m.data_type).unwrap_or(DataType::Raw).wire_code()
}

/// A decoded sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    /// Payloads that are not a plain number, rendered as a JSON byte array.
    Text(String),
}

impl std::fmt::Display for SensorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorValue::Number(n) => write!(f, "{n}"),
            SensorValue::Text(t) => f.write_str(t),
        }
    }
}

/// Decodes a raw PDO payload for sensor `id`.
///
/// Numeric sensors read the first `width` bytes little-endian.  Payloads too
/// short for their type, and sensors with no known layout, come back as
/// [`SensorValue::Text`].
pub fn decode_value(id: SensorId, data: &[u8]) -> SensorValue {
    let data_type = lookup(id).map(|m| m.data_type).unwrap_or(DataType::Raw);
    match data_type.width() {
        Some(width) if data.len() >= width => SensorValue::Number(read_number(data_type, data)),
        _ => SensorValue::Text(bytes_as_text(data)),
    }
}

fn read_number(data_type: DataType, data: &[u8]) -> f64 {
    match data_type {
        DataType::Bool => f64::from(u8::from(data[0] != 0)),
        DataType::U8 => f64::from(data[0]),
        DataType::U16 => f64::from(u16::from_le_bytes([data[0], data[1]])),
        DataType::U32 => f64::from(u32::from_le_bytes([data[0], data[1], data[2], data[3]])),
        DataType::I16 => f64::from(i16::from_le_bytes([data[0], data[1]])),
        DataType::TenthsI16 => f64::from(i16::from_le_bytes([data[0], data[1]])) / 10.0,
        DataType::Raw => 0.0,
    }
}

fn bytes_as_text(data: &[u8]) -> String {
    serde_json::to_string(data).unwrap_or_default()
}
