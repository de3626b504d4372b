// Telemetry domain models - sensor samples and backend status payloads
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melt_pool_area: Option<f64>,
    /// Base64 frame; carried through untouched, never decoded here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaserReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outpower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpower: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PyrometerReading {
    /// Melt pool temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpt: Option<f64>,
    #[serde(rename = "1ct", default, skip_serializing_if = "Option::is_none")]
    pub one_color_temp: Option<f64>,
    #[serde(rename = "2ct", default, skip_serializing_if = "Option::is_none")]
    pub two_color_temp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CncReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curpos_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curpos_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curpos_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curpos_a: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curpos_c: Option<f64>,
}

impl CncReading {
    /// Planar machine position, when both axes were reported
    pub fn planar_position(&self) -> Option<(f64, f64)> {
        Some((self.curpos_x?, self.curpos_y?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HikCameraReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_image: Option<String>,
}

/// One timestamped snapshot of sensor readings as pushed by the backend.
///
/// The timestamp is producer-assigned and kept verbatim; samples arrive in
/// non-decreasing timestamp order but duplicates are possible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_data: Option<CameraReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laser_data: Option<LaserReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pyrometer_data: Option<PyrometerReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnc_data: Option<CncReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hik_camera_data: Option<HikCameraReading>,
}

impl TelemetrySample {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    pub fn planar_position(&self) -> Option<(f64, f64)> {
        self.cnc_data.as_ref()?.planar_position()
    }
}

/// Flattened sample as kept by the backend store and served by
/// `GET /api/data/latest` and `GET /api/data/history`. Frames are not kept,
/// only whether one was present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub curpos_x: Option<f64>,
    #[serde(default)]
    pub curpos_y: Option<f64>,
    #[serde(default)]
    pub curpos_z: Option<f64>,
    #[serde(default)]
    pub curpos_a: Option<f64>,
    #[serde(default)]
    pub curpos_c: Option<f64>,
    #[serde(default)]
    pub mpt: Option<f64>,
    #[serde(rename = "1ct", default)]
    pub one_color_temp: Option<f64>,
    #[serde(rename = "2ct", default)]
    pub two_color_temp: Option<f64>,
    #[serde(default)]
    pub outpower: Option<f64>,
    #[serde(default)]
    pub setpower: Option<f64>,
    #[serde(default)]
    pub melt_pool_area: Option<f64>,
}

impl From<StoredRecord> for TelemetrySample {
    fn from(record: StoredRecord) -> Self {
        let cnc = CncReading {
            curpos_x: record.curpos_x,
            curpos_y: record.curpos_y,
            curpos_z: record.curpos_z,
            curpos_a: record.curpos_a,
            curpos_c: record.curpos_c,
        };
        let laser = LaserReading {
            outpower: record.outpower,
            setpower: record.setpower,
        };
        let pyrometer = PyrometerReading {
            mpt: record.mpt,
            one_color_temp: record.one_color_temp,
            two_color_temp: record.two_color_temp,
        };
        let camera = CameraReading {
            melt_pool_area: record.melt_pool_area,
            image: None,
        };

        Self {
            timestamp: record.timestamp,
            cnc_data: (cnc != CncReading::default()).then_some(cnc),
            laser_data: (laser != LaserReading::default()).then_some(laser),
            pyrometer_data: (pyrometer != PyrometerReading::default()).then_some(pyrometer),
            camera_data: (camera != CameraReading::default()).then_some(camera),
            hik_camera_data: None,
        }
    }
}

/// Backend system status (`GET /api/status` and `status_update` pushes)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub system_status: String,
    /// Sensor name to connectivity flag
    #[serde(default)]
    pub sensors: BTreeMap<String, bool>,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveStatus {
    pub is_saving: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

/// Response of the start/stop save endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Scalar channels that can be projected out of a sample for charting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    MeltPoolTemperature,
    OneColorTemperature,
    TwoColorTemperature,
    MeltPoolArea,
    LaserOutputPower,
    LaserSetPower,
    PositionX,
    PositionY,
    PositionZ,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::MeltPoolTemperature,
        Channel::OneColorTemperature,
        Channel::TwoColorTemperature,
        Channel::MeltPoolArea,
        Channel::LaserOutputPower,
        Channel::LaserSetPower,
        Channel::PositionX,
        Channel::PositionY,
        Channel::PositionZ,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::MeltPoolTemperature => "melt_pool_temperature",
            Channel::OneColorTemperature => "one_color_temperature",
            Channel::TwoColorTemperature => "two_color_temperature",
            Channel::MeltPoolArea => "melt_pool_area",
            Channel::LaserOutputPower => "laser_output_power",
            Channel::LaserSetPower => "laser_set_power",
            Channel::PositionX => "position_x",
            Channel::PositionY => "position_y",
            Channel::PositionZ => "position_z",
        }
    }

    pub fn extract(self, sample: &TelemetrySample) -> Option<f64> {
        match self {
            Channel::MeltPoolTemperature => sample.pyrometer_data.as_ref()?.mpt,
            Channel::OneColorTemperature => sample.pyrometer_data.as_ref()?.one_color_temp,
            Channel::TwoColorTemperature => sample.pyrometer_data.as_ref()?.two_color_temp,
            Channel::MeltPoolArea => sample.camera_data.as_ref()?.melt_pool_area,
            Channel::LaserOutputPower => sample.laser_data.as_ref()?.outpower,
            Channel::LaserSetPower => sample.laser_data.as_ref()?.setpower,
            Channel::PositionX => sample.cnc_data.as_ref()?.curpos_x,
            Channel::PositionY => sample.cnc_data.as_ref()?.curpos_y,
            Channel::PositionZ => sample.cnc_data.as_ref()?.curpos_z,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown channel: {}", s))
    }
}
