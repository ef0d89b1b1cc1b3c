//! Device-family converter catalogues.
//!
//! Families add converters for device-specific token formats. When a family
//! and the built-in catalogue both define a name, the family wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::datatype::{builtin_kind, Datatype, DatatypeKind};

/// Supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    /// No family-specific converters
    #[default]
    Generic,
    /// Denon / Marantz AV receivers
    Denon,
    /// Pioneer AV receivers
    Pioneer,
    /// Heating controllers reporting scaled integers
    Heating,
}

type KindCtor = fn() -> DatatypeKind;

const DENON: &[(&str, KindCtor)] = &[
    ("onoff", || DatatypeKind::on_off("ON", "OFF")),
    ("power", || DatatypeKind::on_off("ON", "STANDBY")),
    ("vol", || DatatypeKind::HalfStepVolume),
    ("display", || DatatypeKind::HexText),
];

const PIONEER: &[(&str, KindCtor)] = &[
    ("onoff", || DatatypeKind::on_off("0", "1")),
    ("vol", || DatatypeKind::Stepped {
        offset: -80.5,
        step: 0.5,
        width: 3,
    }),
];

const HEATING: &[(&str, KindCtor)] = &[
    ("temp10", || DatatypeKind::Scaled { factor: 10.0 }),
    ("temp100", || DatatypeKind::Scaled { factor: 100.0 }),
];

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 4] = [
        DeviceFamily::Generic,
        DeviceFamily::Denon,
        DeviceFamily::Pioneer,
        DeviceFamily::Heating,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceFamily::Generic => "generic",
            DeviceFamily::Denon => "denon",
            DeviceFamily::Pioneer => "pioneer",
            DeviceFamily::Heating => "heating",
        }
    }

    fn catalogue(&self) -> &'static [(&'static str, KindCtor)] {
        match self {
            DeviceFamily::Generic => &[],
            DeviceFamily::Denon => DENON,
            DeviceFamily::Pioneer => PIONEER,
            DeviceFamily::Heating => HEATING,
        }
    }

    /// Converter names this family adds or overrides.
    pub fn datatype_names(&self) -> impl Iterator<Item = &'static str> {
        self.catalogue().iter().map(|(n, _)| *n)
    }

    /// Resolve a converter name, family first, built-ins second.
    pub fn resolve_kind(&self, name: &str) -> Option<DatatypeKind> {
        self.catalogue()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ctor)| ctor())
            .or_else(|| builtin_kind(name))
    }

    /// Build a converter instance, falling back to `raw` for unknown names.
    pub fn datatype(&self, name: &str, fail_silent: bool) -> Datatype {
        match self.resolve_kind(name) {
            Some(kind) => Datatype::new(name, kind).with_fail_silent(fail_silent),
            None => {
                tracing::error!(
                    "Unknown datatype '{}' for family '{}', using raw",
                    name,
                    self.name()
                );
                Datatype::raw().with_fail_silent(fail_silent)
            }
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown device family: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartdevice_core::Value;

    #[test]
    fn test_family_overrides_builtin() {
        let builtin = DeviceFamily::Generic.datatype("onoff", true);
        assert_eq!(builtin.to_wire(&Value::Bool(true)).unwrap(), Value::from("ON"));

        let pioneer = DeviceFamily::Pioneer.datatype("onoff", true);
        assert_eq!(pioneer.to_wire(&Value::Bool(true)).unwrap(), Value::from("0"));
    }

    #[test]
    fn test_family_falls_back_to_builtin() {
        let dt = DeviceFamily::Denon.datatype("int", true);
        assert_eq!(dt.kind(), &DatatypeKind::Int);
    }

    #[test]
    fn test_unknown_datatype_is_raw() {
        let dt = DeviceFamily::Heating.datatype("warp", false);
        assert_eq!(dt.kind(), &DatatypeKind::Raw);
        assert!(!dt.is_fail_silent());
    }

    #[test]
    fn test_denon_power() {
        let dt = DeviceFamily::Denon.datatype("power", true);
        assert_eq!(dt.to_wire(&Value::Bool(false)).unwrap(), Value::from("STANDBY"));
        assert_eq!(dt.from_wire(&Value::from("ON"), None).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_pioneer_volume() {
        let dt = DeviceFamily::Pioneer.datatype("vol", true);
        assert_eq!(dt.to_wire(&Value::Float(-40.0)).unwrap(), Value::from("081"));
        assert_eq!(dt.from_wire(&Value::from("081"), None).unwrap(), Value::Float(-40.0));
        assert_eq!(dt.to_wire(&Value::Float(0.0)).unwrap(), Value::from("161"));
    }

    #[test]
    fn test_parse_family_name() {
        assert_eq!("Denon".parse::<DeviceFamily>().unwrap(), DeviceFamily::Denon);
        assert!("sony".parse::<DeviceFamily>().is_err());
    }
}
