//! Target model selection for the compiler frontend server.

use std::fmt;
use std::str::FromStr;

use crate::error::DriverError;

/// The `--target=` value passed to the frontend server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TargetModel {
    /// The standard Flutter target.
    Flutter,
    /// The Flutter runner embedder target.
    FlutterRunner,
}

impl fmt::Display for TargetModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetModel::Flutter => "flutter",
            TargetModel::FlutterRunner => "flutter_runner",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TargetModel {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flutter" => Ok(TargetModel::Flutter),
            "flutter_runner" => Ok(TargetModel::FlutterRunner),
            other => Err(DriverError::UnknownTargetModel(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_targets() {
        assert_eq!("flutter".parse::<TargetModel>().unwrap(), TargetModel::Flutter);
        assert_eq!("flutter_runner".parse::<TargetModel>().unwrap(), TargetModel::FlutterRunner);
    }

    #[test]
    fn rejects_unknown_target() {
        let err = "vm".parse::<TargetModel>();
        assert!(matches!(err, Err(DriverError::UnknownTargetModel(_))), "unknown target must error");
    }

    #[test]
    fn display_matches_wire_value() {
        assert_eq!(TargetModel::Flutter.to_string(), "flutter");
        assert_eq!(TargetModel::FlutterRunner.to_string(), "flutter_runner");
    }
}
