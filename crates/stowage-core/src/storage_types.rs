use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage driver variants
///
/// Each configured storage names one of these; the storage crate maps it to a
/// concrete driver implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Local,
    S3,
    Memory,
}

impl DriverKind {
    /// Human readable driver name, as reported in logs.
    pub fn display_name(&self) -> &'static str {
        match self {
            DriverKind::Local => "Local Storage",
            DriverKind::S3 => "Amazon S3",
            DriverKind::Memory => "In-Memory Storage",
        }
    }
}

impl FromStr for DriverKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(DriverKind::Local),
            "s3" => Ok(DriverKind::S3),
            "memory" => Ok(DriverKind::Memory),
            _ => Err(anyhow::anyhow!("Invalid storage driver: {}", s)),
        }
    }
}

impl Display for DriverKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DriverKind::Local => write!(f, "local"),
            DriverKind::S3 => write!(f, "s3"),
            DriverKind::Memory => write!(f, "memory"),
        }
    }
}
