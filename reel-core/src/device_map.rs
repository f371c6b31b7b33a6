use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceMap {
    ForceCpu,
    Ordinal(usize),
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::Ordinal(0)
    }
}

impl DeviceMap {
    pub fn from_cpu_flag(cpu: bool) -> Self {
        if cpu {
            Self::ForceCpu
        } else {
            Self::default()
        }
    }
}

/// Renders the device the way the sampler expects it on its command line.
impl fmt::Display for DeviceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMap::ForceCpu => write!(f, "cpu"),
            DeviceMap::Ordinal(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}
