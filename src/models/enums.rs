use std::fmt;

use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ProcedureStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
});

str_enum!(FillingMaterial {
    Composite => "composite",
    Glasionomeer => "glasionomeer",
    Amalgam => "amalgam",
});

str_enum!(CrownMaterial {
    Porcelain => "porcelain",
    Gold => "gold",
});

str_enum!(ExtractionVariant {
    Simple => "simple",
    Surgical => "surgical",
});

str_enum!(BridgeRole {
    Abutment => "abutment",
    Pontic => "pontic",
});

str_enum!(Lifecycle {
    Pending => "pending",
    Current => "current",
    History => "history",
});

str_enum!(CodeCategory {
    Filling => "filling",
    Sealing => "sealing",
    Anesthesia => "anesthesia",
    Additional => "additional",
    Scaling => "scaling",
    Extraction => "extraction",
    Crown => "crown",
    Bridge => "bridge",
    Marker => "marker",
});

str_enum!(Tool {
    Filling => "filling",
    Sealing => "sealing",
    Crown => "crown",
    Bridge => "bridge",
    Extraction => "extraction",
    Disabled => "disabled",
    Scaling => "scaling",
});

impl From<ProcedureStatus> for Lifecycle {
    fn from(status: ProcedureStatus) -> Self {
        match status {
            ProcedureStatus::Pending => Lifecycle::Pending,
            ProcedureStatus::InProgress => Lifecycle::Current,
            ProcedureStatus::Completed => Lifecycle::History,
        }
    }
}

impl FillingMaterial {
    /// Digit used in filling codes and material shorthand (`V9x`, `v91`).
    pub fn code_digit(&self) -> u8 {
        match self {
            FillingMaterial::Amalgam => 7,
            FillingMaterial::Glasionomeer => 8,
            FillingMaterial::Composite => 9,
        }
    }

    pub fn from_code_digit(digit: u8) -> Option<Self> {
        match digit {
            7 => Some(FillingMaterial::Amalgam),
            8 => Some(FillingMaterial::Glasionomeer),
            9 => Some(FillingMaterial::Composite),
            _ => None,
        }
    }
}
