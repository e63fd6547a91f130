use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Shared by urgency and risk findings. The score → level mapping is NOT shared:
// see `UrgencyAssessment::level_for_score` and `RiskFinding::level_for_score`.
str_enum!(SeverityLevel {
    Low => "Low",
    Medium => "Medium",
    High => "High",
    Critical => "Critical",
});

str_enum!(Gender {
    Male => "Male",
    Female => "Female",
    Other => "Other",
});

str_enum!(PrescriptionStatus {
    Pending => "Pending",
    Digitized => "Digitized",
    Verified => "Verified",
});

str_enum!(Role {
    Doctor => "doctor",
    Admin => "admin",
    Patient => "patient",
});

impl SeverityLevel {
    /// Case-insensitive token match used when reading model output.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl PrescriptionStatus {
    /// Manual changes may only confirm a record or leave it as is. `Digitized`
    /// is assigned by OCR at insert time, never by hand.
    pub fn can_transition_to(self, next: PrescriptionStatus) -> bool {
        next == self || next == Self::Verified
    }

    /// Status assigned by the digitizer. Never `Verified`.
    pub fn from_ocr_count(medications: usize) -> Self {
        if medications > 0 {
            Self::Digitized
        } else {
            Self::Pending
        }
    }
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Doctor | Self::Admin)
    }
}
