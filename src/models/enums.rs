use serde::{Deserialize, Serialize};

/// Error returned when a stored or user-supplied string matches no enum variant.
#[derive(Debug, thiserror::Error)]
#[error("Invalid {field} value: '{value}'")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentType {
    Invoice => "invoice",
    Receipt => "receipt",
    Contract => "contract",
    Letter => "letter",
    Report => "report",
    Statement => "statement",
    Unknown => "unknown",
});

impl DocumentType {
    /// Map the model's raw type string onto a known type.
    ///
    /// Only an exact, case-insensitive match counts; anything else is `Unknown`.
    pub fn from_raw(raw: &str) -> Self {
        raw.trim()
            .to_lowercase()
            .parse()
            .unwrap_or(DocumentType::Unknown)
    }
}

str_enum!(OcrRecommendation {
    UseCandidateB => "use_candidate_b",
    KeepCandidateA => "keep_candidate_a",
    NoExistingText => "no_existing_text",
});
