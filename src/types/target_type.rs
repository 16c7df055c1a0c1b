//! Declared target types, as sent alongside a target expression.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::TargetError;

/// The closed set of target types a caller may declare for an expression.
///
/// String forms are the historical ones (`glob`, `grain_pcre`, `ipcidr`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TargetType {
    #[default]
    Glob,
    Pcre,
    List,
    Grain,
    GrainPcre,
    Pillar,
    PillarPcre,
    PillarExact,
    #[serde(rename = "ipcidr")]
    #[strum(serialize = "ipcidr")]
    IpCidr,
    Range,
    Compound,
    CompoundPillarExact,
    Nodegroup,
    Data,
}

impl TargetType {
    /// Parse a declared type, mapping unknown names to a typed error.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        TargetType::from_str(s.trim())
            .map_err(|_| TargetError::UnsupportedTargetType(s.to_string()))
    }

    /// The exact-pillar counterpart used by publish validation.
    pub fn pillar_exact_variant(&self) -> Self {
        match self {
            TargetType::Pillar | TargetType::PillarPcre => TargetType::PillarExact,
            TargetType::Compound => TargetType::CompoundPillarExact,
            other => *other,
        }
    }
}
