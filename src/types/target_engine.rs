//! Engine letters of the target mini-language (`G@`, `L@`, `N@`, ...).

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

/// The closed set of engines that may tag a target token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum TargetEngine {
    /// `G@` grain glob
    Grain,
    /// `P@` grain regex
    GrainPcre,
    /// `I@` pillar glob
    Pillar,
    /// `J@` pillar regex
    PillarPcre,
    /// `L@` literal id list
    List,
    /// `N@` nodegroup reference
    Nodegroup,
    /// `S@` IP address or CIDR block
    IpCidr,
    /// `E@` regex over minion ids
    Pcre,
    /// `R@` range cluster expression
    Range,
    /// `X@` execution-module selector
    Exsel,
}

impl TargetEngine {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'G' => Some(Self::Grain),
            'P' => Some(Self::GrainPcre),
            'I' => Some(Self::Pillar),
            'J' => Some(Self::PillarPcre),
            'L' => Some(Self::List),
            'N' => Some(Self::Nodegroup),
            'S' => Some(Self::IpCidr),
            'E' => Some(Self::Pcre),
            'R' => Some(Self::Range),
            'X' => Some(Self::Exsel),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Self::Grain => 'G',
            Self::GrainPcre => 'P',
            Self::Pillar => 'I',
            Self::PillarPcre => 'J',
            Self::List => 'L',
            Self::Nodegroup => 'N',
            Self::IpCidr => 'S',
            Self::Pcre => 'E',
            Self::Range => 'R',
            Self::Exsel => 'X',
        }
    }

    /// Engines that walk a grain/pillar document and honour a custom delimiter.
    pub fn is_path_engine(&self) -> bool {
        matches!(
            self,
            Self::Grain | Self::GrainPcre | Self::Pillar | Self::PillarPcre
        )
    }
}

impl Display for TargetEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}@", self.letter())
    }
}
