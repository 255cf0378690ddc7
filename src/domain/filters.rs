//! Review filter and sort enums with their wire values.
//!
//! Each filter carries an `All` sentinel; sentinel values are omitted from
//! the request body entirely rather than sent as a literal.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Sort order for the review list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum SortOrder {
    MostRelevant,
    #[default]
    NewestFirst,
    OldestFirst,
    HighestScore,
    LowestScore,
}

impl SortOrder {
    pub fn api_value(self) -> &'static str {
        match self {
            Self::MostRelevant => "MOST_RELEVANT",
            Self::NewestFirst => "NEWEST_FIRST",
            Self::OldestFirst => "OLDEST_FIRST",
            Self::HighestScore => "SCORE_DESC",
            Self::LowestScore => "SCORE_ASC",
        }
    }
}

/// Seasonal filter, expressed as month ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum TimeOfYear {
    #[default]
    All,
    MarMay,
    JunAug,
    SepNov,
    DecFeb,
}

impl TimeOfYear {
    pub fn api_value(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::MarMay => Some("_03_05"),
            Self::JunAug => Some("_06_08"),
            Self::SepNov => Some("_09_11"),
            Self::DecFeb => Some("_12_02"),
        }
    }
}

/// Customer type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum CustomerType {
    #[default]
    All,
    Families,
    Couples,
    GroupOfFriends,
    SoloTravellers,
    BusinessTravellers,
}

impl CustomerType {
    pub fn api_value(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::Families => Some("FAMILIES"),
            Self::Couples => Some("COUPLES"),
            Self::GroupOfFriends => Some("GROUP_OF_FRIENDS"),
            Self::SoloTravellers => Some("SOLO_TRAVELLERS"),
            Self::BusinessTravellers => Some("BUSINESS_TRAVELLERS"),
        }
    }
}

/// Score range filter, named after the source's review adjectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum ScoreRange {
    #[default]
    All,
    Wonderful,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl ScoreRange {
    pub fn api_value(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::Wonderful => Some("REVIEW_ADJ_SUPERB"),
            Self::Good => Some("REVIEW_ADJ_GOOD"),
            Self::Fair => Some("REVIEW_ADJ_AVERAGE_PASSABLE"),
            Self::Poor => Some("REVIEW_ADJ_POOR"),
            Self::VeryPoor => Some("REVIEW_ADJ_VERY_POOR"),
        }
    }
}
