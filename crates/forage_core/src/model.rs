use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Identifier of a taxon in the external taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonId(pub u64);

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaxonId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for TaxonId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TaxonId)
            .map_err(|_| ParseError::TaxonId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Parses the `"lat,lng"` form the observation service reports locations in.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::Coordinate(input.to_string());
        let (lat, lng) = input.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        if !lat.is_finite() || !lng.is_finite() {
            return Err(invalid());
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(invalid());
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// Calendar number, 1 for January.
    pub fn number(&self) -> u32 {
        *self as u32 + 1
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.get(number.checked_sub(1)? as usize).copied()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|month| month.name().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Month {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ParseError::Month(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Biweekly,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Biweekly => "biweekly",
            Frequency::Weekly => "weekly",
        }
    }
}

impl FromStr for Frequency {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Frequency::Monthly),
            "biweekly" => Ok(Frequency::Biweekly),
            "weekly" => Ok(Frequency::Weekly),
            _ => Err(ParseError::Frequency(s.to_string())),
        }
    }
}

/// A species the user wants to be reminded about, persisted per taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: TaxonId,
    pub name: String,
    /// Plant-part tags, e.g. "leaves, flowers".
    #[serde(rename = "type")]
    pub kind: String,
    pub months: BTreeSet<Month>,
    pub frequency: Frequency,
    #[serde(rename = "imageURL")]
    pub image_url: String,
}

impl ReminderRecord {
    pub fn in_season(&self, month: Month) -> bool {
        self.months.contains(&month)
    }
}

pub type ReminderMap = BTreeMap<TaxonId, ReminderRecord>;

/// Candidate species for a distance search, keyed by taxon.
pub type CandidateSet = BTreeMap<TaxonId, String>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "km", rename_all = "snake_case")]
pub enum NearestDistance {
    Found(f64),
    NotFound,
}

impl NearestDistance {
    pub fn km(&self) -> Option<f64> {
        match self {
            NearestDistance::Found(km) => Some(*km),
            NearestDistance::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, NearestDistance::Found(_))
    }
}

pub type DistanceMap = BTreeMap<TaxonId, NearestDistance>;
