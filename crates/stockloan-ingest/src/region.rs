//! Regions published on the stock-loan FTP server
//!
//! Each region maps to one file, `<region>.txt`, at the root of the server.
//! The identifier is also what lands in the `country` column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Australia,
    Austria,
    Belgium,
    British,
    Canada,
    Dutch,
    France,
    Germany,
    HongKong,
    India,
    Italy,
    Japan,
    Mexico,
    Spain,
    Swedish,
    Swiss,
    Usa,
}

impl Region {
    /// Every region, in the order they are fetched by default
    pub const ALL: [Region; 17] = [
        Region::Australia,
        Region::Austria,
        Region::Belgium,
        Region::British,
        Region::Canada,
        Region::Dutch,
        Region::France,
        Region::Germany,
        Region::HongKong,
        Region::India,
        Region::Italy,
        Region::Japan,
        Region::Mexico,
        Region::Spain,
        Region::Swedish,
        Region::Swiss,
        Region::Usa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Australia => "australia",
            Region::Austria => "austria",
            Region::Belgium => "belgium",
            Region::British => "british",
            Region::Canada => "canada",
            Region::Dutch => "dutch",
            Region::France => "france",
            Region::Germany => "germany",
            Region::HongKong => "hongkong",
            Region::India => "india",
            Region::Italy => "italy",
            Region::Japan => "japan",
            Region::Mexico => "mexico",
            Region::Spain => "spain",
            Region::Swedish => "swedish",
            Region::Swiss => "swiss",
            Region::Usa => "usa",
        }
    }

    /// Remote path of this region's availability file
    pub fn file_name(self) -> String {
        format!("{}.txt", self.as_str())
    }

    /// Parse a comma-separated list such as `"usa, canada,japan"`
    pub fn parse_list(list: &str) -> Result<Vec<Region>, IngestError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| IngestError::Config(format!("Unknown region: {}", s)))
    }
}
