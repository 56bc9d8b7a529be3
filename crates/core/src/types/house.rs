//! House and add-on module records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::HouseId;
use super::image::{ImageView, image_path};

/// Structural layout of a house model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HouseType {
    #[serde(rename = "articulated")]
    Articulated,
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "parallel")]
    Parallel,
    #[serde(rename = "tiny")]
    Tiny,
    #[serde(rename = "linear tiny")]
    LinearTiny,
}

impl HouseType {
    /// Label as written in the catalog data.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Articulated => "articulated",
            Self::Linear => "linear",
            Self::Parallel => "parallel",
            Self::Tiny => "tiny",
            Self::LinearTiny => "linear tiny",
        }
    }
}

impl fmt::Display for HouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Size label of a record.
///
/// Houses use the XS..XL scale; add-on modules are labelled by area
/// (`"30m2"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SizeClass {
    ExtraSmall,
    Small,
    Medium,
    Large,
    ExtraLarge,
    /// Area label in square meters.
    Area(u32),
}

/// A size label that is neither XS..XL nor `<n>m2`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown size class: {0}")]
pub struct UnknownSizeClass(pub String);

impl FromStr for SizeClass {
    type Err = UnknownSizeClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "XS" => Ok(Self::ExtraSmall),
            "S" => Ok(Self::Small),
            "M" => Ok(Self::Medium),
            "L" => Ok(Self::Large),
            "XL" => Ok(Self::ExtraLarge),
            other => other
                .strip_suffix("m2")
                .and_then(|n| n.parse().ok())
                .map(Self::Area)
                .ok_or_else(|| UnknownSizeClass(other.to_string())),
        }
    }
}

impl TryFrom<String> for SizeClass {
    type Error = UnknownSizeClass;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeClass> for String {
    fn from(size: SizeClass) -> Self {
        size.to_string()
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtraSmall => f.write_str("XS"),
            Self::Small => f.write_str("S"),
            Self::Medium => f.write_str("M"),
            Self::Large => f.write_str("L"),
            Self::ExtraLarge => f.write_str("XL"),
            Self::Area(m2) => write!(f, "{m2}m2"),
        }
    }
}

/// A house model in the catalog.
///
/// Room descriptions are free text and their order is significant: the
/// bedroom classifier takes the first description that matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseRecord {
    pub id: HouseId,
    #[serde(rename = "type")]
    pub kind: HouseType,
    pub size: SizeClass,
    pub total_area_m2: f64,
    pub rooms: Vec<String>,
    /// Image reference such as `XS_-_A.jpg`, see [`image_path`].
    pub image_url: String,
}

/// Optional auxiliary unit ("tiny" module). Same shape as a house but kept
/// in its own collection.
pub type AddOnModuleRecord = HouseRecord;

impl HouseRecord {
    /// Bedroom count derived from the room descriptions.
    #[must_use]
    pub fn bedrooms(&self) -> u32 {
        crate::catalog::bedroom_count(&self.rooms)
    }

    /// Asset path of this record's image for the given view.
    #[must_use]
    pub fn image_path(&self, view: ImageView) -> String {
        image_path(&self.image_url, view)
    }
}
