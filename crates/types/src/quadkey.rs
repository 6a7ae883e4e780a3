//! Quadkey tile addressing.
//!
//! A quadkey encodes a Web Mercator tile as a string of base-4 digits, one
//! per zoom level. The empty quadkey is the single zoom-0 tile.

use crate::bbox::BoundingBox2D;
use crate::projection::{lon_lat_to_pixel, pixel_to_lon_lat};
use geo::Point;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Deepest supported zoom level.
pub const MAX_ZOOM: u8 = 30;

/// Errors raised while parsing or building a quadkey.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuadkeyError {
    #[error("invalid quadkey digit '{0}'")]
    InvalidDigit(char),
    #[error("quadkey zoom {0} exceeds the maximum of {}", MAX_ZOOM)]
    TooDeep(usize),
    #[error("tile ({x}, {y}) is outside zoom level {zoom}")]
    TileOutOfRange { x: u32, y: u32, zoom: u8 },
}

/// A validated quadkey.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quadkey(String);

impl Quadkey {
    /// Parse a quadkey string.
    ///
    /// ```
    /// use spatio_cluster_types::quadkey::Quadkey;
    ///
    /// let qk = Quadkey::new("120").unwrap();
    /// assert_eq!(qk.zoom(), 3);
    /// assert_eq!(qk.parent().unwrap().as_str(), "12");
    /// assert!(Quadkey::new("124").is_err());
    /// ```
    pub fn new(key: impl Into<String>) -> Result<Self, QuadkeyError> {
        let key = key.into();
        if key.len() > MAX_ZOOM as usize {
            return Err(QuadkeyError::TooDeep(key.len()));
        }
        if let Some(bad) = key.chars().find(|c| !matches!(c, '0'..='3')) {
            return Err(QuadkeyError::InvalidDigit(bad));
        }
        Ok(Self(key))
    }

    /// The zoom-0 tile.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Build the quadkey of tile `(x, y)` at `zoom`.
    pub fn from_tile(x: u32, y: u32, zoom: u8) -> Result<Self, QuadkeyError> {
        if zoom > MAX_ZOOM {
            return Err(QuadkeyError::TooDeep(zoom as usize));
        }
        let side = 1u64 << zoom;
        if u64::from(x) >= side || u64::from(y) >= side {
            return Err(QuadkeyError::TileOutOfRange { x, y, zoom });
        }

        let mut key = String::with_capacity(zoom as usize);
        for level in (1..=zoom).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if x & mask != 0 {
                digit += 1;
            }
            if y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        Ok(Self(key))
    }

    /// Quadkey of the tile at `zoom` containing `point`.
    pub fn covering(point: &Point, zoom: u8) -> Result<Self, QuadkeyError> {
        let zoom = zoom.min(MAX_ZOOM);
        let side = f64::from(1u32 << zoom);
        let (px, py) = lon_lat_to_pixel(point.x(), point.y(), side);
        let max = (1u64 << zoom) - 1;
        let clamp = |v: f64| (v.floor().max(0.0) as u64).min(max) as u32;
        Self::from_tile(clamp(px), clamp(py), zoom)
    }

    /// Decode into `(x, y, zoom)` tile coordinates.
    pub fn to_tile(&self) -> (u32, u32, u8) {
        let mut x = 0u32;
        let mut y = 0u32;
        for digit in self.0.bytes() {
            x <<= 1;
            y <<= 1;
            let d = digit - b'0';
            x |= u32::from(d & 1);
            y |= u32::from(d >> 1);
        }
        (x, y, self.zoom())
    }

    pub fn zoom(&self) -> u8 {
        self.0.len() as u8
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The enclosing tile one level up, `None` for the root.
    pub fn parent(&self) -> Option<Quadkey> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_string()))
        }
    }

    /// All strict ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Quadkey> + '_ {
        (0..self.0.len()).rev().map(|len| Self(self.0[..len].to_string()))
    }

    pub fn children(&self) -> SmallVec<[Quadkey; 4]> {
        if self.0.len() >= MAX_ZOOM as usize {
            return SmallVec::new();
        }
        ['0', '1', '2', '3']
            .into_iter()
            .map(|digit| {
                let mut key = self.0.clone();
                key.push(digit);
                Self(key)
            })
            .collect()
    }

    /// True when `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &Quadkey) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Geographic bounds of the tile.
    pub fn bounds(&self) -> BoundingBox2D {
        let (x, y, zoom) = self.to_tile();
        let side = f64::from(1u32 << zoom.min(31));
        let (west, north) = pixel_to_lon_lat(f64::from(x), f64::from(y), side);
        let (east, south) = pixel_to_lon_lat(f64::from(x) + 1.0, f64::from(y) + 1.0, side);
        BoundingBox2D::new(west, south, east, north)
    }
}

impl fmt::Display for Quadkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Quadkey {
    type Err = QuadkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Quadkey {
    type Error = QuadkeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quadkey> for String {
    fn from(value: Quadkey) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_round_trip() {
        let qk = Quadkey::from_tile(3, 5, 3).unwrap();
        assert_eq!(qk.as_str(), "213");
        assert_eq!(qk.to_tile(), (3, 5, 3));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(Quadkey::new("0a"), Err(QuadkeyError::InvalidDigit('a')));
        assert!(Quadkey::new("0".repeat(31)).is_err());
        assert!(Quadkey::from_tile(4, 0, 2).is_err());
    }

    #[test]
    fn test_hierarchy() {
        let qk: Quadkey = "1203".parse().unwrap();
        let ancestors: Vec<_> = qk.ancestors().map(|a| a.to_string()).collect();
        assert_eq!(ancestors, vec!["120", "12", "1", ""]);
        assert!(Quadkey::new("12").unwrap().is_ancestor_of(&qk));
        assert!(!Quadkey::new("13").unwrap().is_ancestor_of(&qk));
        assert_eq!(qk.children().len(), 4);
        assert!(Quadkey::root().parent().is_none());
    }

    #[test]
    fn test_bounds_of_quadrants() {
        let nw = Quadkey::new("0").unwrap().bounds();
        assert!((nw.min_x() + 180.0).abs() < 1e-9);
        assert!(nw.max_x().abs() < 1e-9);
        assert!(nw.min_y().abs() < 1e-9);
        assert!(nw.max_y() > 85.0);
    }

    #[test]
    fn test_covering_contains_point() {
        let point = Point::new(10.0, 10.0);
        let qk = Quadkey::covering(&point, 13).unwrap();
        assert_eq!(qk.zoom(), 13);
        assert!(qk.bounds().contains_point(&point));
        assert!(qk.parent().unwrap().bounds().contains_point(&point));
    }
}
