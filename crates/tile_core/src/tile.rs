use glam::UVec2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Row convention of a tile id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scheme {
    /// y = 0 is the northernmost row (OSM / Google convention).
    SlippyMap,
    /// y = 0 is the southernmost row.
    Tms,
}

/// One cell of the global quadtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    pub zoom_level: u32,
    pub coords: UVec2,
    pub scheme: Scheme,
}

impl Id {
    #[inline]
    pub const fn new(zoom_level: u32, x: u32, y: u32, scheme: Scheme) -> Self {
        Self { zoom_level, coords: UVec2::new(x, y), scheme }
    }

    #[inline]
    pub const fn root() -> Self {
        Self::new(0, 0, 0, Scheme::Tms)
    }

    /// Returns the same cell expressed in `scheme`.
    pub fn to(self, scheme: Scheme) -> Self {
        if self.scheme == scheme {
            return self;
        }
        let n = 1u32.checked_shl(self.zoom_level).unwrap_or(0);
        let y = n.wrapping_sub(1).wrapping_sub(self.coords.y);
        Self { zoom_level: self.zoom_level, coords: UVec2::new(self.coords.x, y), scheme }
    }

    /// The enclosing tile one level up, `None` for the root.
    #[inline]
    pub fn parent(self) -> Option<Self> {
        if self.zoom_level == 0 {
            return None;
        }
        Some(Self { zoom_level: self.zoom_level - 1, coords: self.coords / 2, scheme: self.scheme })
    }

    /// The four tiles one level down. Their union is exactly `self`.
    pub fn children(self) -> [Self; 4] {
        let z = self.zoom_level + 1;
        let base = self.coords * 2;
        [
            Self { zoom_level: z, coords: base, scheme: self.scheme },
            Self { zoom_level: z, coords: base + UVec2::new(1, 0), scheme: self.scheme },
            Self { zoom_level: z, coords: base + UVec2::new(0, 1), scheme: self.scheme },
            Self { zoom_level: z, coords: base + UVec2::new(1, 1), scheme: self.scheme },
        ]
    }

    /// True if `self` is `other` or lies on the path from `other` to the root.
    pub fn is_ancestor_of(self, other: Self) -> bool {
        let other = other.to(self.scheme);
        if self.zoom_level > other.zoom_level {
            return false;
        }
        let shift = other.zoom_level - self.zoom_level;
        let coords = UVec2::new(
            other.coords.x.checked_shr(shift).unwrap_or(0),
            other.coords.y.checked_shr(shift).unwrap_or(0),
        );
        coords == self.coords
    }

    /// Ancestor at `zoom_level`, or `self` if it is already that coarse.
    pub fn ancestor_at(self, zoom_level: u32) -> Self {
        let mut id = self;
        while id.zoom_level > zoom_level {
            match id.parent() {
                Some(p) => id = p,
                None => break,
            }
        }
        id
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.zoom_level, self.coords.x, self.coords.y, self.scheme).cmp(&(
            other.zoom_level,
            other.coords.x,
            other.coords.y,
            other.scheme,
        ))
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self.scheme {
            Scheme::SlippyMap => "xyz",
            Scheme::Tms => "tms",
        };
        write!(f, "{}/{}/{}@{}", self.zoom_level, self.coords.x, self.coords.y, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_children_is_self() {
        let id = Id::new(7, 33, 90, Scheme::Tms);
        for child in id.children() {
            assert_eq!(child.parent(), Some(id));
            assert!(id.is_ancestor_of(child));
        }
        assert_eq!(Id::root().parent(), None);
    }

    #[test]
    fn scheme_conversion_flips_rows() {
        let id = Id::new(2, 1, 0, Scheme::Tms);
        let slippy = id.to(Scheme::SlippyMap);
        assert_eq!(slippy.coords, UVec2::new(1, 3));
        assert_eq!(slippy.to(Scheme::Tms), id);
        assert_eq!(Id::root().to(Scheme::SlippyMap).coords, UVec2::ZERO);
    }

    #[test]
    fn ancestry_across_schemes() {
        let tms = Id::new(3, 5, 1, Scheme::Tms);
        let leaf = Id::new(5, 21, 6, Scheme::Tms).to(Scheme::SlippyMap);
        assert!(tms.is_ancestor_of(leaf));
        assert!(!leaf.to(Scheme::Tms).is_ancestor_of(tms));
        assert_eq!(Id::new(5, 21, 6, Scheme::Tms).ancestor_at(3), tms);
    }
}
