//! Fixed-width result records sent back over the control channel
//!
//! ```text
//! Angle:          L S AAAA XXX YYY E     S: 1 for >= 0, 0 for < 0
//!                                        AAAA: |deviation| x 10, truncated
//! Material:       C r g b E              area code 1-3 per color, 0 unknown
//! Annulus:        L 0000 XXX YYY E       circle center
//! Annulus colors: R XXXYYY G XXXYYY B XXXYYY   FFFFFF for a missing color
//! ```
//!
//! Numeric fields saturate at their width (9999 / 999) so a record never
//! changes length.

use std::fmt;

const MAX_ANGLE_FIELD: u32 = 9999;
const MAX_COORD: u32 = 999;

/// Deviation of a detected corner from the target angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleRecord {
    /// Detected minus target, in degrees
    pub deviation: f64,
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for AngleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tenths = (self.deviation * 10.0).trunc();
        let sign = if tenths < 0.0 { '0' } else { '1' };
        let magnitude = (tenths.abs() as u32).min(MAX_ANGLE_FIELD);
        write!(
            f,
            "L{}{:04}{:03}{:03}E",
            sign,
            magnitude,
            self.x.min(MAX_COORD),
            self.y.min(MAX_COORD)
        )
    }
}

/// Area (1..=3) holding each colored material, `None` when not placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialRecord {
    pub red: Option<u8>,
    pub green: Option<u8>,
    pub blue: Option<u8>,
}

impl fmt::Display for MaterialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = |area: Option<u8>| area.filter(|a| (1..=9).contains(a)).unwrap_or(0);
        write!(
            f,
            "C{}{}{}E",
            code(self.red),
            code(self.green),
            code(self.blue)
        )
    }
}

/// Center of the ground annulus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnulusRecord {
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for AnnulusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L0000{:03}{:03}E", self.x.min(MAX_COORD), self.y.min(MAX_COORD))
    }
}

/// Centers of the red, green and blue annuli
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnulusColorsRecord {
    pub red: Option<(u32, u32)>,
    pub green: Option<(u32, u32)>,
    pub blue: Option<(u32, u32)>,
}

impl fmt::Display for AnnulusColorsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tag, center) in [('R', self.red), ('G', self.green), ('B', self.blue)] {
            match center {
                Some((x, y)) => write!(f, "{}{:03}{:03}", tag, x.min(MAX_COORD), y.min(MAX_COORD))?,
                None => write!(f, "{}FFFFFF", tag)?,
            }
        }
        Ok(())
    }
}
