// Colormaps - 256-entry lookup tables interpolated from anchor colours

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::PipelineError;

type Rgb = [u8; 3];
type Lut = [Rgb; 256];

const INFERNO: [Rgb; 9] = [
    [0, 0, 4],
    [31, 12, 72],
    [85, 15, 109],
    [136, 34, 106],
    [186, 54, 85],
    [227, 89, 51],
    [249, 140, 10],
    [249, 201, 50],
    [252, 255, 164],
];

const MAGMA: [Rgb; 9] = [
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

const VIRIDIS: [Rgb; 9] = [
    [68, 1, 84],
    [72, 40, 120],
    [62, 73, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [110, 206, 88],
    [253, 231, 37],
];

const PLASMA: [Rgb; 9] = [
    [13, 8, 135],
    [76, 2, 161],
    [126, 3, 168],
    [169, 35, 149],
    [204, 71, 120],
    [229, 107, 93],
    [248, 149, 64],
    [253, 197, 39],
    [240, 249, 33],
];

const GRAY: [Rgb; 2] = [[0, 0, 0], [255, 255, 255]];

/// Piecewise-linear interpolation through evenly spaced anchors
fn build_lut(anchors: &[Rgb]) -> Lut {
    let mut lut = [[0u8; 3]; 256];
    let segments = (anchors.len() - 1) as f64;
    for (i, entry) in lut.iter_mut().enumerate() {
        let position = i as f64 / 255.0 * segments;
        let lower = (position.floor() as usize).min(anchors.len() - 2);
        let t = position - lower as f64;
        for c in 0..3 {
            let a = anchors[lower][c] as f64;
            let b = anchors[lower + 1][c] as f64;
            entry[c] = (a + (b - a) * t).round().clamp(0.0, 255.0) as u8;
        }
    }
    lut
}

static INFERNO_LUT: Lazy<Lut> = Lazy::new(|| build_lut(&INFERNO));
static MAGMA_LUT: Lazy<Lut> = Lazy::new(|| build_lut(&MAGMA));
static VIRIDIS_LUT: Lazy<Lut> = Lazy::new(|| build_lut(&VIRIDIS));
static PLASMA_LUT: Lazy<Lut> = Lazy::new(|| build_lut(&PLASMA));
static GRAY_LUT: Lazy<Lut> = Lazy::new(|| build_lut(&GRAY));

/// Supported colormaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Inferno,
    Magma,
    Viridis,
    Plasma,
    Gray,
}

impl Colormap {
    pub fn as_str(&self) -> &'static str {
        match self {
            Colormap::Inferno => "inferno",
            Colormap::Magma => "magma",
            Colormap::Viridis => "viridis",
            Colormap::Plasma => "plasma",
            Colormap::Gray => "gray",
        }
    }

    fn lut(&self) -> &'static Lut {
        match self {
            Colormap::Inferno => &INFERNO_LUT,
            Colormap::Magma => &MAGMA_LUT,
            Colormap::Viridis => &VIRIDIS_LUT,
            Colormap::Plasma => &PLASMA_LUT,
            Colormap::Gray => &GRAY_LUT,
        }
    }

    /// Colour for a normalized value; out-of-range values are clamped
    pub fn color(&self, value: f64) -> Rgb {
        let v = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        self.lut()[(v * 255.0).round() as usize]
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colormap {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inferno" => Ok(Colormap::Inferno),
            "magma" => Ok(Colormap::Magma),
            "viridis" => Ok(Colormap::Viridis),
            "plasma" => Ok(Colormap::Plasma),
            "gray" | "grey" => Ok(Colormap::Gray),
            _ => Err(PipelineError::UnsupportedOption {
                option: "colormap",
                value: s.to_string(),
                expected: "inferno, magma, viridis, plasma, gray",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_match_anchors() {
        assert_eq!(Colormap::Inferno.color(0.0), [0, 0, 4]);
        assert_eq!(Colormap::Inferno.color(1.0), [252, 255, 164]);
        assert_eq!(Colormap::Viridis.color(1.0), [253, 231, 37]);
        assert_eq!(Colormap::Gray.color(0.0), [0, 0, 0]);
        assert_eq!(Colormap::Gray.color(1.0), [255, 255, 255]);
    }

    #[test]
    fn test_gray_is_monotonic() {
        let mut previous = 0;
        for i in 0..=100 {
            let [r, g, b] = Colormap::Gray.color(i as f64 / 100.0);
            assert_eq!(r, g);
            assert_eq!(g, b);
            assert!(r >= previous);
            previous = r;
        }
    }

    #[test]
    fn test_names() {
        assert_eq!("Magma".parse::<Colormap>().unwrap(), Colormap::Magma);
        assert_eq!("grey".parse::<Colormap>().unwrap(), Colormap::Gray);
        assert!(matches!(
            "jet".parse::<Colormap>(),
            Err(PipelineError::UnsupportedOption { .. })
        ));
        assert_eq!(Colormap::Gray.color(f64::NAN), [0, 0, 0]);
    }
}
