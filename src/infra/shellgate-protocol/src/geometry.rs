use serde::{Deserialize, Serialize};

/// Terminal dimensions reported by the client.
///
/// `width` and `height` are pixel sizes; most terminal widgets report them as
/// zero and the remote side only cares about `rows`/`cols`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalGeometry {
    pub rows: u32,
    pub cols: u32,
    #[serde(default, alias = "widthPixels", alias = "width_pixels")]
    pub width: u32,
    #[serde(default, alias = "heightPixels", alias = "height_pixels")]
    pub height: u32,
}

impl TerminalGeometry {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            width: 0,
            height: 0,
        }
    }

    pub fn with_pixels(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self::new(24, 80)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_fields_default_to_zero() {
        let geometry: TerminalGeometry = serde_json::from_str(r#"{"rows":40,"cols":120}"#).unwrap();
        assert_eq!(geometry, TerminalGeometry::new(40, 120));
    }

    #[test]
    fn camel_case_pixel_aliases() {
        let geometry: TerminalGeometry = serde_json::from_str(
            r#"{"rows":40,"cols":120,"widthPixels":1200,"heightPixels":800}"#,
        )
        .unwrap();
        assert_eq!(geometry.width, 1200);
        assert_eq!(geometry.height, 800);
    }
}
