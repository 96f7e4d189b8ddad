// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

/// Surface capabilities with the API types stripped off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceLimits {
    pub min_image_count: u32,
    /// 0 means the surface puts no upper bound on the image count.
    pub max_image_count: u32,
    /// Set when the surface dictates the extent (most X11/Windows surfaces).
    pub current_extent: Option<RenderSize>,
    pub min_extent: RenderSize,
    pub max_extent: RenderSize,
}

impl SurfaceLimits {
    /// One image more than the minimum so acquire rarely waits on the
    /// presentation engine.
    pub fn image_count(&self) -> u32 {
        let want = self.min_image_count.saturating_add(1);
        if self.max_image_count == 0 {
            want
        } else {
            want.min(self.max_image_count)
        }
    }

    pub fn extent(&self, want: RenderSize) -> RenderSize {
        if let Some(fixed) = self.current_extent {
            return fixed;
        }
        // max/min instead of clamp: drivers have been seen reporting min > max.
        RenderSize {
            width: want
                .width
                .max(self.min_extent.width)
                .min(self.max_extent.width),
            height: want
                .height
                .max(self.min_extent.height)
                .min(self.max_extent.height),
        }
    }
}

/// What a successful chain build reports back to the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub image_count: usize,
    pub extent: RenderSize,
    pub generation: u64,
    pub format: String,
    pub present_mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(min: u32, max: u32) -> SurfaceLimits {
        SurfaceLimits {
            min_image_count: min,
            max_image_count: max,
            current_extent: None,
            min_extent: RenderSize::new(1, 1),
            max_extent: RenderSize::new(4096, 4096),
        }
    }

    #[test]
    fn unbounded_max_never_rejects_min_plus_one() {
        assert_eq!(limits(2, 0).image_count(), 3);
        assert_eq!(limits(u32::MAX, 0).image_count(), u32::MAX);
    }

    #[test]
    fn bounded_max_clamps() {
        assert_eq!(limits(2, 8).image_count(), 3);
        assert_eq!(limits(3, 3).image_count(), 3);
    }

    #[test]
    fn fixed_extent_wins() {
        let mut l = limits(2, 3);
        l.current_extent = Some(RenderSize::new(640, 480));
        assert_eq!(l.extent(RenderSize::new(1920, 1080)), RenderSize::new(640, 480));
    }

    #[test]
    fn requested_extent_is_clamped() {
        let l = limits(2, 3);
        assert_eq!(l.extent(RenderSize::new(9000, 0)), RenderSize::new(4096, 1));
        assert_eq!(l.extent(RenderSize::new(800, 600)), RenderSize::new(800, 600));
    }
}
