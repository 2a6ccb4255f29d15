//! Work selection: which pixels of the order still need painting.

use crate::domain::{PixelIndex, Raster, CANVAS_PIXELS};

/// Every pixel the order actually asks for. Transparent pixels carry no intent.
pub fn real_work(order: &Raster) -> Vec<PixelIndex> {
    (0..CANVAS_PIXELS)
        .filter_map(PixelIndex::new)
        .filter(|&index| order.alpha_at(index) != 0)
        .collect()
}

/// The subset of `candidates` whose colour on the live canvas differs from
/// the order. Alpha is ignored on both sides.
pub fn pending_work(candidates: &[PixelIndex], order: &Raster, live: &Raster) -> Vec<PixelIndex> {
    candidates
        .iter()
        .copied()
        .filter(|&index| order.color_at(index) != live.color_at(index))
        .collect()
}

/// Share of the order already in place, as the whole percentage shown to
/// operators: `100 - ceil(pending * 100 / total)`.
pub fn progress_percent(pending: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let remaining = (pending * 100).div_ceil(total).min(100);
    (100 - remaining) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Rgb, CANVAS_HEIGHT, CANVAS_WIDTH};

    const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
    const BLACK: Rgb = Rgb::new(0, 0, 0);

    fn order_with_patch() -> Raster {
        let mut order = Raster::transparent(CANVAS_WIDTH, CANVAS_HEIGHT);
        for (x, y) in [(0, 0), (10, 20), (1999, 1999)] {
            order.set_rgba(x, y, [0xFF, 0xFF, 0xFF, 0xFF]);
        }
        order
    }

    #[test]
    fn test_real_work_skips_transparent_pixels() {
        let work = real_work(&order_with_patch());
        let coords: Vec<_> = work.iter().map(|i| i.coords()).collect();
        assert_eq!(coords, vec![(0, 0), (10, 20), (1999, 1999)]);
    }

    #[test]
    fn test_identical_canvas_has_no_pending_work() {
        let order = Raster::filled(CANVAS_WIDTH, CANVAS_HEIGHT, WHITE);
        let work = real_work(&order);
        assert_eq!(work.len(), CANVAS_PIXELS as usize);
        assert!(pending_work(&work, &order, &order.clone()).is_empty());
    }

    #[test]
    fn test_one_flipped_pixel_is_one_work_item() {
        let order = order_with_patch();
        let mut live = Raster::filled(CANVAS_WIDTH, CANVAS_HEIGHT, WHITE);
        live.set_rgba(10, 20, [0, 0, 0, 0xFF]);

        let pending = pending_work(&real_work(&order), &order, &live);
        assert_eq!(pending, vec![PixelIndex::from_coords(10, 20).unwrap()]);
    }

    #[test]
    fn test_alpha_does_not_affect_comparison() {
        let order = order_with_patch();
        let mut live = Raster::filled(CANVAS_WIDTH, CANVAS_HEIGHT, WHITE);
        live.set_rgba(0, 0, [0xFF, 0xFF, 0xFF, 0x10]);
        assert!(pending_work(&real_work(&order), &order, &live).is_empty());

        let dark = Raster::filled(CANVAS_WIDTH, CANVAS_HEIGHT, BLACK);
        assert_eq!(pending_work(&real_work(&order), &order, &dark).len(), 3);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 200), 100);
        assert_eq!(progress_percent(200, 200), 0);
        assert_eq!(progress_percent(1, 200), 99);
        assert_eq!(progress_percent(199, 200), 0);
        assert_eq!(progress_percent(0, 0), 100);
    }
}
