use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::geometry::arc_length;
use imageproc::point::Point;

/// An outer contour that passed the circularity window
#[derive(Debug, Clone)]
pub struct RoundContour {
    pub points: Vec<Point<i32>>,
    pub perimeter: f64,
    pub area: f64,
}

impl RoundContour {
    /// `perimeter² / area`; 4π for an ideal circle
    pub fn circularity(&self) -> f64 {
        self.perimeter * self.perimeter / self.area
    }
}

/// Polygon area (shoelace formula)
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice as f64 / 2.0).abs()
}

/// Keep outer contours that enclose a child contour, have no parent, and
/// whose `perimeter² / area` lies in `(min_ratio, max_ratio]`.
pub fn find_round_contours(edges: &GrayImage, min_ratio: f64, max_ratio: f64) -> Vec<RoundContour> {
    let contours: Vec<Contour<i32>> = find_contours(edges);

    let mut has_child = vec![false; contours.len()];
    for c in &contours {
        if let Some(parent) = c.parent {
            has_child[parent] = true;
        }
    }

    contours
        .into_iter()
        .enumerate()
        .filter(|(i, c)| matches!(c.border_type, BorderType::Outer) && c.parent.is_none() && has_child[*i])
        .filter_map(|(_, c)| {
            let area = polygon_area(&c.points);
            if area <= 0.0 {
                return None;
            }
            let perimeter = arc_length(&c.points, true);
            let round = RoundContour { points: c.points, perimeter, area };
            let ratio = round.circularity();
            (ratio > min_ratio && ratio <= max_ratio).then_some(round)
        })
        .collect()
}

/// Render contours as 1px white outlines on a black canvas
pub fn draw_contours(width: u32, height: u32, contours: &[RoundContour]) -> GrayImage {
    let mut canvas = GrayImage::new(width, height);
    for c in contours {
        let n = c.points.len();
        for i in 0..n {
            let p1 = c.points[i];
            let p2 = c.points[(i + 1) % n];
            draw_line_segment_mut(
                &mut canvas,
                (p1.x as f32, p1.y as f32),
                (p2.x as f32, p2.y as f32),
                Luma([255u8]),
            );
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    #[test]
    fn shoelace_area_of_square() {
        let square = [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn keeps_ring_drops_thin_bar() {
        let mut img = GrayImage::new(200, 120);
        // Thick ring: outer contour with a hole child
        for r in 28..=31 {
            draw_hollow_circle_mut(&mut img, (60, 60), r, Luma([255]));
        }
        // Long thin rectangle outline: encloses a hole but is far from round
        for i in 0..2 {
            draw_hollow_rect_mut(&mut img, Rect::at(110 + i, 50 + i).of_size(80 - 2 * i as u32, 12 - 2 * i as u32), Luma([255]));
        }

        let round = find_round_contours(&img, 10.0, 30.0);
        assert_eq!(round.len(), 1, "{:?}", round.iter().map(|c| c.circularity()).collect::<Vec<_>>());
        let ratio = round[0].circularity();
        assert!(ratio > 12.0 && ratio < 17.0, "ratio {ratio}");
    }

    #[test]
    fn draws_on_black_canvas() {
        let contour = RoundContour {
            points: vec![Point::new(2, 2), Point::new(8, 2), Point::new(8, 8), Point::new(2, 8)],
            perimeter: 24.0,
            area: 36.0,
        };
        let canvas = draw_contours(12, 12, &[contour]);
        assert_eq!(canvas.get_pixel(2, 2)[0], 255);
        assert_eq!(canvas.get_pixel(5, 5)[0], 0);
    }
}
