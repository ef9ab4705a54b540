use crate::models::Circle;

/// Keep circles inside the radius window whose circularity exceeds the threshold
pub fn filter_circles(
    circles: &[Circle],
    min_radius: f32,
    max_radius: f32,
    min_circularity: f32,
) -> Vec<Circle> {
    circles
        .iter()
        .filter(|c| {
            c.radius >= min_radius && c.radius <= max_radius && c.circularity() > min_circularity
        })
        .copied()
        .collect()
}

/// Sort largest first
pub fn sort_by_radius_desc(circles: &mut [Circle]) {
    circles.sort_by(|a, b| b.radius.total_cmp(&a.radius));
}

/// Largest radius in the set, `None` when empty
pub fn largest_radius(circles: &[Circle]) -> Option<f32> {
    circles.iter().map(|c| c.radius).max_by(|a, b| a.total_cmp(b))
}

/// Square region around a circle, `None` unless it lies fully inside the image
pub fn inscribed_roi(circle: &Circle, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let (cx, cy) = circle.center();
    let r = circle.radius.round() as i32;
    if r <= 0 {
        return None;
    }
    let (x, y, side) = (cx - r, cy - r, 2 * r);
    if x < 0 || y < 0 || x + side > width as i32 || y + side > height as i32 {
        return None;
    }
    Some((x as u32, y as u32, side as u32, side as u32))
}

/// Square region around a circle clamped to the image bounds
pub fn clamped_roi(circle: &Circle, padding: u32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let r = circle.radius + padding as f32;
    let x0 = (circle.x - r).floor().max(0.0) as u32;
    let y0 = (circle.y - r).floor().max(0.0) as u32;
    let x1 = ((circle.x + r).ceil() as u32).min(width - 1);
    let y1 = ((circle.y + r).ceil() as u32).min(height - 1);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some((x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}
