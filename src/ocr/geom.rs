use super::BBoxPx;

pub(crate) fn iou(a: &BBoxPx, b: &BBoxPx) -> f32 {
    let inter = intersection_area(a, b);
    if inter <= 0.0 {
        return 0.0;
    }
    inter / (a.area() + b.area() - inter).max(1.0)
}

/// Intersection over the smaller of the two boxes.
pub(crate) fn overlap_ratio(a: &BBoxPx, b: &BBoxPx) -> f32 {
    let inter = intersection_area(a, b);
    if inter <= 0.0 {
        return 0.0;
    }
    inter / a.area().min(b.area()).max(1.0)
}

pub(crate) fn union_bbox(a: &BBoxPx, b: &BBoxPx) -> BBoxPx {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = a.right().max(b.right());
    let y2 = a.bottom().max(b.bottom());
    BBoxPx {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

fn intersection_area(a: &BBoxPx, b: &BBoxPx) -> f32 {
    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = a.right().min(b.right());
    let iy2 = a.bottom().min(b.bottom());
    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }
    (ix2 - ix1) as f32 * (iy2 - iy1) as f32
}
