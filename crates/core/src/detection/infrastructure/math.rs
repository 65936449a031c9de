//! Shared math utilities for detection infrastructure.
//!
//! Provides union-find clustering, bounding-box IoU and the neighbour
//! grouping used to turn raw sliding-window hits into face boxes.

use crate::shared::bounding_box::BoundingBox;

/// Relative tolerance for two raw hits to count as the same face.
pub const GROUP_EPS: f64 = 0.2;

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Find root of element `i` with path halving for amortized near-O(1).
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Splits `len` items into equivalence classes of the transitive closure of
/// `similar`. Labels are numbered in order of first appearance.
pub fn partition<F>(len: usize, mut similar: F) -> (Vec<usize>, usize)
where
    F: FnMut(usize, usize) -> bool,
{
    let mut parent: Vec<usize> = (0..len).collect();
    for i in 0..len {
        for j in (i + 1)..len {
            if similar(i, j) {
                union(&mut parent, i, j);
            }
        }
    }

    let mut root_label: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    let mut labels = Vec::with_capacity(len);
    for i in 0..len {
        let root = find(&mut parent, i);
        let next = root_label.len();
        labels.push(*root_label.entry(root).or_insert(next));
    }
    let classes = root_label.len();
    (labels, classes)
}

fn similar_rects(a: &BoundingBox, b: &BoundingBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) as f64 + a.height.min(b.height) as f64) * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;
    close(a.x, b.x) && close(a.y, b.y) && close(a.right(), b.right()) && close(a.bottom(), b.bottom())
}

/// Clusters raw hits and keeps clusters with more than `min_neighbors`
/// members, averaged into one box each.
///
/// A cluster lying inside a stronger cluster (more than `max(3, n)` members)
/// is dropped, as is any weak cluster (fewer than 3 members) lying inside
/// another reported cluster. With `min_neighbors == 0` the hits are returned
/// untouched.
pub fn group_rectangles(rects: &[BoundingBox], min_neighbors: u32, eps: f64) -> Vec<BoundingBox> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let (labels, classes) = partition(rects.len(), |i, j| similar_rects(&rects[i], &rects[j], eps));

    let mut sums = vec![[0u64; 4]; classes];
    let mut weights = vec![0u32; classes];
    for (r, &cls) in rects.iter().zip(&labels) {
        sums[cls][0] += r.x as u64;
        sums[cls][1] += r.y as u64;
        sums[cls][2] += r.width as u64;
        sums[cls][3] += r.height as u64;
        weights[cls] += 1;
    }

    let averaged: Vec<BoundingBox> = sums
        .iter()
        .zip(&weights)
        .map(|(s, &n)| {
            let avg = |v: u64| (v as f64 / n as f64).round() as u32;
            BoundingBox::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut kept = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = weights[i];
        if n1 <= min_neighbors {
            continue;
        }
        let enclosed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = weights[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i64;
            let dy = (r2.height as f64 * eps).round() as i64;
            let inside = r1.x as i64 >= r2.x as i64 - dx
                && r1.y as i64 >= r2.y as i64 - dy
                && r1.right() as i64 <= r2.right() as i64 + dx
                && r1.bottom() as i64 <= r2.bottom() as i64 + dy;
            inside && (n2 > n1.max(3) || n1 < 3)
        });
        if !enclosed {
            kept.push(*r1);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_iou_no_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert_eq!(bbox_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_bbox_iou_partial_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 5.0, 15.0, 15.0];
        let expected = 25.0 / 175.0;
        assert!((bbox_iou(&a, &b) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_union_find_transitive() {
        let mut parent = vec![0, 1, 2];
        union(&mut parent, 0, 1);
        union(&mut parent, 1, 2);
        assert_eq!(find(&mut parent, 0), find(&mut parent, 2));
    }

    #[test]
    fn test_partition_labels_in_first_appearance_order() {
        // 0~2 and 1~3
        let (labels, classes) = partition(4, |i, j| (i + j) % 2 == 0);
        assert_eq!(classes, 2);
        assert_eq!(labels, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_group_zero_neighbors_returns_raw_hits() {
        let rects = vec![BoundingBox::new(0, 0, 10, 10), BoundingBox::new(1, 1, 10, 10)];
        assert_eq!(group_rectangles(&rects, 0, GROUP_EPS), rects);
    }

    #[test]
    fn test_group_averages_cluster_and_drops_lonely_hit() {
        let rects = vec![
            BoundingBox::new(10, 10, 20, 20),
            BoundingBox::new(11, 10, 20, 20),
            BoundingBox::new(12, 10, 20, 20),
            BoundingBox::new(100, 100, 20, 20),
        ];
        let grouped = group_rectangles(&rects, 1, GROUP_EPS);
        assert_eq!(grouped, vec![BoundingBox::new(11, 10, 20, 20)]);
    }

    #[test]
    fn test_group_requires_more_than_min_neighbors() {
        let rects = vec![BoundingBox::new(10, 10, 20, 20), BoundingBox::new(11, 10, 20, 20)];
        assert!(group_rectangles(&rects, 2, GROUP_EPS).is_empty());
        assert_eq!(group_rectangles(&rects, 1, GROUP_EPS).len(), 1);
    }

    #[test]
    fn test_group_drops_weak_cluster_inside_strong_one() {
        let mut rects = vec![BoundingBox::new(50, 50, 10, 10); 2];
        rects.extend(vec![BoundingBox::new(45, 45, 30, 30); 4]);
        let grouped = group_rectangles(&rects, 1, GROUP_EPS);
        assert_eq!(grouped, vec![BoundingBox::new(45, 45, 30, 30)]);
    }

    #[test]
    fn test_group_keeps_separate_faces() {
        let mut rects = vec![BoundingBox::new(10, 10, 30, 30); 3];
        rects.extend(vec![BoundingBox::new(200, 50, 30, 30); 3]);
        let grouped = group_rectangles(&rects, 2, GROUP_EPS);
        assert_eq!(grouped.len(), 2);
    }
}
