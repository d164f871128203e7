//! Clustering of raw sliding-window hits into face rectangles.
//!
//! Hits are partitioned by a similarity predicate (corners within
//! `eps * mean side`), each cluster is averaged, clusters with too few members
//! are dropped, and small clusters nested inside stronger ones are suppressed.

/// Relative tolerance used when comparing hit rectangles.
pub(crate) const GROUP_EPS: f64 = 0.2;

/// Integer rectangle in image coordinates. May be negative before clipping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.x + a.width - b.x - b.width).abs() as f64) <= delta
        && ((a.y + a.height - b.y - b.height).abs() as f64) <= delta
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Assign a class label to every rect. Labels are numbered in order of first appearance.
fn partition(rects: &[Rect], eps: f64) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..rects.len()).collect();
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }

    let mut root_label = vec![usize::MAX; rects.len()];
    let mut labels = Vec::with_capacity(rects.len());
    let mut classes = 0;
    for i in 0..rects.len() {
        let root = find(&mut parent, i);
        if root_label[root] == usize::MAX {
            root_label[root] = classes;
            classes += 1;
        }
        labels.push(root_label[root]);
    }
    (labels, classes)
}

/// Group raw detections. With `group_threshold == 0` the hits are returned untouched.
pub(crate) fn group_rectangles(rects: Vec<Rect>, group_threshold: u32, eps: f64) -> Vec<Rect> {
    if group_threshold == 0 || rects.is_empty() {
        return rects;
    }
    let threshold = group_threshold as i64;
    let (labels, classes) = partition(&rects, eps);

    let mut sums = vec![[0i64; 4]; classes];
    let mut weights = vec![0i64; classes];
    for (rect, &label) in rects.iter().zip(&labels) {
        let acc = &mut sums[label];
        acc[0] += rect.x;
        acc[1] += rect.y;
        acc[2] += rect.width;
        acc[3] += rect.height;
        weights[label] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&weights)
        .map(|(acc, &n)| {
            let s = 1.0 / n as f64;
            Rect {
                x: (acc[0] as f64 * s).round() as i64,
                y: (acc[1] as f64 * s).round() as i64,
                width: (acc[2] as f64 * s).round() as i64,
                height: (acc[3] as f64 * s).round() as i64,
            }
        })
        .collect();

    let mut out = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = weights[i];
        if n1 <= threshold {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = weights[j];
            if j == i || n2 <= threshold {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i64;
            let dy = (r2.height as f64 * eps).round() as i64;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.width <= r2.x + r2.width + dx
                && r1.y + r1.height <= r2.y + r2.height + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            out.push(*r1);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i64, y: i64, side: i64) -> Rect {
        Rect {
            x,
            y,
            width: side,
            height: side,
        }
    }

    #[test]
    fn zero_threshold_keeps_raw_hits() {
        let hits = vec![rect(0, 0, 24), rect(2, 0, 24)];
        assert_eq!(group_rectangles(hits.clone(), 0, GROUP_EPS), hits);
    }

    #[test]
    fn overlapping_hits_merge_into_average() {
        let hits = vec![
            rect(100, 100, 40),
            rect(102, 100, 40),
            rect(100, 102, 40),
            rect(98, 98, 40),
            rect(100, 100, 40),
        ];
        let grouped = group_rectangles(hits, 3, GROUP_EPS);
        assert_eq!(grouped, vec![rect(100, 100, 40)]);
    }

    #[test]
    fn weak_clusters_are_dropped() {
        let mut hits = vec![rect(0, 0, 30); 5];
        hits.push(rect(200, 200, 30));
        let grouped = group_rectangles(hits, 2, GROUP_EPS);
        assert_eq!(grouped, vec![rect(0, 0, 30)]);
    }

    #[test]
    fn nested_small_cluster_is_suppressed() {
        let mut hits = vec![rect(0, 0, 100); 6];
        hits.extend(vec![rect(30, 30, 30); 2]);
        let grouped = group_rectangles(hits, 1, GROUP_EPS);
        assert_eq!(grouped, vec![rect(0, 0, 100)]);
    }
}
