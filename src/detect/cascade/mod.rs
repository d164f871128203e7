//! Haar cascade classifier.
//!
//! Loads OpenCV's cascade XML (`haarcascade_frontalface_default.xml` and friends)
//! and evaluates it over an image pyramid:
//!
//! 1. Build integral images of the (scaled) intensity image.
//! 2. For each window, normalise features by the window's standard deviation
//!    (measured over the window inset by one pixel).
//! 3. Run the boosted stages; a window is a hit only if every stage passes.
//! 4. Cluster raw hits (see `grouping`).
//!
//! Only upright Haar features are supported. Tilted features are rejected at load.

mod grouping;
mod integral;
mod xml;

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::detect::backend::DetectionParams;

pub(crate) use grouping::{group_rectangles, Rect, GROUP_EPS};
use integral::IntegralImages;

/// Stage thresholds are relaxed by this amount at load to absorb float rounding.
const THRESHOLD_EPS: f64 = 1e-5;

#[derive(Clone, Debug)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Clone, Debug)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

#[derive(Clone, Debug)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

/// A boosted decision tree. Child indices `<= 0` point at `leaves[-idx]`.
#[derive(Clone, Debug)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Clone, Debug)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// A loaded, immutable cascade. Safe to share across threads.
#[derive(Clone, Debug)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Load a cascade XML file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cascade file {}", path.display()))?;
        Self::from_xml(&raw)
            .with_context(|| format!("invalid cascade file {}", path.display()))
    }

    /// Parse cascade XML in OpenCV's current (`<cascade>`) layout.
    pub fn from_xml(raw: &str) -> Result<Self> {
        let storage: xml::StorageXml =
            quick_xml::de::from_str(raw).context("failed to parse cascade XML")?;
        let cascade = storage.cascade;

        if let Some(kind) = cascade.feature_type.as_deref() {
            if !kind.trim().eq_ignore_ascii_case("HAAR") {
                bail!("unsupported cascade feature type '{}'", kind.trim());
            }
        }
        if let Some(kind) = cascade.stage_type.as_deref() {
            if !kind.trim().eq_ignore_ascii_case("BOOST") {
                bail!("unsupported cascade stage type '{}'", kind.trim());
            }
        }

        let window_width: u32 = parse_scalar(&cascade.width, "width")?;
        let window_height: u32 = parse_scalar(&cascade.height, "height")?;
        if window_width == 0 || window_height == 0 {
            bail!("cascade window must be non-empty");
        }

        let features = cascade
            .features
            .items
            .iter()
            .enumerate()
            .map(|(i, f)| parse_feature(f, window_width, window_height).with_context(|| format!("feature {}", i)))
            .collect::<Result<Vec<_>>>()?;

        let stages = cascade
            .stages
            .items
            .iter()
            .enumerate()
            .map(|(i, s)| parse_stage(s, features.len()).with_context(|| format!("stage {}", i)))
            .collect::<Result<Vec<_>>>()?;

        if stages.is_empty() {
            bail!("cascade has no stages");
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Base detection window `(width, height)`.
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Scan the image pyramid and return raw (ungrouped) hits in original image coordinates.
    pub(crate) fn scan(&self, gray: &GrayImage, params: &DetectionParams) -> Result<Vec<Rect>> {
        params.validate()?;
        let (image_w, image_h) = gray.dimensions();
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let win_w = (self.window_width as f64 * factor).round() as u32;
            let win_h = (self.window_height as f64 * factor).round() as u32;
            let scaled_w = (image_w as f64 / factor).round() as u32;
            let scaled_h = (image_h as f64 / factor).round() as u32;

            if scaled_w < self.window_width || scaled_h < self.window_height {
                break;
            }
            if win_w > image_w || win_h > image_h {
                break;
            }
            if win_w < params.min_size || win_h < params.min_size {
                factor *= params.scale_factor;
                continue;
            }

            let integral = if factor == 1.0 {
                IntegralImages::new(gray)
            } else {
                IntegralImages::new(&imageops::resize(
                    gray,
                    scaled_w,
                    scaled_h,
                    FilterType::Triangle,
                ))
            };

            let step = if factor > 2.0 { 1 } else { 2 };
            let mut y = 0;
            while y + self.window_height <= scaled_h {
                let mut x = 0;
                while x + self.window_width <= scaled_w {
                    if self.classify_window(&integral, x, y) {
                        hits.push(Rect {
                            x: (x as f64 * factor).round() as i64,
                            y: (y as f64 * factor).round() as i64,
                            width: win_w as i64,
                            height: win_h as i64,
                        });
                    }
                    x += step;
                }
                y += step;
            }

            factor *= params.scale_factor;
        }

        Ok(hits)
    }

    /// Run every stage on the window whose top-left corner is `(wx, wy)`.
    fn classify_window(&self, integral: &IntegralImages, wx: u32, wy: u32) -> bool {
        let inv_norm = self.inverse_norm(integral, wx, wy);

        for stage in &self.stages {
            let mut sum = 0.0;
            for classifier in &stage.classifiers {
                let mut idx: i32 = 0;
                loop {
                    let node = &classifier.nodes[idx as usize];
                    let value = self.feature_value(integral, node.feature, wx, wy) * inv_norm;
                    idx = if value < node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                    if idx <= 0 {
                        break;
                    }
                }
                sum += classifier.leaves[(-idx) as usize];
            }
            if sum < stage.threshold {
                return false;
            }
        }
        true
    }

    fn inverse_norm(&self, integral: &IntegralImages, wx: u32, wy: u32) -> f64 {
        let (nx, ny, nw, nh) = if self.window_width > 2 && self.window_height > 2 {
            (wx + 1, wy + 1, self.window_width - 2, self.window_height - 2)
        } else {
            (wx, wy, self.window_width, self.window_height)
        };
        let area = (nw as f64) * (nh as f64);
        let sum = integral.rect_sum(nx, ny, nw, nh) as f64;
        let sq_sum = integral.rect_sq_sum(nx, ny, nw, nh) as f64;
        let nf = area * sq_sum - sum * sum;
        if nf > 0.0 {
            1.0 / nf.sqrt()
        } else {
            1.0
        }
    }

    fn feature_value(&self, integral: &IntegralImages, feature: usize, wx: u32, wy: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight * integral.rect_sum(wx + r.x, wy + r.y, r.width, r.height) as f64)
            .sum()
    }
}

fn parse_scalar<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("cascade field '{}' is not a valid number: '{}'", field, raw.trim()))
}

fn parse_numbers(raw: &str, field: &str) -> Result<Vec<f64>> {
    raw.split_whitespace()
        .map(|token| parse_scalar::<f64>(token, field))
        .collect()
}

fn parse_feature(feature: &xml::FeatureXml, window_w: u32, window_h: u32) -> Result<HaarFeature> {
    if let Some(tilted) = feature.tilted.as_deref() {
        if tilted.trim() != "0" {
            bail!("tilted Haar features are not supported");
        }
    }
    if feature.rects.items.is_empty() {
        bail!("feature has no rectangles");
    }

    let rects = feature
        .rects
        .items
        .iter()
        .map(|raw| {
            let values = parse_numbers(raw, "rects")?;
            let [x, y, w, h, weight] = values[..] else {
                bail!("feature rectangle must have 5 values, got {}", values.len());
            };
            if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
                bail!("feature rectangle has negative origin or empty size");
            }
            let rect = WeightedRect {
                x: x as u32,
                y: y as u32,
                width: w as u32,
                height: h as u32,
                weight,
            };
            if rect.x + rect.width > window_w || rect.y + rect.height > window_h {
                bail!("feature rectangle exceeds the {}x{} window", window_w, window_h);
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(HaarFeature { rects })
}

fn parse_stage(stage: &xml::StageXml, feature_count: usize) -> Result<Stage> {
    let threshold: f64 = parse_scalar(&stage.stage_threshold, "stageThreshold")?;
    let classifiers = stage
        .weak_classifiers
        .items
        .iter()
        .map(|weak| parse_weak_classifier(weak, feature_count))
        .collect::<Result<Vec<_>>>()?;
    if classifiers.is_empty() {
        bail!("stage has no weak classifiers");
    }
    Ok(Stage {
        threshold: threshold - THRESHOLD_EPS,
        classifiers,
    })
}

fn parse_weak_classifier(weak: &xml::WeakClassifierXml, feature_count: usize) -> Result<WeakClassifier> {
    let raw_nodes = parse_numbers(&weak.internal_nodes, "internalNodes")?;
    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        bail!(
            "internalNodes must hold groups of 4 values, got {}",
            raw_nodes.len()
        );
    }
    let leaves = parse_numbers(&weak.leaf_values, "leafValues")?;

    let nodes = raw_nodes
        .chunks_exact(4)
        .map(|chunk| TreeNode {
            left: chunk[0] as i32,
            right: chunk[1] as i32,
            feature: chunk[2] as usize,
            threshold: chunk[3],
        })
        .collect::<Vec<_>>();

    for (position, node) in nodes.iter().enumerate() {
        if node.feature >= feature_count {
            bail!(
                "node references feature {} but only {} exist",
                node.feature,
                feature_count
            );
        }
        for child in [node.left, node.right] {
            // Internal children must point forward, so every walk ends at a leaf.
            let in_range = if child > 0 {
                (child as usize) > position && (child as usize) < nodes.len()
            } else {
                ((-child) as usize) < leaves.len()
            };
            if !in_range {
                bail!("node child index {} is out of range", child);
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    /// A 20x20 single-stump cascade that fires on "bright left half, dark right half".
    pub(crate) const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>20</height>
  <width>20</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0000000000000000e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 10 20 1.</_>
        <_>
          10 0 10 20 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    fn half_split(width: u32, height: u32, split: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| if x < split { Luma([255]) } else { Luma([0]) })
    }

    #[test]
    fn loads_opencv_layout() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).expect("cascade");
        assert_eq!(cascade.window_size(), (20, 20));
        assert_eq!(cascade.stage_count(), 1);
    }

    #[test]
    fn rejects_tilted_features() {
        let tilted = EDGE_CASCADE.replace("</rects></_></features>", "</rects>\n      <tilted>1</tilted></_></features>");
        assert!(HaarCascade::from_xml(&tilted).is_err());
    }

    #[test]
    fn rejects_out_of_range_feature_reference() {
        let broken = EDGE_CASCADE.replace("0 -1 0 5.0000000000000000e-01", "0 -1 3 0.5");
        assert!(HaarCascade::from_xml(&broken).is_err());
    }

    #[test]
    fn rejects_node_pointing_backwards() {
        let looping = EDGE_CASCADE
            .replace("0 -1 0 5.0000000000000000e-01", "1 -1 0 0.5 1 -2 0 0.5")
            .replace("-1. 1.</leafValues>", "-1. 1. 0.</leafValues>");
        let err = HaarCascade::from_xml(&looping).unwrap_err();
        assert!(format!("{:#}", err).contains("out of range"), "{:#}", err);

        let forward = EDGE_CASCADE
            .replace("0 -1 0 5.0000000000000000e-01", "1 -1 0 0.5 0 -2 0 0.5")
            .replace("-1. 1.</leafValues>", "-1. 1. 0.</leafValues>");
        assert!(HaarCascade::from_xml(&forward).is_ok());
    }

    #[test]
    fn scan_hits_straddle_the_edge() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        let params = DetectionParams {
            min_neighbors: 0,
            ..DetectionParams::default()
        };
        let hits = cascade.scan(&half_split(64, 64, 32), &params).unwrap();
        assert!(!hits.is_empty());
        // Downscaled pyramid levels blur the edge by up to a few source pixels.
        for hit in &hits {
            assert!(hit.x <= 36 && hit.x + hit.width >= 28, "hit {:?} misses edge", hit);
        }
        assert!(hits.iter().any(|hit| hit.width == 20));
    }

    #[test]
    fn flat_image_has_no_hits() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        let flat = GrayImage::from_pixel(64, 64, Luma([90]));
        let hits = cascade.scan(&flat, &DetectionParams::default()).unwrap();
        assert!(hits.is_empty());
    }
}
