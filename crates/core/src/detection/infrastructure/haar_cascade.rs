//! Boosted Haar cascade in the OpenCV XML layout.
//!
//! Only the `BOOST` stage type with upright `HAAR` features is supported,
//! which covers the stock frontal-face cascades.
use std::path::Path;

use ndarray::Array2;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

/// Slack applied to stage thresholds to absorb float rounding.
const STAGE_THRESHOLD_EPS: f64 = 1e-5;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed cascade XML: {0}")]
    Xml(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
    tilted: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct TreeNode {
    /// Child taken when the feature is below the threshold; `<= 0` means leaf `-left`.
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// Integral and squared-integral images of one pyramid level.
pub struct IntegralImage {
    sum: Array2<u64>,
    sq_sum: Array2<u64>,
}

impl IntegralImage {
    /// Builds `(h + 1) x (w + 1)` tables from row-major 8-bit luma.
    pub fn new(pixels: &[u8], width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        let mut sum = Array2::<u64>::zeros((h + 1, w + 1));
        let mut sq_sum = Array2::<u64>::zeros((h + 1, w + 1));
        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = pixels[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row_sum;
                sq_sum[[y + 1, x + 1]] = sq_sum[[y, x + 1]] + row_sq;
            }
        }
        Self { sum, sq_sum }
    }

    fn rect(table: &Array2<u64>, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        let total = table[[y + h, x + w]] + table[[y, x]];
        total as f64 - (table[[y, x + w]] + table[[y + h, x]]) as f64
    }

    pub fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::rect(&self.sum, x, y, w, h)
    }

    pub fn rect_sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::rect(&self.sq_sum, x, y, w, h)
    }
}

/// A trained cascade: a detection window size plus rejecting stages.
#[derive(Clone, Debug, PartialEq)]
pub struct HaarCascade {
    window: (u32, u32),
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let xml = std::fs::read_to_string(path)?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let cascade = CascadeParser::default().parse(xml)?;
        cascade.check()?;
        Ok(cascade)
    }

    /// Base detection window `(width, height)`.
    pub fn window_size(&self) -> (u32, u32) {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// The caller guarantees the window fits inside `integral`.
    pub fn accepts(&self, integral: &IntegralImage, x: u32, y: u32) -> bool {
        let (ww, wh) = self.window;
        let inner_area = ((ww - 2) * (wh - 2)) as f64;
        let sum = integral.rect_sum(x + 1, y + 1, ww - 2, wh - 2);
        let sq_sum = integral.rect_sq_sum(x + 1, y + 1, ww - 2, wh - 2);
        let spread = inner_area * sq_sum - sum * sum;
        let norm = if spread > 0.0 { spread.sqrt() } else { 1.0 };
        let inv_norm = 1.0 / norm;

        self.stages.iter().all(|stage| {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|wc| self.classify(wc, integral, x, y, inv_norm))
                .sum();
            score >= stage.threshold - STAGE_THRESHOLD_EPS
        })
    }

    fn classify(
        &self,
        wc: &WeakClassifier,
        integral: &IntegralImage,
        x: u32,
        y: u32,
        inv_norm: f64,
    ) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &wc.nodes[idx];
            let value = self.feature_value(node.feature, integral, x, y) * inv_norm;
            let next = if value < node.threshold {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return wc.leaves[(-next) as usize];
            }
            idx = next as usize;
        }
    }

    fn feature_value(&self, feature: usize, integral: &IntegralImage, x: u32, y: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight * integral.rect_sum(x + r.x, y + r.y, r.width, r.height))
            .sum()
    }

    fn check(&self) -> Result<(), CascadeError> {
        let (ww, wh) = self.window;
        if ww < 3 || wh < 3 {
            return Err(CascadeError::Invalid(format!(
                "window {ww}x{wh} is too small"
            )));
        }
        if self.stages.is_empty() {
            return Err(CascadeError::Invalid("no stages".into()));
        }
        for (fi, feature) in self.features.iter().enumerate() {
            if feature.tilted {
                return Err(CascadeError::Unsupported(format!(
                    "feature {fi} is tilted"
                )));
            }
            for r in &feature.rects {
                if r.x + r.width > ww || r.y + r.height > wh {
                    return Err(CascadeError::Invalid(format!(
                        "feature {fi} leaves the {ww}x{wh} window"
                    )));
                }
            }
        }
        for (si, stage) in self.stages.iter().enumerate() {
            for wc in &stage.classifiers {
                if wc.nodes.is_empty() {
                    return Err(CascadeError::Invalid(format!(
                        "stage {si} has a classifier without nodes"
                    )));
                }
                for (ni, node) in wc.nodes.iter().enumerate() {
                    if node.feature >= self.features.len() {
                        return Err(CascadeError::Invalid(format!(
                            "stage {si} references missing feature {}",
                            node.feature
                        )));
                    }
                    for child in [node.left, node.right] {
                        let in_range = if child <= 0 {
                            ((-child) as usize) < wc.leaves.len()
                        } else {
                            // branches only point forward, so evaluation terminates
                            (child as usize) > ni && (child as usize) < wc.nodes.len()
                        };
                        if !in_range {
                            return Err(CascadeError::Invalid(format!(
                                "stage {si} has a dangling tree branch {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Streaming parser keyed on the element path.
#[derive(Default)]
struct CascadeParser {
    path: Vec<String>,
    width: Option<u32>,
    height: Option<u32>,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl CascadeParser {
    fn parse(mut self, xml: &str) -> Result<HaarCascade, CascadeError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.path.push(name);
                    self.on_start()?;
                }
                Ok(Event::End(_)) => {
                    self.path.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| CascadeError::Xml(e.to_string()))?;
                    self.on_text(text.trim())?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(CascadeError::Xml(format!(
                        "at byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        Ok(HaarCascade {
            window: (
                self.width.ok_or_else(|| missing("width"))?,
                self.height.ok_or_else(|| missing("height"))?,
            ),
            stages: self.stages,
            features: self.features,
        })
    }

    /// `(parent, current)` element names.
    fn context(&self) -> (String, String) {
        let n = self.path.len();
        let parent = if n >= 2 { self.path[n - 2].clone() } else { String::new() };
        let current = self.path.last().cloned().unwrap_or_default();
        (parent, current)
    }

    fn on_start(&mut self) -> Result<(), CascadeError> {
        let (parent, current) = self.context();
        match (parent.as_str(), current.as_str()) {
            ("stages", "_") => self.stages.push(Stage::default()),
            ("weakClassifiers", "_") => self
                .stages
                .last_mut()
                .ok_or_else(|| missing("stage"))?
                .classifiers
                .push(WeakClassifier::default()),
            ("features", "_") => self.features.push(HaarFeature::default()),
            _ => {}
        }
        Ok(())
    }

    fn on_text(&mut self, text: &str) -> Result<(), CascadeError> {
        let (parent, current) = self.context();
        match (parent.as_str(), current.as_str()) {
            ("cascade", "stageType") if text != "BOOST" => {
                Err(CascadeError::Unsupported(format!("stage type {text}")))
            }
            ("cascade", "featureType") if text != "HAAR" => {
                Err(CascadeError::Unsupported(format!("feature type {text}")))
            }
            ("cascade", "width") => {
                self.width = Some(parse_num(text)?);
                Ok(())
            }
            ("cascade", "height") => {
                self.height = Some(parse_num(text)?);
                Ok(())
            }
            ("_", "stageThreshold") => {
                self.current_stage()?.threshold = parse_num(text)?;
                Ok(())
            }
            ("_", "internalNodes") => {
                let values = parse_list::<f64>(text)?;
                if values.len() % 4 != 0 {
                    return Err(CascadeError::Invalid(format!(
                        "internalNodes holds {} values, expected groups of 4",
                        values.len()
                    )));
                }
                let nodes = values
                    .chunks_exact(4)
                    .map(|n| TreeNode {
                        left: n[0] as i32,
                        right: n[1] as i32,
                        feature: n[2] as usize,
                        threshold: n[3],
                    })
                    .collect();
                self.current_classifier()?.nodes = nodes;
                Ok(())
            }
            ("_", "leafValues") => {
                self.current_classifier()?.leaves = parse_list(text)?;
                Ok(())
            }
            ("rects", "_") => {
                let v = parse_list::<f64>(text)?;
                if v.len() != 5 || v[..4].iter().any(|c| *c < 0.0) {
                    return Err(CascadeError::Invalid(format!("bad feature rect '{text}'")));
                }
                let feature = self.features.last_mut().ok_or_else(|| missing("feature"))?;
                feature.rects.push(WeightedRect {
                    x: v[0] as u32,
                    y: v[1] as u32,
                    width: v[2] as u32,
                    height: v[3] as u32,
                    weight: v[4],
                });
                Ok(())
            }
            ("_", "tilted") => {
                let feature = self.features.last_mut().ok_or_else(|| missing("feature"))?;
                feature.tilted = text != "0";
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn current_stage(&mut self) -> Result<&mut Stage, CascadeError> {
        self.stages.last_mut().ok_or_else(|| missing("stage"))
    }

    fn current_classifier(&mut self) -> Result<&mut WeakClassifier, CascadeError> {
        self.current_stage()?
            .classifiers
            .last_mut()
            .ok_or_else(|| missing("weak classifier"))
    }
}

fn missing(what: &str) -> CascadeError {
    CascadeError::Invalid(format!("missing {what}"))
}

fn parse_num<T: std::str::FromStr>(text: &str) -> Result<T, CascadeError> {
    text.parse()
        .map_err(|_| CascadeError::Invalid(format!("not a number: '{text}'")))
}

fn parse_list<T: std::str::FromStr>(text: &str) -> Result<Vec<T>, CascadeError> {
    text.split_whitespace().map(parse_num).collect()
}
