use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Fixed-length face descriptor (512-dimensional for ArcFace).
///
/// Serializes as a bare array of floats so the descriptor store stays a
/// plain list of vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance to another descriptor.
    ///
    /// Descriptors of different lengths come from different providers and
    /// are never comparable: their distance is `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// One registered identity: a name and the descriptor enrolled under it.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub name: String,
    pub descriptor: Descriptor,
}

impl IdentityRecord {
    pub fn new(name: impl Into<String>, descriptor: Descriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }
}

/// Result of matching a probe descriptor against the registry.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance of the closest record (`INFINITY` for an empty gallery).
    pub distance: f32,
    /// Registry index of the matched record (if any).
    pub index: Option<usize>,
    /// Name of the matched record (if any).
    pub name: Option<String>,
}

/// Strategy for comparing a probe descriptor against a gallery of identities.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, gallery: &[IdentityRecord], threshold: f32)
        -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// The closest record is selected first (ties go to the lowest index, so the
/// earliest registration wins) and only then checked against the threshold:
/// a closest record farther than `threshold` is a rejection.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Descriptor,
        gallery: &[IdentityRecord],
        threshold: f32,
    ) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&record.descriptor);
            // Strict comparison keeps the first of equal minima.
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= threshold => MatchResult {
                matched: true,
                distance: best_dist,
                index: Some(idx),
                name: Some(gallery[idx].name.clone()),
            },
            _ => MatchResult {
                matched: false,
                distance: best_dist,
                index: None,
                name: None,
            },
        }
    }
}
