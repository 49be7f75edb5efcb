//! Signal code -> detector table

use super::TaskSignal;
use super::detectors;
use crate::capture::Frame;
use crate::config::TaskConfig;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// What a detector concluded about one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectOutcome {
    /// Nothing conclusive yet; the dispatcher moves on to the next frame
    NotYet,
    /// Record to send to the controller
    Result(String),
    /// Internal bookkeeping finished; nothing is sent
    Housekeeping,
}

/// Detector output: the outcome plus the frame with overlays drawn on it
#[derive(Debug, Clone)]
pub struct Detection {
    pub outcome: DetectOutcome,
    pub annotated: Frame,
}

impl Detection {
    pub fn not_yet(annotated: Frame) -> Self {
        Self {
            outcome: DetectOutcome::NotYet,
            annotated,
        }
    }

    pub fn result(record: impl ToString, annotated: Frame) -> Self {
        Self {
            outcome: DetectOutcome::Result(record.to_string()),
            annotated,
        }
    }
}

/// One vision task.
///
/// Detectors may keep state between frames (motion tracking); they are
/// only ever called from the control loop.
pub trait Detector: Send {
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &Frame, config: &TaskConfig) -> Detection;
}

/// Fixed table from single-character signal codes to detectors
#[derive(Default)]
pub struct TaskRegistry {
    detectors: BTreeMap<char, Box<dyn Detector>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from `code -> detector name` bindings
    pub fn from_bindings(bindings: &BTreeMap<String, String>) -> Result<Self> {
        let mut registry = Self::new();
        let mut shared = detectors::SharedState::default();
        for (code, name) in bindings {
            let mut chars = code.chars();
            let (Some(code), None) = (chars.next(), chars.next()) else {
                return Err(Error::InvalidParameter(format!(
                    "signal code {:?} must be a single character",
                    code
                )));
            };
            let detector = detectors::build(name, &mut shared)
                .ok_or_else(|| Error::UnknownDetector(name.clone()))?;
            registry.register(code, detector);
        }
        log::info!(
            "Task registry: {}",
            registry
                .detectors
                .iter()
                .map(|(code, d)| format!("{}={}", code, d.name()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(registry)
    }

    /// Bind `code`, returning the detector it replaces
    pub fn register(&mut self, code: char, detector: Box<dyn Detector>) -> Option<Box<dyn Detector>> {
        self.detectors.insert(code, detector)
    }

    pub fn contains(&self, code: char) -> bool {
        self.detectors.contains_key(&code)
    }

    pub fn get_mut(&mut self, code: char) -> Option<&mut (dyn Detector + 'static)> {
        self.detectors.get_mut(&code).map(|d| d.as_mut())
    }

    pub fn codes(&self) -> impl Iterator<Item = char> + '_ {
        self.detectors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Interpret a control payload against this table
    pub fn resolve(&self, payload: &str) -> TaskSignal {
        TaskSignal::parse(payload, |code| self.contains(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(c, n)| (c.to_string(), n.to_string()))
            .collect()
    }

    #[test]
    fn test_default_bindings_build() {
        let registry = TaskRegistry::from_bindings(&TaskConfig::default().bindings).unwrap();
        assert_eq!(registry.codes().collect::<String>(), "12345R");
        assert_eq!(registry.resolve("3"), TaskSignal::Known('3'));
        assert_eq!(registry.resolve("7"), TaskSignal::Unknown("7".into()));
        assert_eq!(registry.resolve(""), TaskSignal::Idle);
    }

    #[test]
    fn test_unknown_detector_name_fails() {
        let result = TaskRegistry::from_bindings(&bindings(&[("1", "teleport")]));
        assert!(matches!(result, Err(Error::UnknownDetector(name)) if name == "teleport"));
    }

    #[test]
    fn test_multichar_code_fails() {
        let result = TaskRegistry::from_bindings(&bindings(&[("12", "material")]));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
