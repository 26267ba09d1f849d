use anyhow::{Context, Result};
use regex::Regex;

use crate::config::{KindLabel, ProceduralConfig};
use crate::model::MotionKind;

#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub category: MotionKind,
    pub reason: String,
}

struct PatternFamily {
    category: MotionKind,
    patterns: Vec<Regex>,
}

pub struct ProceduralFilter {
    kind_labels: Vec<KindLabel>,
    families: Vec<PatternFamily>,
}

impl ProceduralFilter {
    pub fn new(config: &ProceduralConfig) -> Result<Self> {
        let families = vec![
            PatternFamily {
                category: MotionKind::NoConfidence,
                patterns: compile_patterns(&config.no_confidence_patterns)?,
            },
            PatternFamily {
                category: MotionKind::Order,
                patterns: compile_patterns(&config.order_patterns)?,
            },
            PatternFamily {
                category: MotionKind::Procedural,
                patterns: compile_patterns(&config.procedural_patterns)?,
            },
        ];

        Ok(Self {
            kind_labels: config.kind_labels.clone(),
            families,
        })
    }

    pub fn evaluate(
        &self,
        title: &str,
        description: Option<&str>,
        kind: Option<&str>,
    ) -> Option<Exclusion> {
        if let Some(kind) = kind.map(str::trim).filter(|value| !value.is_empty())
            && let Some(label) = self.kind_labels.iter().find(|label| label.label == kind)
        {
            return Some(Exclusion {
                category: label.category,
                reason: format!("motion type '{kind}' is procedural"),
            });
        }

        let haystack = match description {
            Some(description) if !description.trim().is_empty() => {
                format!("{title}\n{description}")
            }
            _ => title.to_string(),
        };

        for family in &self.families {
            if let Some(pattern) = family
                .patterns
                .iter()
                .find(|pattern| pattern.is_match(&haystack))
            {
                return Some(Exclusion {
                    category: family.category,
                    reason: format!("matched pattern {}", pattern.as_str()),
                });
            }
        }

        None
    }

    pub fn classify(
        &self,
        title: &str,
        description: Option<&str>,
        kind: Option<&str>,
    ) -> MotionKind {
        self.evaluate(title, description, kind)
            .map(|exclusion| exclusion.category)
            .unwrap_or(MotionKind::Ordinary)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern)
                .with_context(|| format!("failed to compile procedural pattern: {pattern}"))
        })
        .collect()
}
