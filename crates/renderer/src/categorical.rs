//! Discrete category lookup: integer codes to legend colors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::Result;
use crate::style::Color;

/// One legend entry as served by the legend service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LegendEntry {
    #[serde(default)]
    pub label: Option<String>,
    pub color: String,
}

/// Category code (as a string key) to color.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTable {
    colors: HashMap<String, Color>,
    labels: HashMap<String, String>,
}

impl CategoryTable {
    /// Build from legend entries. Entries with unparseable colors are
    /// skipped with a warning so one bad row does not lose the legend.
    pub fn from_legend(legend: &HashMap<String, LegendEntry>) -> Self {
        let mut colors = HashMap::with_capacity(legend.len());
        let mut labels = HashMap::new();

        for (code, entry) in legend {
            match Color::from_hex(&entry.color) {
                Ok(color) => {
                    colors.insert(code.trim().to_string(), color);
                }
                Err(e) => warn!(code = %code, error = %e, "Skipping legend entry"),
            }
            if let Some(label) = &entry.label {
                labels.insert(code.trim().to_string(), label.clone());
            }
        }

        Self {
            colors,
            labels,
        }
    }

    /// Parse a legend service response:
    /// `{"code": {"label": "...", "color": "#rrggbb"}, ...}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let legend: HashMap<String, LegendEntry> = serde_json::from_str(json)?;
        Ok(Self::from_legend(&legend))
    }

    /// Built-in mapping used when the legend service is unreachable:
    /// the non-burnable fuel codes.
    pub fn builtin_default() -> Self {
        let entries = [
            ("91", "Urban / developed", "#686868"),
            ("92", "Snow / ice", "#e1e1e1"),
            ("93", "Agriculture", "#ffedc0"),
            ("98", "Open water", "#0000ff"),
            ("99", "Bare ground", "#b3ac9f"),
        ];
        let legend = entries
            .iter()
            .map(|(code, label, color)| {
                (
                    code.to_string(),
                    LegendEntry {
                        label: Some(label.to_string()),
                        color: color.to_string(),
                    },
                )
            })
            .collect();
        Self::from_legend(&legend)
    }

    /// Color for a finite sample: rounded to the nearest integer code.
    /// Codes missing from the legend get [`Color::UNKNOWN_CATEGORY`].
    pub fn color_for(&self, value: f64) -> Color {
        let key = (value.round() as i64).to_string();
        self.colors.get(&key).copied().unwrap_or(Color::UNKNOWN_CATEGORY)
    }

    pub fn label(&self, code: &str) -> Option<&str> {
        self.labels.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
