use crate::calc::GradeWeights;
use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

const GRADING_KEY: &str = "grading.config";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingConfig {
    pub weights: GradeWeights,
    pub comment_max_chars: usize,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            weights: GradeWeights::default(),
            comment_max_chars: 1000,
        }
    }
}

impl GradingConfig {
    pub fn to_json(&self) -> Value {
        json!({
            "courseworkWeight": self.weights.coursework,
            "examWeight": self.weights.exam,
            "commentMaxChars": self.comment_max_chars,
        })
    }

    /// Apply a partial update. Fields are checked individually, then the weights together.
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        let mut next = *self;
        for (k, v) in patch {
            match k.as_str() {
                "courseworkWeight" => {
                    next.weights.coursework = v
                        .as_f64()
                        .ok_or_else(|| "courseworkWeight must be a number".to_string())?;
                }
                "examWeight" => {
                    next.weights.exam = v
                        .as_f64()
                        .ok_or_else(|| "examWeight must be a number".to_string())?;
                }
                "commentMaxChars" => {
                    let n = v
                        .as_u64()
                        .ok_or_else(|| "commentMaxChars must be a positive integer".to_string())?;
                    if !(1..=5000).contains(&n) {
                        return Err("commentMaxChars must be between 1 and 5000".to_string());
                    }
                    next.comment_max_chars = n as usize;
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            }
        }
        next.weights.validate()?;
        *self = next;
        Ok(())
    }
}

pub fn load_grading(conn: &Connection) -> anyhow::Result<GradingConfig> {
    let mut current = GradingConfig::default();
    if let Some(saved) = db::settings_get_json(conn, GRADING_KEY)? {
        if let Some(obj) = saved.as_object() {
            // A malformed historical value falls back to defaults rather than blocking reports.
            if let Err(msg) = current.merge_patch(obj) {
                tracing::warn!(error = %msg, "ignoring stored grading config");
                current = GradingConfig::default();
            }
        }
    }
    Ok(current)
}

pub fn save_grading(conn: &Connection, cfg: &GradingConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, GRADING_KEY, &cfg.to_json())
}
