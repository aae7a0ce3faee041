use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Letter grades, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
    U,
}

impl Letter {
    pub fn as_str(self) -> &'static str {
        match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
            Letter::E => "E",
            Letter::U => "U",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Letter::A),
            "B" => Some(Letter::B),
            "C" => Some(Letter::C),
            "D" => Some(Letter::D),
            "E" => Some(Letter::E),
            "U" => Some(Letter::U),
            _ => None,
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidMarkError {
    #[error("maxScore must be greater than zero (got {max_score})")]
    NonPositiveMax { max_score: f64 },
    #[error("score {score} is outside [0, {max_score}]")]
    OutOfRange { score: f64, max_score: f64 },
    #[error("mark {mark} is outside [0, 100]")]
    MarkOutOfRange { mark: f64 },
}

/// Component weights as percentages. They must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeWeights {
    pub coursework: f64,
    pub exam: f64,
}

impl Default for GradeWeights {
    fn default() -> Self {
        Self {
            coursework: 30.0,
            exam: 70.0,
        }
    }
}

impl GradeWeights {
    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [("courseworkWeight", self.coursework), ("examWeight", self.exam)] {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("{} must be a non-negative number", name));
            }
        }
        if ((self.coursework + self.exam) - 100.0).abs() > 1e-9 {
            return Err("courseworkWeight + examWeight must equal 100".to_string());
        }
        Ok(())
    }
}

// Marks carry two decimals. Arithmetic on them runs in whole hundredths so a
// result that is exactly half-way rounds away from zero, whatever the binary
// representation of the inputs.

fn hundredths(x: f64) -> i64 {
    (x * 100.0).round() as i64
}

fn from_hundredths(h: i64) -> f64 {
    h as f64 / 100.0
}

/// `num / den` rounded half away from zero. `den` must be positive.
fn div_round(num: i64, den: i64) -> i64 {
    let q = (num.abs() * 2 + den) / (den * 2);
    if num < 0 {
        -q
    } else {
        q
    }
}

/// Half-away-from-zero rounding to 2 decimals. All stored marks go through this.
///
/// The value is snapped to 6 decimals first, so `1.005` (held as
/// 1.00499999...) still rounds to `1.01`.
pub fn round_2dp(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let millionths = (x * 1_000_000.0).round() as i64;
    from_hundredths(div_round(millionths, 10_000))
}

/// Mean of 2-decimal marks, rounded to 2 decimals. None for an empty slice.
pub fn mean_2dp(marks: &[f64]) -> Option<f64> {
    if marks.is_empty() {
        return None;
    }
    let sum: i64 = marks.iter().map(|m| hundredths(*m)).sum();
    Some(from_hundredths(div_round(sum, marks.len() as i64)))
}

pub fn grade(mark: f64) -> Letter {
    if mark >= 80.0 {
        Letter::A
    } else if mark >= 70.0 {
        Letter::B
    } else if mark >= 60.0 {
        Letter::C
    } else if mark >= 50.0 {
        Letter::D
    } else if mark >= 40.0 {
        Letter::E
    } else {
        Letter::U
    }
}

/// `score / maxScore * 100`, validated.
pub fn normalize(score: f64, max_score: f64) -> Result<f64, InvalidMarkError> {
    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(InvalidMarkError::NonPositiveMax { max_score });
    }
    if !score.is_finite() || score < 0.0 || score > max_score {
        return Err(InvalidMarkError::OutOfRange { score, max_score });
    }
    Ok(score / max_score * 100.0)
}

fn check_mark(mark: f64) -> Result<f64, InvalidMarkError> {
    if !mark.is_finite() || !(0.0..=100.0).contains(&mark) {
        return Err(InvalidMarkError::MarkOutOfRange { mark });
    }
    Ok(mark)
}

/// Blend the two components. An absent component carries weight zero and the
/// present one stands alone: coursework 72 with no exam is 72, not 72 * 0.3.
pub fn final_mark(
    coursework: Option<f64>,
    exam: Option<f64>,
    weights: GradeWeights,
) -> Result<Option<f64>, InvalidMarkError> {
    let coursework = coursework.map(check_mark).transpose()?;
    let exam = exam.map(check_mark).transpose()?;
    let mark = match (coursework, exam) {
        (None, None) => return Ok(None),
        (Some(c), None) => round_2dp(c),
        (None, Some(e)) => round_2dp(e),
        (Some(c), Some(e)) => {
            let (wc, we) = (hundredths(weights.coursework), hundredths(weights.exam));
            if wc + we <= 0 {
                return Ok(None);
            }
            let blended = wc * hundredths(round_2dp(c)) + we * hundredths(round_2dp(e));
            from_hundredths(div_round(blended, wc + we))
        }
    };
    Ok(Some(mark))
}

/// Mean of the present final marks, or None when no subject has one.
pub fn overall_average<I>(marks: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let present: Vec<f64> = marks.into_iter().flatten().collect();
    mean_2dp(&present)
}

pub fn performance_comment(average: f64) -> &'static str {
    match grade(average) {
        Letter::A => "Excellent performance! Keep up the outstanding work.",
        Letter::B => "Very good performance. Continue working hard.",
        Letter::C => "Good performance with room for improvement.",
        Letter::D => "Satisfactory performance. More effort required.",
        Letter::E => "Below average performance. Needs significant improvement.",
        Letter::U => "Poor performance. Requires immediate attention and support.",
    }
}
