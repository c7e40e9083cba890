use crate::models::capabilities::Classification;

/// Scores strictly inside this open band carry too little margin to count as an opinion.
const NEUTRAL_BAND: (f32, f32) = (0.45, 0.55);

/// Normalized sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentimentLabel {
    /// Favourable tone.
    Positive,
    /// Unfavourable tone.
    Negative,
    /// No clear opinion.
    Neutral,
}

impl SentimentLabel {
    /// Collapse a raw classifier label: `pos*` / `neg*` (case-insensitive), anything else neutral.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.to_lowercase();
        if raw.starts_with("pos") {
            SentimentLabel::Positive
        } else if raw.starts_with("neg") {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    /// Interpret a caller-supplied steering value.
    ///
    /// Only the exact strings `"positive"` and `"negative"` steer away from neutral.
    pub fn from_steering(value: &str) -> Self {
        match value {
            "positive" => SentimentLabel::Positive,
            "negative" => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        }
    }

    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }

    /// Instruction prepended to the prompt to steer the generator's tone.
    pub fn prefix(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Write an optimistic paragraph about:\n",
            SentimentLabel::Negative => "Write a critical paragraph about:\n",
            SentimentLabel::Neutral => "Write a neutral, factual paragraph about:\n",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized sentiment prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentResult {
    /// One of positive, negative or neutral.
    pub label: SentimentLabel,
    /// The classifier's confidence, exactly as reported.
    pub score: f32,
}

impl SentimentResult {
    /// Result for input that carries no text at all.
    pub(crate) fn blank() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 1.0,
        }
    }

    /// Normalize a raw prediction.
    ///
    /// A score inside the neutral band forces [`SentimentLabel::Neutral`] whatever the raw
    /// label says. The score itself is passed through untouched.
    pub fn from_classification(raw: &Classification) -> Self {
        let (low, high) = NEUTRAL_BAND;
        let label = if raw.score > low && raw.score < high {
            SentimentLabel::Neutral
        } else {
            SentimentLabel::from_raw(&raw.label)
        };

        Self {
            label,
            score: raw.score,
        }
    }
}
