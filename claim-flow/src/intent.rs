use serde::{Deserialize, Serialize};

/// Terms that mark a message as being about an insurance claim.
///
/// Matching is a plain case-insensitive substring search, so "claims",
/// "accidental" or "risky" all count.
pub const CLAIM_VOCABULARY: &[&str] = &[
    "insurance",
    "insure",
    "insured",
    "policy",
    "claim",
    "coverage",
    "premium",
    "underwriter",
    "underwriting",
    "deductible",
    "exclusion",
    "endorsement",
    "adjuster",
    "liability",
    "coverage limit",
    "coverage level",
    "insurance company",
    "insurer",
    "reinsurance",
    "reinsurer",
    "risk",
    "policyholder",
    "loss",
    "damage",
    "accident",
    "incident",
    "beneficiary",
    "indemnity",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ClaimIntent,
    Unknown,
}

/// Keyword based intent detection
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Intent {
        if self.matched_term(text).is_some() {
            Intent::ClaimIntent
        } else {
            Intent::Unknown
        }
    }

    /// First vocabulary term found in `text`, if any
    pub fn matched_term(&self, text: &str) -> Option<&'static str> {
        let lowered = text.to_lowercase();
        CLAIM_VOCABULARY
            .iter()
            .copied()
            .find(|term| lowered.contains(term))
    }
}
