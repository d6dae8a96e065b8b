//! Claim record schema.
//!
//! A [`ClaimRecord`] always carries every [`ClaimField`]; values are free-form
//! strings trimmed on the way in. Only the fields the [`ClaimSchema`] marks as
//! required are checked for emptiness; the rest are collected as-is.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{RecordError, ValidationError};

/// Identifier handed to each elicited claim form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub u64);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out claim ids for one conversation; never repeats a value.
#[derive(Debug, Default)]
pub struct ClaimIdCounter {
    last: u64,
}

impl ClaimIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ClaimId {
        self.last += 1;
        ClaimId(self.last)
    }

    pub fn last_issued(&self) -> Option<ClaimId> {
        (self.last > 0).then_some(ClaimId(self.last))
    }
}

macro_rules! claim_fields {
    ($( $variant:ident => $wire:literal, $input:literal, $label:literal; )+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum ClaimField {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl ClaimField {
            /// All fields in form order
            pub const ALL: &'static [ClaimField] = &[$(ClaimField::$variant),+];

            /// Name used on the wire and in the prediction request
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ClaimField::$variant => $wire,)+
                }
            }

            /// Id of the matching input on the rendered form
            pub fn input_id(&self) -> &'static str {
                match self {
                    $(ClaimField::$variant => $input,)+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $(ClaimField::$variant => $label,)+
                }
            }
        }

        impl FromStr for ClaimField {
            type Err = RecordError;

            /// Accepts either the wire name or the form input id
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire | $input => Ok(ClaimField::$variant),)+
                    other => Err(RecordError::UnknownField(other.to_string())),
                }
            }
        }
    };
}

claim_fields! {
    ClaimId => "ClaimID", "claimID", "Claim ID";
    PolicyNumber => "PolicyNumber", "policyNumber", "Policy Number";
    ClaimDate => "ClaimDate", "claimDate", "Claim Date";
    IncidentDate => "IncidentDate", "incidentDate", "Incident Date";
    ReportedWithinPolicyTimeframe => "ReportedWithinPolicyTimeframe", "reportedWithinPolicyTimeframe", "Reported Within Policy Timeframe";
    IncidentType => "IncidentType", "incidentType", "Incident Type";
    EstimatedRepairCost => "EstimatedRepairCost", "estimatedRepairCost", "Estimated Repair Cost";
    ActualCashValue => "ActualCashValue", "actualCashValue", "Actual Cash Value";
    ClaimAmount => "ClaimAmount", "claimAmount", "Claim Amount";
    PolicyCoverageLimit => "PolicyCoverageLimit", "policyCoverageLimit", "Policy Coverage Limit";
    Deductible => "Deductible", "deductible", "Deductible";
    DriverAtFault => "DriverAtFault", "driverAtFault", "Driver At Fault";
    LegalActivityInvolved => "LegalActivityInvolved", "legalActivityInvolved", "Legal Activity Involved";
    EvidenceOfFraud => "EvidenceOfFraud", "evidenceOfFraud", "Evidence Of Fraud";
    ClaimSeverity => "ClaimSeverity", "claimSeverity", "Claim Severity";
    TotalLoss => "TotalLoss", "totalLoss", "Total Loss";
    PayableClaimAmount => "PayableClaimAmount", "payableClaimAmount", "Payable Claim Amount";
    ClaimOutcome => "ClaimOutcome", "claimOutcome", "Claim Outcome";
    FaultPercentage => "FaultPercentage", "faultPercentage", "Fault Percentage";
    EvidenceSources => "EvidenceSources", "evidenceSources", "Evidence Sources";
    ExpertConsulted => "ExpertConsulted", "expertConsulted", "Expert Consulted";
    LiabilityDisputed => "LiabilityDisputed", "liabilityDisputed", "Liability Disputed";
}

impl fmt::Display for ClaimField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields that must be non-empty before a claim can be submitted
pub const REQUIRED_FIELDS: &[ClaimField] = &[
    ClaimField::PolicyNumber,
    ClaimField::ClaimDate,
    ClaimField::IncidentDate,
    ClaimField::ReportedWithinPolicyTimeframe,
    ClaimField::IncidentType,
];

/// One claim, keyed by field. Missing values read as "".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>")]
pub struct ClaimRecord {
    values: BTreeMap<ClaimField, String>,
}

impl ClaimRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from raw name/value pairs, rejecting names outside the schema
    /// and fields given twice (for example under both wire name and input id).
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut record = Self::new();
        let mut unknown = Vec::new();
        for (name, value) in fields {
            match name.as_ref().parse::<ClaimField>() {
                Ok(field) if record.values.contains_key(&field) => {
                    return Err(RecordError::DuplicateField(field.as_str().to_string()));
                }
                Ok(field) => record.set(field, value.as_ref()),
                Err(_) => unknown.push(name.as_ref().to_string()),
            }
        }
        if unknown.is_empty() {
            Ok(record)
        } else {
            unknown.sort();
            Err(RecordError::UnknownField(unknown.join(", ")))
        }
    }

    pub fn set(&mut self, field: ClaimField, value: impl AsRef<str>) {
        self.values.insert(field, value.as_ref().trim().to_string());
    }

    pub fn with(mut self, field: ClaimField, value: impl AsRef<str>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: ClaimField) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn claim_id(&self) -> &str {
        self.get(ClaimField::ClaimId)
    }

    pub fn assign_claim_id(&mut self, id: ClaimId) {
        self.set(ClaimField::ClaimId, id.to_string());
    }
}

impl TryFrom<BTreeMap<String, String>> for ClaimRecord {
    type Error = RecordError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_fields(map)
    }
}

impl Serialize for ClaimRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ClaimField::ALL.len()))?;
        for field in ClaimField::ALL {
            map.serialize_entry(field.as_str(), self.get(*field))?;
        }
        map.end()
    }
}

/// Rendering hints for one form input
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: ClaimField,
    pub input_id: &'static str,
    pub label: &'static str,
    /// Enforced before submission
    pub required: bool,
    /// Marked required on the rendered form
    pub ui_required: bool,
    /// Filled in by the controller, not the user
    pub hidden: bool,
}

/// The set of fields a claim form collects
#[derive(Debug, Clone, Serialize)]
pub struct ClaimSchema {
    fields: Vec<FieldSpec>,
}

impl ClaimSchema {
    pub fn new() -> Self {
        let fields = ClaimField::ALL
            .iter()
            .map(|&field| {
                let hidden = field == ClaimField::ClaimId;
                FieldSpec {
                    name: field,
                    input_id: field.input_id(),
                    label: field.label(),
                    required: REQUIRED_FIELDS.contains(&field),
                    ui_required: !hidden,
                    hidden,
                }
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn required_fields(&self) -> impl Iterator<Item = ClaimField> + '_ {
        self.fields.iter().filter(|f| f.required).map(|f| f.name)
    }

    pub fn is_required(&self, field: ClaimField) -> bool {
        self.fields.iter().any(|f| f.name == field && f.required)
    }

    /// Checks that every required field is non-empty after trimming.
    pub fn validate(&self, record: &ClaimRecord) -> Result<(), ValidationError> {
        let missing: Vec<ClaimField> = self
            .required_fields()
            .filter(|field| record.get(*field).trim().is_empty())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }
}

impl Default for ClaimSchema {
    fn default() -> Self {
        Self::new()
    }
}
