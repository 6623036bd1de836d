use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of number for international format, per 3GPP TS 24.008.
pub const INTERNATIONAL_NUMBER_TYPE: u8 = 145;
pub const UNKNOWN_NUMBER_TYPE: u8 = 129;
pub const MAX_PHONE_NUMBER_LENGTH: usize = 80;

/// Caller number as handed over by the call router.
///
/// `Display` renders the string the filter lists are matched against:
/// international numbers get a leading `+` unless they already carry one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerNumber {
    pub number_type: u8,
    pub digits: String,
}

impl CallerNumber {
    pub fn new(number_type: u8, digits: impl Into<String>) -> Self {
        Self {
            number_type,
            digits: digits.into(),
        }
    }

    pub fn is_international(&self) -> bool {
        self.number_type == INTERNATIONAL_NUMBER_TYPE
    }
}

impl fmt::Display for CallerNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = truncate(&self.digits, MAX_PHONE_NUMBER_LENGTH);
        if self.is_international() && !digits.is_empty() && !digits.starts_with('+') {
            f.write_str("+")?;
        }
        f.write_str(digits)
    }
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
