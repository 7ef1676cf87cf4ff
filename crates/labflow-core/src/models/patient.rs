//! Patient models.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sex used to select reference ranges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Single-letter storage code.
    pub fn as_code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }

    /// Parse a storage code ("M"/"F", case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "M" => Some(Sex::Male),
            "F" => Some(Sex::Female),
            _ => None,
        }
    }
}

/// Patient validation errors, raised before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Patient name cannot be blank")]
    BlankName,

    #[error("Either age or date of birth is required")]
    MissingAgeAndBirthDate,

    #[error("Date of birth {0} is in the future")]
    BirthDateInFuture(NaiveDate),

    #[error("Age {0} cannot be converted to a birth date")]
    AgeOutOfRange(u32),
}

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Internal UUID
    pub patient_id: String,
    /// External, durable identifier printed on labels and used by the device feed.
    /// Empty until registration assigns one; immutable afterwards.
    pub accession_code: String,
    pub full_name: String,
    pub sex: Sex,
    pub date_of_birth: Option<NaiveDate>,
    /// Age in whole years
    pub age: Option<u32>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Create a new, unregistered patient.
    pub fn new(full_name: String, sex: Sex) -> Self {
        let now = Utc::now();
        Self {
            patient_id: uuid::Uuid::new_v4().to_string(),
            accession_code: String::new(),
            full_name,
            sex,
            date_of_birth: None,
            age: None,
            phone_number: None,
            address: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if an accession code has been assigned.
    pub fn has_accession_code(&self) -> bool {
        !self.accession_code.is_empty()
    }

    /// Bring age and date of birth into agreement.
    ///
    /// A date of birth always wins and the age is recomputed from it. With only an
    /// age, an approximate birth date is back-computed on 1 July of the birth year.
    pub fn reconcile_demographics(&mut self, today: NaiveDate) -> Result<(), ValidationError> {
        if self.full_name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }

        match (self.date_of_birth, self.age) {
            (Some(dob), _) => {
                if dob > today {
                    return Err(ValidationError::BirthDateInFuture(dob));
                }
                self.age = Some(age_on(dob, today));
            }
            (None, Some(age)) => {
                let dob = estimated_birth_date(age, today)
                    .ok_or(ValidationError::AgeOutOfRange(age))?;
                self.date_of_birth = Some(dob);
            }
            (None, None) => return Err(ValidationError::MissingAgeAndBirthDate),
        }
        Ok(())
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Completed years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Approximate birth date for a given age (mid-year anchor).
///
/// Never later than `today`, so an infant registered before July still passes
/// the future-date check when the record is saved again.
pub fn estimated_birth_date(age: u32, today: NaiveDate) -> Option<NaiveDate> {
    let age = i32::try_from(age).ok()?;
    NaiveDate::from_ymd_opt(today.year().checked_sub(age)?, 7, 1).map(|dob| dob.min(today))
}

/// Generate an accession code: `YYMMDD` followed by a four digit random suffix.
pub fn generate_accession_code<R: Rng + ?Sized>(today: NaiveDate, rng: &mut R) -> String {
    let suffix: u16 = rng.gen_range(1000..=9999);
    format!("{}{}", today.format("%y%m%d"), suffix)
}
