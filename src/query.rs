// src/query.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::postal::{PostalCode, PostalError};

/// Separator between the parts of a canonical query key.
pub const KEY_SEP: char = '+';
const ANY: &str = "Any";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DoctorType {
    #[default]
    Any,
    #[serde(rename = "Family Doctor")]
    FamilyDoctor,
    Specialist,
}

impl DoctorType {
    /// Short form used in keys and file names.
    pub fn key(self) -> &'static str {
        match self {
            DoctorType::Any => "Any",
            DoctorType::FamilyDoctor => "FamilyDoctor",
            DoctorType::Specialist => "Specialist",
        }
    }

    /// Value the register's search form expects.
    pub fn form_value(self) -> &'static str {
        match self {
            DoctorType::Any => "Any",
            DoctorType::FamilyDoctor => "Family Doctor",
            DoctorType::Specialist => "Specialist",
        }
    }
}

impl fmt::Display for DoctorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DoctorType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match norm.as_str() {
            "any" => Ok(DoctorType::Any),
            "familydoctor" | "family" => Ok(DoctorType::FamilyDoctor),
            "specialist" => Ok(DoctorType::Specialist),
            _ => Err(format!("unknown doctor type: {s}")),
        }
    }
}

/// One search against the register. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Query {
    postal_code: PostalCode,
    doctor_type: DoctorType,
    last_name: Option<String>,
}

impl Query {
    /// Blank or `Any` last names mean "no filter".
    pub fn new(postal_code: PostalCode, doctor_type: DoctorType, last_name: Option<&str>) -> Self {
        let last_name = last_name
            .map(str::trim)
            .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case(ANY))
            .map(String::from);
        Self { postal_code, doctor_type, last_name }
    }

    pub fn postal_code(&self) -> &PostalCode {
        &self.postal_code
    }

    pub fn doctor_type(&self) -> DoctorType {
        self.doctor_type
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.postal_code.depth()
    }

    /// `K1A0+Any+Any`, `K1A0B+FamilyDoctor+Smith`.
    pub fn key(&self) -> String {
        format!(
            "{}{KEY_SEP}{}{KEY_SEP}{}",
            self.postal_code,
            self.doctor_type.key(),
            self.last_name.as_deref().unwrap_or(ANY)
        )
    }

    /// Same filters, postal code extended by `next`.
    pub fn child(&self, next: char) -> Result<Self, PostalError> {
        Ok(Self {
            postal_code: self.postal_code.refine(next)?,
            doctor_type: self.doctor_type,
            last_name: self.last_name.clone(),
        })
    }

    /// The query this one refines; `None` at level 0.
    pub fn parent(&self) -> Option<Self> {
        self.postal_code.parent().map(|postal_code| Self {
            postal_code,
            doctor_type: self.doctor_type,
            last_name: self.last_name.clone(),
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc(s: &str) -> PostalCode {
        PostalCode::parse(s).unwrap()
    }

    #[test]
    fn key_orders_all_attributes() {
        let q = Query::new(pc("K1A0"), DoctorType::FamilyDoctor, Some("Smith"));
        assert_eq!(q.key(), "K1A0+FamilyDoctor+Smith");
        let q = Query::new(pc("K1A"), DoctorType::Any, None);
        assert_eq!(q.key(), "K1A+Any+Any");
    }

    #[test]
    fn any_and_blank_last_names_are_no_filter() {
        let a = Query::new(pc("K1A"), DoctorType::Any, Some("any"));
        let b = Query::new(pc("K1A"), DoctorType::Any, Some("   "));
        let c = Query::new(pc("K1A"), DoctorType::Any, None);
        assert_eq!(a, c);
        assert_eq!(b, c);
        assert_eq!(a.last_name(), None);
    }

    #[test]
    fn child_and_parent_share_filters() {
        let q = Query::new(pc("K1A"), DoctorType::Specialist, Some("Lee"));
        let child = q.child('7').unwrap();
        assert_eq!(child.key(), "K1A7+Specialist+Lee");
        assert_eq!(child.parent().as_ref(), Some(&q));
        assert_eq!(q.parent(), None);
    }

    #[test]
    fn doctor_type_parses_cli_and_form_spellings() {
        for s in ["Family+Doctor", "family-doctor", "Family Doctor", "FamilyDoctor"] {
            assert_eq!(s.parse::<DoctorType>().unwrap(), DoctorType::FamilyDoctor);
        }
        assert_eq!("ANY".parse::<DoctorType>().unwrap(), DoctorType::Any);
        assert!("surgeon".parse::<DoctorType>().is_err());
    }
}
