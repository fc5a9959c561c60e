// src/postal.rs
//! Canadian postal codes as a refinement hierarchy.
//!
//! A code is a fully specified Forward Sortation Area (`K1A`) followed by
//! 0 to 3 characters of the Local Delivery Unit (`0B1`). The LDU length is
//! the refinement depth. Position 1 and 3 of the LDU are digits, position 2
//! is a letter; which digits and letters the register accepts is
//! configuration (`Alphabet`), not derived.

use std::fmt;

use thiserror::Error;

use crate::config::consts::{DIGITS, LETTERS};

pub const FSA_LEN: usize = 3;
pub const MAX_LDU_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostalError {
    #[error("invalid postal code {input:?}: {reason}")]
    InvalidFormat { input: String, reason: &'static str },
    #[error("cannot refine {code}: already a full postal code")]
    DepthExceeded { code: String },
}

fn invalid(input: &str, reason: &'static str) -> PostalError {
    PostalError::InvalidFormat { input: s!(input), reason }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharClass {
    Digit,
    Letter,
}

impl CharClass {
    /// Class of the LDU character at 1-based `level`.
    pub fn at_level(level: usize) -> Option<Self> {
        match level {
            1 | 3 => Some(CharClass::Digit),
            2 => Some(CharClass::Letter),
            _ => None,
        }
    }

    pub fn accepts(self, c: char) -> bool {
        match self {
            CharClass::Digit => c.is_ascii_digit(),
            CharClass::Letter => c.is_ascii_uppercase(),
        }
    }
}

/// Characters tried at each LDU position, in iteration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alphabet {
    digits: Vec<char>,
    letters: Vec<char>,
}

impl Default for Alphabet {
    fn default() -> Self {
        Self {
            digits: DIGITS.chars().collect(),
            letters: LETTERS.chars().collect(),
        }
    }
}

impl Alphabet {
    pub fn new(digits: &str, letters: &str) -> Result<Self, String> {
        let digits = Self::checked(digits, CharClass::Digit, "digits")?;
        let letters = Self::checked(&letters.to_ascii_uppercase(), CharClass::Letter, "letters")?;
        Ok(Self { digits, letters })
    }

    fn checked(set: &str, class: CharClass, what: &str) -> Result<Vec<char>, String> {
        let mut out: Vec<char> = Vec::with_capacity(set.len());
        for c in set.chars() {
            if !class.accepts(c) {
                return Err(format!("{what} alphabet contains {c:?}"));
            }
            if out.contains(&c) {
                return Err(format!("{what} alphabet repeats {c:?}"));
            }
            out.push(c);
        }
        if out.is_empty() {
            return Err(format!("{what} alphabet is empty"));
        }
        Ok(out)
    }

    /// Characters valid at 1-based LDU `level`. Empty outside 1..=3.
    pub fn at(&self, level: usize) -> &[char] {
        match CharClass::at_level(level) {
            Some(CharClass::Digit) => &self.digits,
            Some(CharClass::Letter) => &self.letters,
            None => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostalCode {
    fsa: String,
    ldu: String,
}

impl PostalCode {
    /// Level-0 code from an FSA such as `K1A`.
    pub fn make_root(fsa: &str) -> Result<Self, PostalError> {
        let norm = fsa.trim().to_ascii_uppercase();
        let chars: Vec<char> = norm.chars().collect();
        if chars.len() != FSA_LEN {
            return Err(invalid(fsa, "FSA must be 3 characters"));
        }
        let ok = chars[0].is_ascii_uppercase()
            && chars[1].is_ascii_digit()
            && chars[2].is_ascii_uppercase();
        if !ok {
            return Err(invalid(fsa, "FSA must be letter-digit-letter"));
        }
        Ok(Self { fsa: norm, ldu: s!() })
    }

    /// Accepts `K1A`, `K1A0`, `K1A 0B`, `K1A+0B1` and lowercase.
    pub fn parse(input: &str) -> Result<Self, PostalError> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '+')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if compact.len() < FSA_LEN || compact.len() > FSA_LEN + MAX_LDU_LEN || !compact.is_ascii() {
            return Err(invalid(input, "expected 3 to 6 characters"));
        }
        let mut code = Self::make_root(&compact[..FSA_LEN]).map_err(|_| invalid(input, "FSA must be letter-digit-letter"))?;
        for c in compact[FSA_LEN..].chars() {
            code = code.refine(c).map_err(|_| invalid(input, "LDU must be digit-letter-digit"))?;
        }
        Ok(code)
    }

    /// Child code with `next` appended to the LDU.
    pub fn refine(&self, next: char) -> Result<Self, PostalError> {
        if self.ldu.len() >= MAX_LDU_LEN {
            return Err(PostalError::DepthExceeded { code: self.to_string() });
        }
        let next = next.to_ascii_uppercase();
        let class = CharClass::at_level(self.depth() + 1);
        if !class.is_some_and(|cl| cl.accepts(next)) {
            return Err(invalid(&format!("{self}{next}"), "LDU must be digit-letter-digit"));
        }
        let mut ldu = self.ldu.clone();
        ldu.push(next);
        Ok(Self { fsa: self.fsa.clone(), ldu })
    }

    pub fn parent(&self) -> Option<Self> {
        if self.ldu.is_empty() {
            return None;
        }
        let mut ldu = self.ldu.clone();
        ldu.pop();
        Some(Self { fsa: self.fsa.clone(), ldu })
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.ldu.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.depth() == MAX_LDU_LEN
    }

    pub fn fsa(&self) -> &str {
        &self.fsa
    }

    pub fn ldu(&self) -> &str {
        &self.ldu
    }

    /// Form used in the register's search box: `K1A 0B`.
    pub fn spaced(&self) -> String {
        if self.ldu.is_empty() {
            self.fsa.clone()
        } else {
            format!("{} {}", self.fsa, self.ldu)
        }
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.fsa, self.ldu)
    }
}

impl std::str::FromStr for PostalCode {
    type Err = PostalError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_accepts_fsa_and_normalises_case() {
        let p = PostalCode::make_root("k1a").unwrap();
        assert_eq!(p.fsa(), "K1A");
        assert_eq!(p.depth(), 0);
        assert_eq!(p.to_string(), "K1A");
    }

    #[test]
    fn root_rejects_bad_shapes() {
        for bad in ["", "K1", "K1AB", "11A", "KAA", "K11", "K1É"] {
            assert!(
                matches!(PostalCode::make_root(bad), Err(PostalError::InvalidFormat { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn refine_follows_digit_letter_digit() {
        let p = PostalCode::make_root("K1A").unwrap();
        let a = p.refine('0').unwrap();
        let b = a.refine('b').unwrap();
        let c = b.refine('1').unwrap();
        assert_eq!(c.to_string(), "K1A0B1");
        assert_eq!(c.spaced(), "K1A 0B1");
        assert!(c.is_full());

        assert!(p.refine('B').is_err());
        assert!(a.refine('1').is_err());
        assert!(b.refine('C').is_err());
    }

    #[test]
    fn refine_past_full_code_is_depth_exceeded() {
        let full = PostalCode::parse("K1A 0B1").unwrap();
        assert_eq!(
            full.refine('2'),
            Err(PostalError::DepthExceeded { code: s!("K1A0B1") })
        );
    }

    #[test]
    fn parse_accepts_plus_and_space_separators() {
        for text in ["K1A+0B", "k1a 0b", "K1A0B", " K1A 0 B "] {
            let p = PostalCode::parse(text).unwrap();
            assert_eq!(p.to_string(), "K1A0B", "{text:?}");
        }
        assert!(PostalCode::parse("K1A0B1X").is_err());
        assert!(PostalCode::parse("K1AB").is_err());
    }

    #[test]
    fn parent_drops_last_ldu_char() {
        let p = PostalCode::parse("K1A0B").unwrap();
        assert_eq!(p.parent().unwrap().to_string(), "K1A0");
        assert_eq!(PostalCode::parse("K1A").unwrap().parent(), None);
    }

    #[test]
    fn alphabet_positions() {
        let a = Alphabet::default();
        assert_eq!(a.at(1).len(), 10);
        assert_eq!(a.at(2).len(), 20);
        assert!(!a.at(2).contains(&'D'));
        assert_eq!(a.at(3), a.at(1));
        assert!(a.at(0).is_empty());
        assert!(a.at(4).is_empty());
    }

    #[test]
    fn alphabet_rejects_wrong_classes() {
        assert!(Alphabet::new("01a", "AB").is_err());
        assert!(Alphabet::new("01", "A1").is_err());
        assert!(Alphabet::new("", "A").is_err());
        assert!(Alphabet::new("00", "A").is_err());
        assert_eq!(Alphabet::new("0", "ab").unwrap().at(2), &['A', 'B']);
    }
}
