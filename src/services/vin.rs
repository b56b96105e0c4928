//! Validación de VIN
//!
//! Reglas ISO 3779 / NHTSA: 17 caracteres, sin I/O/Q, dígito verificador en
//! la posición 9.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub const VIN_LENGTH: usize = 17;

const WEIGHTS: [u32; VIN_LENGTH] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

lazy_static! {
    static ref VIN_CANDIDATE: Regex = Regex::new(r"[A-HJ-NPR-Z0-9]{17}").expect("valid VIN regex");
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VinError {
    #[error("VIN must have 17 characters, got {0}")]
    Length(usize),
    #[error("VIN contains invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("VIN check digit mismatch: expected '{expected}', found '{found}'")]
    CheckDigit { expected: char, found: char },
}

/// Pasar a mayúsculas y quitar espacios y guiones
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn transliterate(c: char) -> Option<u32> {
    let value = match c {
        '0'..='9' => c.to_digit(10)?,
        'A' | 'J' => 1,
        'B' | 'K' | 'S' => 2,
        'C' | 'L' | 'T' => 3,
        'D' | 'M' | 'U' => 4,
        'E' | 'N' | 'V' => 5,
        'F' | 'W' => 6,
        'G' | 'P' | 'X' => 7,
        'H' | 'Y' => 8,
        'R' | 'Z' => 9,
        _ => return None,
    };
    Some(value)
}

/// Dígito verificador esperado para un VIN de 17 caracteres ya validado en charset
fn check_digit(chars: &[char]) -> Option<char> {
    let mut sum = 0;
    for (c, weight) in chars.iter().zip(WEIGHTS.iter()) {
        sum += transliterate(*c)? * weight;
    }
    match sum % 11 {
        10 => Some('X'),
        remainder => char::from_digit(remainder, 10),
    }
}

/// Validar un VIN y devolverlo normalizado
pub fn validate(raw: &str) -> Result<String, VinError> {
    let vin = normalize(raw);
    let chars: Vec<char> = vin.chars().collect();

    if chars.len() != VIN_LENGTH {
        return Err(VinError::Length(chars.len()));
    }

    if let Some(bad) = chars.iter().find(|c| transliterate(**c).is_none()) {
        return Err(VinError::InvalidCharacter(*bad));
    }

    let expected = check_digit(&chars).ok_or(VinError::InvalidCharacter(chars[8]))?;
    if chars[8] != expected {
        return Err(VinError::CheckDigit {
            expected,
            found: chars[8],
        });
    }

    Ok(vin)
}

/// Buscar un candidato a VIN dentro de texto libre
pub fn find_candidate(text: &str) -> Option<String> {
    let upper = text.to_ascii_uppercase();
    VIN_CANDIDATE
        .find(&upper)
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_vins() {
        assert_eq!(validate("1M8GDM9AXKP042788").unwrap(), "1M8GDM9AXKP042788");
        assert_eq!(validate("11111111111111111").unwrap(), "11111111111111111");
        assert_eq!(validate("1hgcm82633a004352").unwrap(), "1HGCM82633A004352");
        assert_eq!(validate("JH4-KA7561-PC008269").unwrap(), "JH4KA7561PC008269");
    }

    #[test]
    fn test_length_rule() {
        assert_eq!(validate("1HGCM82633A00435"), Err(VinError::Length(16)));
        assert_eq!(validate(""), Err(VinError::Length(0)));
    }

    #[test]
    fn test_forbidden_letters() {
        assert_eq!(
            validate("1HGCM82633I004352"),
            Err(VinError::InvalidCharacter('I'))
        );
        assert_eq!(
            validate("1HGCM82633O004352"),
            Err(VinError::InvalidCharacter('O'))
        );
    }

    #[test]
    fn test_check_digit_mismatch() {
        assert_eq!(
            validate("1HGCM82633A004353"),
            Err(VinError::CheckDigit {
                expected: '5',
                found: '3'
            })
        );
    }

    #[test]
    fn test_find_candidate_in_reply() {
        let reply = "The VIN on the plate reads 1hgcm82633a004352, partially obscured.";
        assert_eq!(find_candidate(reply).as_deref(), Some("1HGCM82633A004352"));
        assert_eq!(find_candidate("no vin here"), None);
    }
}
