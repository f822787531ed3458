use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AmountError;

/// Money with two decimal places, stored as cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(i64);

impl Amount {
    pub const fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    #[cfg(test)]
    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn abs_diff(self, other: Amount) -> Amount {
        Amount((self.0 - other.0).abs())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Accepts `1.234,56`, `1234,5`, `1234.56`, `1.234`, with optional `R$`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s: String = raw
            .replace("R$", "")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '"')
            .collect();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.as_str()),
        };

        let normalized = if s.contains(',') {
            s.replace('.', "").replace(',', ".")
        } else if s.matches('.').count() == 1
            && s.rsplit('.').next().is_some_and(|frac| frac.len() <= 2)
        {
            s.to_string()
        } else {
            s.replace('.', "")
        };

        let (int_part, frac_part) = normalized.split_once('.').unwrap_or((normalized.as_str(), ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountError::NotANumber);
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::NotANumber);
        }
        if frac_part.len() > 2 {
            return Err(AmountError::Precision);
        }

        let int: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| AmountError::NotANumber)?
        };
        let frac: i64 = format!("{:0<2}", frac_part)
            .parse()
            .map_err(|_| AmountError::NotANumber)?;
        let cents = int
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or(AmountError::NotANumber)?;

        Ok(Amount(if negative { -cents } else { cents }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Amount> for String {
    fn from(a: Amount) -> String {
        a.to_string()
    }
}

/// One row of the extracted table. Column names are part of the file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub numero: String,
    pub emissao: String,
    pub valor_pagar: Amount,
}

pub const EXTRACTED_HEADERS: [&str; 3] = ["numero", "emissao", "valor_pagar"];

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn brazilian_format() {
        assert_eq!(amt("1.234,56").cents(), 123_456);
        assert_eq!(amt("50,00").cents(), 5_000);
        assert_eq!(amt("R$ 47,5").cents(), 4_750);
    }

    #[test]
    fn dot_decimal_and_thousands() {
        assert_eq!(amt("50.00").cents(), 5_000);
        assert_eq!(amt("50.5").cents(), 5_050);
        assert_eq!(amt("1.234").cents(), 123_400);
        assert_eq!(amt("1.234.567").cents(), 123_456_700);
        assert_eq!(amt("120").cents(), 12_000);
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(amt("50,00").to_string(), "50.00");
        assert_eq!(amt("0,07").to_string(), "0.07");
        assert_eq!(amt("-3,5").to_string(), "-3.50");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<Amount>(), Err(AmountError::Empty));
        assert_eq!("abc".parse::<Amount>(), Err(AmountError::NotANumber));
        assert_eq!("12,345".parse::<Amount>(), Err(AmountError::Precision));
        assert_eq!(",".parse::<Amount>(), Err(AmountError::NotANumber));
    }

    #[test]
    fn csv_uses_canonical_amount() {
        let mut w = csv::Writer::from_writer(vec![]);
        w.serialize(ExtractedRecord {
            numero: "123".into(),
            emissao: "01/02/2024 12:30:00".into(),
            valor_pagar: amt("50,00"),
        })
        .unwrap();
        let out = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(out, "numero,emissao,valor_pagar\n123,01/02/2024 12:30:00,50.00\n");
    }
}
