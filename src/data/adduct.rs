use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Canonical form of an adduct annotation.
///
/// Adducts reported by charge-deconvolution tools are sum formulas ("H2",
/// "NaH", "H2O"), and two features carry the same adduct when the formulas
/// match element-wise, not string-wise ("H2O" and "OH2" are the same
/// adduct). Strings that do not parse as a sum formula are kept verbatim
/// and compared as plain strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adduct {
    Formula(BTreeMap<String, u32>),
    Raw(String),
}

impl Adduct {
    /// Parse an adduct string into its canonical form.
    pub fn parse(input: &str) -> Adduct {
        let trimmed = input.trim();
        match parse_sum_formula(trimmed) {
            Some(counts) => Adduct::Formula(counts),
            None => Adduct::Raw(trimmed.to_string()),
        }
    }
}

impl Display for Adduct {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Adduct::Formula(counts) => {
                for (element, count) in counts {
                    if *count == 1 {
                        write!(f, "{}", element)?;
                    } else {
                        write!(f, "{}{}", element, count)?;
                    }
                }
                Ok(())
            }
            Adduct::Raw(s) => write!(f, "{}", s),
        }
    }
}

/// Element counts of a sum formula string, or `None` if the string is not a
/// plain sum formula. Repeated elements accumulate ("HH" == "H2").
fn parse_sum_formula(input: &str) -> Option<BTreeMap<String, u32>> {
    if input.is_empty() {
        return None;
    }
    let shape = Regex::new(r"^([A-Z][a-z]?\d*)+$").unwrap();
    if !shape.is_match(input) {
        return None;
    }
    let pattern = Regex::new(r"([A-Z][a-z]?)(\d*)").unwrap();

    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for cap in pattern.captures_iter(input) {
        let element = cap[1].to_string();
        let count: u32 = if cap[2].is_empty() {
            1
        } else {
            match cap[2].parse() {
                Ok(n) => n,
                Err(_) => return None,
            }
        };
        if count > 0 {
            *counts.entry(element).or_insert(0) += count;
        }
    }
    if counts.is_empty() {
        None
    } else {
        Some(counts)
    }
}
