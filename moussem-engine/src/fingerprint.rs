//! Content-addressed duplicate lookup keys.
//!
//! Four kinds per event, all SHA-256 over the joined components,
//! hex-encoded to uniform 64-character strings. The 0x1F unit separator
//! joins components; normalization collapses every non-alphanumeric byte to
//! a space, so the separator can never occur inside a component.

use chrono::{Datelike, Duration, NaiveDate};
use moussem_core::domain::FingerprintKind;
use sha2::{Digest, Sha256};

const SEP: u8 = 0x1f;

/// The attributes a fingerprint set is derived from.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub normalized_name: &'a str,
    pub start_date: Option<NaiveDate>,
    pub city_id: Option<i64>,
}

/// All fingerprints derivable from the given attributes. Missing components
/// suppress the kinds that need them.
pub fn generate(input: FingerprintInput) -> Vec<(FingerprintKind, String)> {
    let mut prints = Vec::with_capacity(4);
    let (Some(start_date), Some(city_id)) = (input.start_date, input.city_id) else {
        return prints;
    };
    let date = start_date.format("%Y-%m-%d").to_string();
    let city = city_id.to_string();

    if !input.normalized_name.is_empty() {
        prints.push((
            FingerprintKind::Exact,
            digest(&[input.normalized_name, &date, &city]),
        ));
        let prefix = first_tokens(input.normalized_name, 3);
        prints.push((FingerprintKind::FuzzyName, digest(&[&prefix, &date, &city])));
    }
    prints.push((FingerprintKind::DateLocation, digest(&[&date, &city])));
    let week = iso_week_start(start_date).format("%Y-%m-%d").to_string();
    prints.push((FingerprintKind::WeekLocation, digest(&[&week, &city])));
    prints
}

/// Monday of the date's ISO week.
pub fn iso_week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn first_tokens(name: &str, n: usize) -> String {
    name.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([SEP]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> FingerprintInput {
        FingerprintInput {
            normalized_name: name,
            start_date: NaiveDate::from_ymd_opt(2025, 6, 26),
            city_id: Some(25),
        }
    }

    #[test]
    fn generates_all_four_kinds() {
        let prints = generate(input("gnaoua et musiques du monde"));
        assert_eq!(prints.len(), 4);
        let kinds: Vec<_> = prints.iter().map(|(k, _)| *k).collect();
        assert!(kinds.contains(&FingerprintKind::Exact));
        assert!(kinds.contains(&FingerprintKind::FuzzyName));
        assert!(kinds.contains(&FingerprintKind::DateLocation));
        assert!(kinds.contains(&FingerprintKind::WeekLocation));
        for (_, hash) in &prints {
            assert_eq!(hash.len(), 64);
        }
    }

    #[test]
    fn stable_across_runs() {
        assert_eq!(
            generate(input("gnaoua et musiques du monde")),
            generate(input("gnaoua et musiques du monde"))
        );
    }

    #[test]
    fn fuzzy_kind_uses_first_three_tokens() {
        let a = generate(input("gnaoua et musiques du monde"));
        let b = generate(input("gnaoua et musiques"));
        let fuzzy_a = a.iter().find(|(k, _)| *k == FingerprintKind::FuzzyName).unwrap();
        let fuzzy_b = b.iter().find(|(k, _)| *k == FingerprintKind::FuzzyName).unwrap();
        assert_eq!(fuzzy_a.1, fuzzy_b.1);
        let exact_a = a.iter().find(|(k, _)| *k == FingerprintKind::Exact).unwrap();
        let exact_b = b.iter().find(|(k, _)| *k == FingerprintKind::Exact).unwrap();
        assert_ne!(exact_a.1, exact_b.1);
    }

    #[test]
    fn missing_city_suppresses_everything() {
        let prints = generate(FingerprintInput {
            normalized_name: "gnaoua",
            start_date: NaiveDate::from_ymd_opt(2025, 6, 26),
            city_id: None,
        });
        assert!(prints.is_empty());
    }

    #[test]
    fn missing_name_keeps_location_kinds() {
        let prints = generate(FingerprintInput {
            normalized_name: "",
            start_date: NaiveDate::from_ymd_opt(2025, 6, 26),
            city_id: Some(25),
        });
        let kinds: Vec<_> = prints.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![FingerprintKind::DateLocation, FingerprintKind::WeekLocation]
        );
    }

    #[test]
    fn week_start_is_monday() {
        // 2025-06-26 is a Thursday.
        let date = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
        assert_eq!(iso_week_start(date), NaiveDate::from_ymd_opt(2025, 6, 23).unwrap());
    }
}
