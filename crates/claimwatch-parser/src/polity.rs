//! Polity candidates from an extracted batch.

use std::collections::HashSet;

use claimwatch_types::{PolityCandidate, Settlement};

/// One candidate per distinct non-empty affiliation, in first-seen order.
///
/// The first settlement naming a polity seeds its tier, capital and
/// territory list; later settlements naming the same polity are ignored.
/// Aggregates are not computed here.
pub fn derive_polities(settlements: &[Settlement]) -> Vec<PolityCandidate> {
    let mut seen = HashSet::new();
    settlements
        .iter()
        .filter(|s| s.is_affiliated())
        .filter(|s| seen.insert(s.polity.trim()))
        .map(|s| PolityCandidate::seeded(s.polity.trim(), &s.polity_hint))
        .collect()
}

#[cfg(test)]
mod tests {
    use claimwatch_types::PolityHint;

    use super::*;

    fn settlement(name: &str, polity: &str, capital: &str) -> Settlement {
        Settlement {
            name: name.to_owned(),
            polity: polity.to_owned(),
            polity_hint: PolityHint {
                tier: String::new(),
                capital: capital.to_owned(),
                territories: vec![name.to_owned()],
            },
            ..Settlement::default()
        }
    }

    #[test]
    fn first_settlement_seeds_candidate() {
        let batch = vec![
            settlement("Riverton", "Northreach", "Riverton"),
            settlement("Oakvale", "Northreach", "Oakvale"),
            settlement("Dunmere", "Southmark", "Dunmere"),
        ];
        let out = derive_polities(&batch);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "Northreach");
        assert_eq!(out[0].capital, "Riverton");
        assert_eq!(out[0].territories, vec!["Riverton"]);
        assert_eq!(out[1].name, "Southmark");
    }

    #[test]
    fn unaffiliated_settlements_ignored() {
        let batch = vec![settlement("A", "", ""), settlement("B", "   ", "")];
        assert!(derive_polities(&batch).is_empty());
    }
}
