//! Settlement description parsing.
//!
//! A marker's `desc` is an HTML tooltip assembled by the land-claim plugin.
//! Each field is recovered by its own heuristic; a field that cannot be read
//! keeps its empty default and, where that is unexpected, an
//! [`ExtractionAnomaly`] is recorded. Parsing never fails.

use claimwatch_types::PolityHint;
use tracing::warn;

use crate::error::ExtractionAnomaly;
use crate::html::{Document, NodeId, squash};
use crate::vocabulary::{Vocabulary, normalize_colons};

/// Fields recovered from one description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionFields {
    /// Heading text with line breaks removed.
    pub name: String,
    /// Tier label.
    pub tier: String,
    /// Steward account.
    pub steward: String,
    /// Treasury text.
    pub treasury: String,
    /// Claimed area in chunks.
    pub area: u64,
    /// Member accounts, ordered and without duplicates.
    pub members: Vec<String>,
    /// Owning polity name, empty when unaffiliated.
    pub polity: String,
    /// Polity sub-fields carried by this description.
    pub polity_hint: PolityHint,
}

/// Outcome of [`parse_description`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDescription {
    /// The recovered fields.
    pub fields: DescriptionFields,
    /// Problems that were recovered from while parsing.
    pub anomalies: Vec<ExtractionAnomaly>,
}

/// Parse a settlement description.
pub fn parse_description(html: &str, vocab: &Vocabulary) -> ParsedDescription {
    let doc = Document::parse(html);
    let mut fields = DescriptionFields::default();
    let mut anomalies = Vec::new();

    match heading(&doc, vocab) {
        Some(name) => fields.name = name,
        None => anomalies.push(ExtractionAnomaly::MissingName),
    }

    let polity = polity_block(&doc, vocab, &mut anomalies);
    let polity_list = polity.as_ref().and_then(|p| p.list);
    if let Some(block) = polity {
        fields.polity = block.name;
        fields.polity_hint = block.hint;
    }

    let items = doc
        .elements("li")
        .filter(|&li| polity_list.is_none_or(|list| !doc.is_within(li, list)));
    read_list_items(&doc, items, vocab, &mut fields, &mut anomalies);

    fields.steward = steward(&doc, vocab)
        .or_else(|| fields.members.first().cloned())
        .unwrap_or_default();

    for anomaly in &anomalies {
        warn!(settlement = %fields.name, %anomaly, "description anomaly");
    }
    ParsedDescription { fields, anomalies }
}

/// Text of the first span styled as a heading.
fn heading(doc: &Document, vocab: &Vocabulary) -> Option<String> {
    let wanted = squash(&vocab.heading_style);
    let span = doc.elements("span").find(|&span| {
        doc.attr(span, "style")
            .is_some_and(|style| squash(style).contains(&wanted))
    })?;
    Some(doc.stripped_text(span).replace(['\n', '\r'], ""))
}

/// Tier, treasury, area and members from the settlement's own list items.
/// The first item to carry a field wins. Items inside the polity list are
/// filtered out by the caller, so the polity tier never replaces the
/// settlement tier.
fn read_list_items(
    doc: &Document,
    items: impl Iterator<Item = NodeId>,
    vocab: &Vocabulary,
    fields: &mut DescriptionFields,
    anomalies: &mut Vec<ExtractionAnomaly>,
) {
    let mut seen_tier = false;
    let mut seen_treasury = false;
    let mut seen_area = false;
    let mut seen_members = false;

    for li in items {
        let text = normalize_colons(&doc.stripped_text(li));
        if let Some(value) = text.strip_prefix(vocab.tier_label.as_str()) {
            if !seen_tier {
                fields.tier = value.trim().to_owned();
                seen_tier = true;
            }
        } else if let Some(value) = text.strip_prefix(vocab.treasury_label.as_str()) {
            if !seen_treasury {
                fields.treasury = value.trim().to_owned();
                seen_treasury = true;
            }
        } else if let Some(value) = text.strip_prefix(vocab.area_label.as_str()) {
            if !seen_area {
                let value = value.trim();
                fields.area = value.parse().unwrap_or_else(|_| {
                    anomalies.push(ExtractionAnomaly::AreaNotNumeric {
                        raw: value.to_owned(),
                    });
                    0
                });
                seen_area = true;
            }
        } else if !seen_members
            && let Some(list) = counted_list(&text, &vocab.members_marker, &vocab.list_close)
        {
            fields.members = list;
            seen_members = true;
        }
    }
}

/// Steward token from the first block element, if any.
fn steward(doc: &Document, vocab: &Vocabulary) -> Option<String> {
    let div = doc.elements("div").next()?;
    let text = normalize_colons(&doc.text(div));
    let (_, after) = text.split_once(vocab.owner_label.as_str())?;
    let token = after.trim_start().split('.').next().unwrap_or_default().trim();
    (!token.is_empty()).then(|| token.to_owned())
}

/// Comma-separated names after `close` in an item that contains both
/// `marker` and `close`. Empty entries are dropped and duplicates removed,
/// preserving first occurrence.
fn counted_list(text: &str, marker: &str, close: &str) -> Option<Vec<String>> {
    if !text.contains(marker) {
        return None;
    }
    let (_, tail) = text.split_once(close)?;
    let mut out: Vec<String> = Vec::new();
    for entry in tail.split([',', '\u{ff0c}']).map(str::trim) {
        if !entry.is_empty() && !out.iter().any(|e| e == entry) {
            out.push(entry.to_owned());
        }
    }
    Some(out)
}

struct PolityBlock {
    name: String,
    hint: PolityHint,
    list: Option<NodeId>,
}

/// The polity block introduced by the first heading carrying the sentinel.
fn polity_block(
    doc: &Document,
    vocab: &Vocabulary,
    anomalies: &mut Vec<ExtractionAnomaly>,
) -> Option<PolityBlock> {
    let strong = doc
        .elements("strong")
        .find(|&s| doc.text(s).contains(vocab.polity_sentinel.as_str()))?;
    let text = normalize_colons(&doc.text(strong));

    let name = text
        .split_once(vocab.polity_sentinel.as_str())
        .and_then(|(_, after)| after.split_once(':'))
        .map(|(name, _)| name.trim().to_owned())
        .filter(|name| !name.is_empty());
    let Some(name) = name else {
        anomalies.push(ExtractionAnomaly::PolityNameUnreadable { text });
        return None;
    };

    let list = doc
        .parent(strong)
        .and_then(|parent| doc.next_sibling_element(parent, "ul"));
    let Some(list) = list else {
        anomalies.push(ExtractionAnomaly::PolityDetailsMissing {
            polity: name.clone(),
        });
        return Some(PolityBlock {
            name,
            hint: PolityHint::default(),
            list: None,
        });
    };

    let mut hint = PolityHint::default();
    for li in doc.descendants(list, "li") {
        let text = normalize_colons(&doc.stripped_text(li));
        if let Some(value) = text.strip_prefix(vocab.tier_label.as_str()) {
            if hint.tier.is_empty() {
                value.trim().clone_into(&mut hint.tier);
            }
        } else if let Some(value) = text.strip_prefix(vocab.capital_label.as_str()) {
            if hint.capital.is_empty() {
                value.trim().clone_into(&mut hint.capital);
            }
        } else if hint.territories.is_empty()
            && let Some(territories) =
                counted_list(&text, &vocab.territories_marker, &vocab.list_close)
        {
            hint.territories = territories;
        }
    }

    Some(PolityBlock {
        name,
        hint,
        list: Some(list),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> ParsedDescription {
        parse_description(html, &Vocabulary::default())
    }

    #[test]
    fn basic_settlement() {
        let p = parse(
            "<span style='font-size:200%'>Riverton</span><ul><li>等级:3</li>\
             <li>区块:120</li><li>玩家(2):alice, bob</li></ul>",
        );
        assert_eq!(p.fields.name, "Riverton");
        assert_eq!(p.fields.tier, "3");
        assert_eq!(p.fields.area, 120);
        assert_eq!(p.fields.members, vec!["alice", "bob"]);
        assert_eq!(p.fields.steward, "alice");
        assert!(p.fields.polity.is_empty());
        assert!(p.anomalies.is_empty());
    }

    #[test]
    fn explicit_owner_beats_first_member() {
        let p = parse(
            "<div>所有者: carol. 其他</div><span style=\"font-size: 200%\">Oakvale</span>\
             <ul><li>玩家(2):alice,bob</li></ul>",
        );
        assert_eq!(p.fields.steward, "carol");
        assert_eq!(p.fields.members, vec!["alice", "bob"]);
    }

    #[test]
    fn blank_owner_falls_back_to_members() {
        let p = parse("<div>所有者:   .</div><ul><li>玩家(1):dave</li></ul>");
        assert_eq!(p.fields.steward, "dave");
    }

    #[test]
    fn no_owner_no_members_leaves_steward_empty() {
        let p = parse("<span style='font-size:200%'>Lonely</span>");
        assert!(p.fields.steward.is_empty());
        assert!(p.fields.members.is_empty());
    }

    #[test]
    fn heading_line_breaks_removed() {
        let p = parse("<span style='FONT-SIZE:200%'>River\r\nton</span>");
        assert_eq!(p.fields.name, "Riverton");
    }

    #[test]
    fn heading_padding_trimmed() {
        let p = parse(
            "<span style='font-size:200%'>\n  Riverton  \n</span><ul><li>区块:10</li></ul>",
        );
        assert_eq!(p.fields.name, "Riverton");
        assert_eq!(p.fields.area, 10);
    }

    #[test]
    fn missing_heading_is_anomaly() {
        let p = parse("<ul><li>等级:1</li></ul>");
        assert!(p.fields.name.is_empty());
        assert_eq!(p.anomalies, vec![ExtractionAnomaly::MissingName]);
    }

    #[test]
    fn non_numeric_area_defaults_to_zero() {
        let p = parse("<span style='font-size:200%'>A</span><ul><li>区块:lots</li></ul>");
        assert_eq!(p.fields.area, 0);
        assert_eq!(
            p.anomalies,
            vec![ExtractionAnomaly::AreaNotNumeric {
                raw: "lots".to_owned()
            }]
        );
    }

    #[test]
    fn full_width_colons_accepted() {
        let p = parse("<ul><li>等级：5</li><li>余额：1,200.50</li></ul>");
        assert_eq!(p.fields.tier, "5");
        assert_eq!(p.fields.treasury, "1,200.50");
    }

    #[test]
    fn members_deduplicated_and_blanks_dropped() {
        let p = parse("<ul><li>玩家(4): alice, , bob,alice </li></ul>");
        assert_eq!(p.fields.members, vec!["alice", "bob"]);
    }

    #[test]
    fn polity_block_read_from_following_list() {
        let p = parse(
            "<span style='font-size:200%'>Riverton</span>\
             <ul><li>等级:3</li><li>区块:120</li></ul>\
             <p><strong>这片领土属于国家 Northreach: 欢迎</strong></p>\
             <ul><li>等级:2</li><li>首都:Riverton</li><li>领土(2):Riverton, Oakvale</li></ul>",
        );
        assert_eq!(p.fields.polity, "Northreach");
        assert_eq!(p.fields.polity_hint.tier, "2");
        assert_eq!(p.fields.polity_hint.capital, "Riverton");
        assert_eq!(p.fields.polity_hint.territories, vec!["Riverton", "Oakvale"]);
        // settlement tier is not overwritten by the polity list
        assert_eq!(p.fields.tier, "3");
    }

    #[test]
    fn only_first_polity_sentinel_honoured() {
        let p = parse(
            "<p><strong>这片领土属于国家First:</strong></p><ul><li>首都:A</li></ul>\
             <p><strong>这片领土属于国家Second:</strong></p><ul><li>首都:B</li></ul>",
        );
        assert_eq!(p.fields.polity, "First");
        assert_eq!(p.fields.polity_hint.capital, "A");
    }

    #[test]
    fn polity_without_colon_is_anomaly() {
        let p = parse("<p><strong>这片领土属于国家Nowhere</strong></p>");
        assert!(p.fields.polity.is_empty());
        assert!(matches!(
            p.anomalies.as_slice(),
            [ExtractionAnomaly::MissingName, ExtractionAnomaly::PolityNameUnreadable { .. }]
        ));
    }

    #[test]
    fn polity_without_list_keeps_name() {
        let p = parse("<p><strong>这片领土属于国家Bare:</strong></p>");
        assert_eq!(p.fields.polity, "Bare");
        assert!(p.fields.polity_hint.is_empty());
    }
}
