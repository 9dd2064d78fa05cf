//! Label vocabulary used to recognise description fields.
//!
//! The server renders its tooltips with fixed Chinese labels. They are kept
//! as data so a server with a different locale can be handled from
//! configuration alone.

use serde::{Deserialize, Serialize};

/// Text markers the description parser looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Style fragment identifying the heading span.
    #[serde(default = "default_heading_style")]
    pub heading_style: String,

    /// Prefix of the tier list item.
    #[serde(default = "default_tier_label")]
    pub tier_label: String,

    /// Prefix of the treasury list item.
    #[serde(default = "default_treasury_label")]
    pub treasury_label: String,

    /// Prefix of the area list item.
    #[serde(default = "default_area_label")]
    pub area_label: String,

    /// Opening marker of the member list item, e.g. `玩家(`.
    #[serde(default = "default_members_marker")]
    pub members_marker: String,

    /// Marker closing a counted list header, e.g. `):`.
    #[serde(default = "default_list_close")]
    pub list_close: String,

    /// Label preceding the steward account in the first block.
    #[serde(default = "default_owner_label")]
    pub owner_label: String,

    /// Sentence that introduces the polity block.
    #[serde(default = "default_polity_sentinel")]
    pub polity_sentinel: String,

    /// Prefix of the polity capital list item.
    #[serde(default = "default_capital_label")]
    pub capital_label: String,

    /// Opening marker of the polity territory list item, e.g. `领土(`.
    #[serde(default = "default_territories_marker")]
    pub territories_marker: String,
}

fn default_heading_style() -> String {
    "font-size:200%".to_owned()
}

fn default_tier_label() -> String {
    "等级:".to_owned()
}

fn default_treasury_label() -> String {
    "余额:".to_owned()
}

fn default_area_label() -> String {
    "区块:".to_owned()
}

fn default_members_marker() -> String {
    "玩家(".to_owned()
}

fn default_list_close() -> String {
    "):".to_owned()
}

fn default_owner_label() -> String {
    "所有者:".to_owned()
}

fn default_polity_sentinel() -> String {
    "这片领土属于国家".to_owned()
}

fn default_capital_label() -> String {
    "首都:".to_owned()
}

fn default_territories_marker() -> String {
    "领土(".to_owned()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            heading_style: default_heading_style(),
            tier_label: default_tier_label(),
            treasury_label: default_treasury_label(),
            area_label: default_area_label(),
            members_marker: default_members_marker(),
            list_close: default_list_close(),
            owner_label: default_owner_label(),
            polity_sentinel: default_polity_sentinel(),
            capital_label: default_capital_label(),
            territories_marker: default_territories_marker(),
        }
    }
}

/// Replace full-width colons with ASCII ones.
pub fn normalize_colons(s: &str) -> String {
    s.replace('\u{ff1a}', ":")
}
