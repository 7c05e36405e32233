use once_cell::sync::Lazy;
use regex::Regex;

use super::aliases::MemberAliases;

const MEMBER_URL: &str = "https://www.pixiv.net/member.php?id=";
const ILLUST_URL: &str = "https://www.pixiv.net/member_illust.php";

/// Default page mode for illustration links
pub const DEFAULT_ILLUST_MODE: &str = "medium";

// Everything from the first at-sign on is usually a status note ("@commissions open")
static AT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(@|＠).*").unwrap());

// Convention booth announcements appended to display names, e.g. "3日目東A01a"
static EVENT_DAY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[◆✦|_✳︎]?([0-9一三]|月曜)日.+?[0-9]+[a-z]*").unwrap()
});

/// Build a filesystem-friendly tag for a member: `<name>_pixiv<id>`.
///
/// The alias table wins over the display name. Characters outside the Basic
/// Multilingual Plane become U+FFFD, as some sync clients reject them.
pub fn fmt_member_tag(aliases: &MemberAliases, member_id: u64, member_name: &str) -> String {
    let name = aliases.get(member_id).unwrap_or(member_name);

    let name: String = name
        .chars()
        .map(|c| if (c as u32) > 0xFFFF { '\u{FFFD}' } else { c })
        .collect();
    let name = AT_SUFFIX.replace(&name, "");
    let name = EVENT_DAY_SUFFIX.replace_all(&name, "");
    let name = name.replace(' ', "_");

    format!("{}_pixiv{}", name, member_id)
}

pub fn member_url(member_id: u64) -> String {
    format!("{}{}", MEMBER_URL, member_id)
}

pub fn illust_url(illust_id: u64, mode: &str) -> String {
    format!("{}?mode={}&illust_id={}", ILLUST_URL, mode, illust_id)
}
