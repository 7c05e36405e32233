//! Member name formatting and link helpers.

pub mod aliases;
pub mod format;

pub use aliases::MemberAliases;
pub use format::{fmt_member_tag, illust_url, member_url, DEFAULT_ILLUST_MODE};
