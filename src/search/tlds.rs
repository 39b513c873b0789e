//! Static top-level-domain table.
//!
//! A point-in-time snapshot of registry data from the IANA root zone,
//! restricted to TLDs commonly seen in dependency and infrastructure
//! hostnames. Domain-class searches validate input TLDs against this
//! table and fan typo variations out across it.

/// Known top-level domains, lowercase.
pub static TLDS: &[&str] = &[
    "ai", "am", "app", "ar", "at", "au", "be", "bg", "biz", "blog", "br", "ca", "cat", "cc",
    "ch", "cl", "cloud", "club", "cn", "co", "com", "cz", "de", "dev", "digital", "dk", "ee",
    "email", "es", "eu", "fi", "fm", "fr", "gg", "gr", "hk", "hr", "hu", "id", "ie", "in",
    "info", "io", "is", "it", "jp", "kr", "life", "link", "live", "lt", "lu", "lv", "ly", "me",
    "mobi", "mx", "net", "network", "news", "nl", "no", "nz", "online", "org", "ph", "pl",
    "pm", "pro", "pt", "ro", "rs", "ru", "se", "sg", "sh", "si", "site", "sk", "so", "store",
    "systems", "tech", "tk", "to", "today", "tv", "tw", "ua", "uk", "us", "vc", "wiki", "work",
    "world", "ws", "xyz", "za", "zone",
];

/// True when `tld` is in the table.
#[must_use]
pub fn is_known_tld(tld: &str) -> bool {
    TLDS.binary_search(&tld).is_ok()
}
