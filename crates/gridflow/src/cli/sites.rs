//! Grid site tables.
//!
//! Known storage endpoints and submission CEs per site. The `-C`/`-P`
//! options bypass these tables for one-off endpoints.

/// Storage sites and their access URIs.
pub const STORAGE_SITES: &[(&str, &str)] = &[
    (
        "LNF",
        "root://atlasse.lnf.infn.it//dpm/lnf.infn.it/home/vo.padme.org",
    ),
    (
        "LNF2",
        "root://atlasse.lnf.infn.it//dpm/lnf.infn.it/home/vo.padme.org_scratch",
    ),
    (
        "CNAF",
        "srm://storm-fe-archive.cr.cnaf.infn.it:8444/srm/managerv2?SFN=/padmeTape",
    ),
    (
        "CNAF2",
        "srm://storm-fe-archive.cr.cnaf.infn.it:8444/srm/managerv2?SFN=/padme",
    ),
];

/// Submission sites and their default CE endpoints.
pub const SUBMISSION_SITES: &[(&str, &[&str])] = &[
    ("LNF", &["atlasce3.lnf.infn.it:9619"]),
    (
        "CNAF",
        &[
            "ce01-htc.cr.cnaf.infn.it:9619",
            "ce02-htc.cr.cnaf.infn.it:9619",
            "ce03-htc.cr.cnaf.infn.it:9619",
            "ce04-htc.cr.cnaf.infn.it:9619",
        ],
    ),
];

pub fn storage_uri(site: &str) -> Option<&'static str> {
    STORAGE_SITES
        .iter()
        .find(|(name, _)| *name == site)
        .map(|(_, uri)| *uri)
}

pub fn site_ces(site: &str) -> Option<&'static [&'static str]> {
    SUBMISSION_SITES
        .iter()
        .find(|(name, _)| *name == site)
        .map(|(_, ces)| *ces)
}

pub fn storage_site_names() -> Vec<&'static str> {
    STORAGE_SITES.iter().map(|(name, _)| *name).collect()
}

pub fn submission_site_names() -> Vec<&'static str> {
    SUBMISSION_SITES.iter().map(|(name, _)| *name).collect()
}

/// Every known CE endpoint, for site-wide reporting.
pub fn all_ces() -> Vec<&'static str> {
    SUBMISSION_SITES
        .iter()
        .flat_map(|(_, ces)| ces.iter().copied())
        .collect()
}
