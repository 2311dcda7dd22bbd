//! OCI region names and their short keys
//!
//! OCIDs embed either the short region key (`iad`) or the full region name
//! (`us-ashburn-1`) in their region segment.

/// (region key, region name)
const REGIONS: &[(&str, &str)] = &[
    ("iad", "us-ashburn-1"),
    ("phx", "us-phoenix-1"),
    ("sjc", "us-sanjose-1"),
    ("ord", "us-chicago-1"),
    ("yyz", "ca-toronto-1"),
    ("yul", "ca-montreal-1"),
    ("gru", "sa-saopaulo-1"),
    ("vcp", "sa-vinhedo-1"),
    ("scl", "sa-santiago-1"),
    ("lhr", "uk-london-1"),
    ("cwl", "uk-cardiff-1"),
    ("fra", "eu-frankfurt-1"),
    ("ams", "eu-amsterdam-1"),
    ("zrh", "eu-zurich-1"),
    ("mad", "eu-madrid-1"),
    ("cdg", "eu-paris-1"),
    ("lin", "eu-milan-1"),
    ("arn", "eu-stockholm-1"),
    ("mrs", "eu-marseille-1"),
    ("jed", "me-jeddah-1"),
    ("dxb", "me-dubai-1"),
    ("auh", "me-abudhabi-1"),
    ("mtz", "il-jerusalem-1"),
    ("jnb", "af-johannesburg-1"),
    ("bom", "ap-mumbai-1"),
    ("hyd", "ap-hyderabad-1"),
    ("sin", "ap-singapore-1"),
    ("icn", "ap-seoul-1"),
    ("yny", "ap-chuncheon-1"),
    ("nrt", "ap-tokyo-1"),
    ("kix", "ap-osaka-1"),
    ("syd", "ap-sydney-1"),
    ("mel", "ap-melbourne-1"),
    ("qro", "mx-queretaro-1"),
];

/// Full region name for a short key
pub fn region_for_key(key: &str) -> Option<&'static str> {
    let key = key.to_ascii_lowercase();
    REGIONS.iter().find(|(k, _)| *k == key).map(|(_, name)| *name)
}

/// Short key for a full region name
pub fn key_for_region(region: &str) -> Option<&'static str> {
    REGIONS.iter().find(|(_, name)| *name == region).map(|(k, _)| *k)
}

/// Whether an OCID region segment designates `region`.
/// An empty segment marks a region-less resource and matches every region.
pub fn segment_matches_region(segment: &str, region: &str) -> bool {
    if segment.is_empty() || segment == region {
        return true;
    }
    match region_for_key(segment) {
        Some(name) => name == region,
        // Region missing from the table: a short key can't be checked, accept it
        None => key_for_region(region).is_none() && !segment.contains('-'),
    }
}
