//! Display names and tag parsing for ROM file names.

use once_cell::sync::Lazy;
use regex::Regex;

static ALL_EXTENSIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\.[A-Za-z0-9]+)+$").expect("invalid extension regex"));
static BRACKET_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.*?\]").expect("invalid bracket regex"));
static PAREN_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.*?\)").expect("invalid paren regex"));
static COLON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*:\s*").expect("invalid colon regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));
static TRAILING_THE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i),\s*the$").expect("invalid article regex"));

// Disc-tagged entries are reached through a playlist, never on their own.
static CONTINUATION_DISC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\((?:Disc|Disk) \d+").expect("invalid disc regex"));

static REGION_SINGLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Za-z]+)\)").expect("invalid region regex"));
static REGION_DOUBLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Za-z]+), ([A-Za-z]+)\)").expect("invalid region regex"));

// Whitelist, since a title can itself contain parentheses.
const NO_INTRO_REGIONS: &[&str] = &[
    "Asia",
    "Australia",
    "Brazil",
    "Canada",
    "China",
    "Denmark",
    "Europe",
    "France",
    "Germany",
    "Greece",
    "Hong Kong",
    "Italy",
    "Japan",
    "Korea",
    "Mexico",
    "Netherlands",
    "Norway",
    "Poland",
    "Russia",
    "Spain",
    "Sweden",
    "Taiwan",
    "UK",
    "USA",
    "World",
];

// GoodTools codes mapped onto No-Intro names.
const GOODTOOLS_REGIONS: &[(&str, &str)] = &[
    ("A", "Australia"),
    ("As", "Asia"),
    ("B", "Brazil"),
    ("C", "Canada"),
    ("Ch", "China"),
    ("D", "Netherlands"),
    ("E", "Europe"),
    ("F", "France"),
    ("G", "Germany"),
    ("Gr", "Greece"),
    ("HK", "Hong Kong"),
    ("I", "Italy"),
    ("J", "Japan"),
    ("K", "Korea"),
    ("M", "Mexico"),
    ("Nl", "Netherlands"),
    ("No", "Norway"),
    ("R", "Russia"),
    ("S", "Spain"),
    ("Sw", "Sweden"),
    ("UK", "UK"),
    ("U", "USA"),
    ("W", "World"),
];

/// Remove every trailing `.ext` segment from a file name.
pub fn strip_all_extensions(name: &str) -> String {
    ALL_EXTENSIONS_RE.replace(name, "").into_owned()
}

/// Normalise a raw file or folder stem into a display title.
pub fn normalize_game_name(raw: &str) -> String {
    let name = raw.replace('_', " ").replace('.', " ").replace('’', "'");
    let name = BRACKET_TAG_RE.replace_all(&name, "");
    let name = PAREN_TAG_RE.replace_all(&name, "");
    let name = COLON_RE.replace_all(&name, ": ");
    let name = WHITESPACE_RE.replace_all(&name, " ");
    let name = name.trim();

    if TRAILING_THE_RE.is_match(name) {
        let stem = TRAILING_THE_RE.replace(name, "");
        return format!("The {}", stem.trim());
    }
    name.to_string()
}

/// Display title for a file or bundle directory name.
pub fn game_name_from_file_name(file_name: &str) -> String {
    normalize_game_name(&strip_all_extensions(file_name))
}

/// True for names carrying a disc tag, e.g. `Game (Disc 2).bin`.
pub fn is_continuation_disc(name: &str) -> bool {
    CONTINUATION_DISC_RE.is_match(name)
}

/// Best-effort region list from No-Intro or GoodTools tags in a ROM name.
pub fn guess_regions(name: &str) -> Vec<String> {
    let mut regions = Vec::new();

    if let Some(caps) = REGION_DOUBLE_RE.captures(name) {
        for group in [1, 2] {
            if let Some(region) = caps.get(group).and_then(|m| lookup_region(m.as_str())) {
                regions.push(region.to_string());
            }
        }
    }

    if regions.is_empty() {
        if let Some(region) = REGION_SINGLE_RE
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| lookup_region(m.as_str()))
        {
            regions.push(region.to_string());
        }
    }

    regions
}

fn lookup_region(tag: &str) -> Option<&'static str> {
    if let Some(region) = NO_INTRO_REGIONS.iter().find(|region| **region == tag) {
        return Some(region);
    }
    GOODTOOLS_REGIONS
        .iter()
        .find(|(code, _)| *code == tag)
        .map(|(_, region)| *region)
}
