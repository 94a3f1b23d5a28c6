//! Regional numbering plan checks
//!
//! International numbers (`+CC…`) are matched against the country code's
//! plan; national numbers need a region, taken from the caller's location hint
//! or the extracted location. Without a region a national number must fit
//! one of the supported plans.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Nanp,
    Uk,
    De,
    Fr,
    Au,
    In,
    Br,
}

impl Region {
    const ALL: [Region; 7] = [
        Region::Nanp,
        Region::Uk,
        Region::De,
        Region::Fr,
        Region::Au,
        Region::In,
        Region::Br,
    ];

    fn country_code(self) -> &'static str {
        match self {
            Self::Nanp => "1",
            Self::Uk => "44",
            Self::De => "49",
            Self::Fr => "33",
            Self::Au => "61",
            Self::In => "91",
            Self::Br => "55",
        }
    }

    /// National significant number pattern (no country code, no trunk prefix)
    fn nsn_pattern(self) -> &'static Regex {
        static NANP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[2-9]\d{2}[2-9]\d{6}$").expect("valid regex"));
        static UK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{8,9}$").expect("valid regex"));
        static DE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{5,12}$").expect("valid regex"));
        static FR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{8}$").expect("valid regex"));
        static AU: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[2-478]\d{8}$").expect("valid regex"));
        static IN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{9}$").expect("valid regex"));
        static BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]{2}\d{8,9}$").expect("valid regex"));
        match self {
            Self::Nanp => &NANP,
            Self::Uk => &UK,
            Self::De => &DE,
            Self::Fr => &FR,
            Self::Au => &AU,
            Self::In => &IN,
            Self::Br => &BR,
        }
    }

    /// Whether `digits` written nationally (trunk prefix allowed) fits this plan
    fn matches_national(self, digits: &str) -> bool {
        let nsn = match self {
            Self::Nanp => digits.strip_prefix('1').filter(|d| d.len() == 10).unwrap_or(digits),
            Self::In | Self::Br => digits.strip_prefix('0').unwrap_or(digits),
            _ => match digits.strip_prefix('0') {
                Some(rest) => rest,
                None => return false,
            },
        };
        self.nsn_pattern().is_match(nsn)
    }

    /// Region named by a free-text location ("Austin, TX, US", "Berlin, Germany")
    pub fn from_location(location: &str) -> Option<Region> {
        let lower = location.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let has = |word: &str| tokens.contains(&word);
        let has_phrase = |phrase: &str| lower.contains(phrase);

        if has("us") || has("usa") || has_phrase("united states") || has("canada") {
            Some(Region::Nanp)
        } else if has("uk") || has("gb") || has_phrase("united kingdom") || has("england") || has("scotland") || has("wales") {
            Some(Region::Uk)
        } else if has("germany") || has("deutschland") || has("de") {
            Some(Region::De)
        } else if has("france") || has("fr") {
            Some(Region::Fr)
        } else if has("australia") || has("au") {
            Some(Region::Au)
        } else if has("india") {
            Some(Region::In)
        } else if has("brazil") || has("brasil") || has("br") {
            Some(Region::Br)
        } else {
            None
        }
    }
}

/// Country codes accepted for numbers outside the supported regional plans
const OTHER_COUNTRY_CODES: &[&str] = &[
    "7", "20", "27", "30", "31", "32", "34", "36", "39", "40", "41", "43", "45", "46", "47", "48", "51",
    "52", "53", "54", "56", "57", "58", "60", "62", "63", "64", "65", "66", "81", "82", "84", "86", "90",
    "92", "94", "212", "213", "216", "234", "254", "351", "352", "353", "354", "358", "359", "370",
    "371", "372", "380", "420", "421", "852", "886", "966", "971", "972",
];

/// Digits of a phone number with formatting removed; `None` if anything else is present
fn digits_of(raw: &str) -> Option<(bool, String)> {
    let trimmed = raw.trim();
    let (international, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' | '/' | '\u{a0}' => {}
            _ => return None,
        }
    }
    if digits.is_empty() {
        None
    } else {
        Some((international, digits))
    }
}

/// Whether `raw` is a dialable number in a recognised numbering plan
pub fn matches_numbering_plan(raw: &str, region: Option<Region>) -> bool {
    let Some((international, digits)) = digits_of(raw) else {
        return false;
    };
    if digits.len() > 15 {
        return false;
    }

    if international {
        for plan in Region::ALL {
            if let Some(nsn) = digits.strip_prefix(plan.country_code()) {
                // "+44 (0)20 …" keeps the trunk zero in print
                let nsn = nsn.strip_prefix('0').filter(|_| plan != Region::Nanp).unwrap_or(nsn);
                if plan.nsn_pattern().is_match(nsn) {
                    return true;
                }
            }
        }
        return OTHER_COUNTRY_CODES.iter().any(|cc| {
            digits
                .strip_prefix(cc)
                .map(|nsn| (4..=14).contains(&nsn.len()) && !nsn.starts_with('0'))
                .unwrap_or(false)
        });
    }

    match region {
        Some(region) => region.matches_national(&digits),
        None => Region::ALL.iter().any(|r| r.matches_national(&digits)),
    }
}
