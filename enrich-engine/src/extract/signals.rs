//! Static signal tables: industry keywords, technology signatures, employee bands

/// Industry label and the keywords that indicate it
pub const INDUSTRY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Software",
        &["software", "saas", "platform", "api", "developer", "cloud", "open source", "devops"],
    ),
    (
        "Financial Services",
        &["banking", "payments", "fintech", "lending", "insurance", "investment", "wealth management", "credit"],
    ),
    (
        "Healthcare",
        &["healthcare", "patient", "clinical", "medical", "hospital", "pharma", "telehealth", "diagnostic"],
    ),
    (
        "E-commerce",
        &["e-commerce", "ecommerce", "online store", "shop now", "checkout", "free shipping", "marketplace"],
    ),
    (
        "Education",
        &["education", "students", "learning", "courses", "curriculum", "university", "teachers", "e-learning"],
    ),
    (
        "Manufacturing",
        &["manufacturing", "factory", "industrial", "machinery", "production line", "fabrication", "assembly"],
    ),
    (
        "Marketing & Advertising",
        &["marketing", "advertising", "brand", "campaigns", "seo", "agency", "media buying"],
    ),
    (
        "Real Estate",
        &["real estate", "property", "properties", "mortgage", "realtor", "listings", "leasing"],
    ),
    (
        "Logistics",
        &["logistics", "shipping", "freight", "supply chain", "warehouse", "fulfillment", "delivery"],
    ),
    (
        "Cybersecurity",
        &["cybersecurity", "security", "threat", "firewall", "encryption", "zero trust", "vulnerability"],
    ),
    (
        "Consulting",
        &["consulting", "advisory", "consultants", "strategy", "transformation", "professional services"],
    ),
    (
        "Media & Entertainment",
        &["entertainment", "streaming", "music", "film", "publishing", "podcast", "gaming"],
    ),
    (
        "Telecommunications",
        &["telecommunications", "telecom", "broadband", "wireless", "5g", "fiber", "carrier"],
    ),
    (
        "Energy",
        &["energy", "solar", "renewable", "oil and gas", "utilities", "electricity", "wind power"],
    ),
    (
        "Hospitality",
        &["hotel", "hospitality", "restaurant", "resort", "travel", "booking", "guests"],
    ),
];

/// Minimum distinct keyword hits before an industry is inferred from page text
pub const MIN_INDUSTRY_HITS: usize = 2;

/// Infer an industry from free text; `None` when no industry has enough distinct hits
pub fn infer_industry(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let mut best: Option<(&'static str, usize)> = None;

    for (industry, keywords) in INDUSTRY_KEYWORDS {
        let hits = keywords
            .iter()
            .filter(|keyword| contains_word(&lower, keyword))
            .count();
        if hits < MIN_INDUSTRY_HITS {
            continue;
        }
        match best {
            Some((_, best_hits)) if best_hits >= hits => {}
            _ => best = Some((industry, hits)),
        }
    }

    best.map(|(industry, _)| industry)
}

/// `needle` appears in `haystack` delimited by non-alphanumerics
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.map(char::is_alphanumeric).unwrap_or(false)
            && !after.map(char::is_alphanumeric).unwrap_or(false)
    })
}

/// Technology name and substrings that reveal it in page markup or script URLs
pub const PAGE_TECH_SIGNATURES: &[(&str, &[&str])] = &[
    ("Google Analytics", &["google-analytics.com", "googletagmanager.com/gtag/js"]),
    ("Google Tag Manager", &["googletagmanager.com/gtm.js"]),
    ("HubSpot", &["js.hs-scripts.com", "js.hs-analytics.net", "js.hsforms.net"]),
    ("Segment", &["cdn.segment.com"]),
    ("Stripe", &["js.stripe.com"]),
    ("Intercom", &["widget.intercom.io", "js.intercomcdn.com"]),
    ("Hotjar", &["static.hotjar.com"]),
    ("Shopify", &["cdn.shopify.com"]),
    ("WordPress", &["/wp-content/", "/wp-includes/"]),
    ("Next.js", &["/_next/static/"]),
    ("React", &["react-dom", "react.production.min.js"]),
    ("Vue.js", &["vue.min.js", "vue.global.prod.js", "vue.runtime"]),
    ("jQuery", &["jquery.min.js", "jquery-"]),
    ("Zendesk", &["static.zdassets.com"]),
    ("Drift", &["js.driftt.com"]),
    ("Salesforce Pardot", &["pi.pardot.com"]),
    ("Marketo", &["munchkin.marketo.net"]),
    ("Webflow", &["assets.website-files.com", "webflow.js"]),
    ("Squarespace", &["static1.squarespace.com"]),
    ("Wix", &["static.wixstatic.com", "static.parastorage.com"]),
];

/// Technology name and substrings that reveal it in MX hosts or TXT records
pub const DNS_TECH_SIGNATURES: &[(&str, &[&str])] = &[
    ("Google Workspace", &["aspmx.l.google.com", "google-site-verification", "_spf.google.com"]),
    ("Microsoft 365", &["mail.protection.outlook.com", "spf.protection.outlook.com", "ms="]),
    ("Zoho Mail", &["mx.zoho.", "zoho-verification"]),
    ("Proofpoint", &["pphosted.com"]),
    ("Mimecast", &["mimecast.com"]),
    ("Salesforce", &["_spf.salesforce.com"]),
    ("HubSpot", &["hubspotemail.net", "hubspot-developer-verification"]),
    ("Mailchimp", &["servers.mcsv.net"]),
    ("SendGrid", &["sendgrid.net"]),
    ("Amazon SES", &["amazonses.com"]),
    ("Atlassian", &["atlassian-domain-verification"]),
    ("Facebook", &["facebook-domain-verification"]),
    ("Apple", &["apple-domain-verification"]),
    ("DocuSign", &["docusign="]),
    ("Stripe", &["stripe-verification"]),
];

/// Technologies whose signatures occur in any of `haystacks`, in table order
pub fn detect_technologies<'a, I>(signatures: &[(&'static str, &[&str])], haystacks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let lowered: Vec<String> = haystacks.into_iter().map(str::to_lowercase).collect();
    signatures
        .iter()
        .filter(|(_, patterns)| {
            patterns
                .iter()
                .any(|pattern| lowered.iter().any(|h| h.contains(pattern)))
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Standard employee bands (label, inclusive min, inclusive max)
pub const EMPLOYEE_BANDS: &[(&str, u64, u64)] = &[
    ("1-10", 1, 10),
    ("11-50", 11, 50),
    ("51-200", 51, 200),
    ("201-500", 201, 500),
    ("501-1000", 501, 1000),
    ("1001-5000", 1001, 5000),
    ("5001-10000", 5001, 10_000),
    ("10001+", 10_001, u64::MAX),
];

/// Band containing an exact headcount
pub fn band_for_count(count: u64) -> Option<&'static str> {
    EMPLOYEE_BANDS
        .iter()
        .find(|(_, min, max)| count >= *min && count <= *max)
        .map(|(label, _, _)| *label)
}

/// Canonical label for a band written as "51-200", "51 – 200", "10,001+" etc.
pub fn canonical_band(raw: &str) -> Option<&'static str> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| if c == '–' || c == '—' { '-' } else { c })
        .collect();

    if let Some(min) = cleaned.strip_suffix('+') {
        let min: u64 = min.parse().ok()?;
        return EMPLOYEE_BANDS
            .iter()
            .find(|(_, band_min, band_max)| *band_min == min && *band_max == u64::MAX)
            .map(|(label, _, _)| *label);
    }

    let (min, max) = cleaned.split_once('-')?;
    let (min, max): (u64, u64) = (min.parse().ok()?, max.parse().ok()?);
    EMPLOYEE_BANDS
        .iter()
        .find(|(_, band_min, band_max)| *band_min == min && *band_max == max)
        .map(|(label, _, _)| *label)
}

/// Inclusive bounds of a canonical band label
pub fn band_bounds(label: &str) -> Option<(u64, u64)> {
    EMPLOYEE_BANDS
        .iter()
        .find(|(band, _, _)| *band == label)
        .map(|(_, min, max)| (*min, *max))
}
