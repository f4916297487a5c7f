use std::sync::LazyLock;

use regex::Regex;

/// Known staffing agencies: display name and the pattern that finds it.
static AGENCIES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Robert Half", r"robert\s+half"),
        ("Randstad", r"randstad"),
        ("Adecco", r"adecco"),
        ("ManpowerGroup", r"manpower(?:\s*group)?"),
        ("Kelly Services", r"kelly\s+services"),
        ("Aerotek", r"aerotek"),
        ("TEKsystems", r"tek\s*systems"),
        ("Insight Global", r"insight\s+global"),
        ("Hays", r"hays(?:\s+recruitment|\s+specialist)?"),
        ("Michael Page", r"michael\s+page|page\s+personnel"),
        ("Kforce", r"kforce"),
        ("Allegis Group", r"allegis"),
        ("Spherion", r"spherion"),
        ("Express Employment Professionals", r"express\s+employment"),
        ("Apex Systems", r"apex\s+systems"),
        ("CyberCoders", r"cyber\s*coders"),
        ("Akkodis", r"akkodis|modis"),
        ("Harvey Nash", r"harvey\s+nash"),
        ("Beacon Hill", r"beacon\s+hill\s+staffing"),
        ("Collabera", r"collabera"),
        ("Motion Recruitment", r"motion\s+recruitment"),
        ("Vaco", r"vaco"),
        ("Creative Circle", r"creative\s+circle"),
        ("Staffmark", r"staffmark"),
        ("Jobot", r"jobot"),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        let re = Regex::new(&format!(r"(?i)\b(?:{pattern})\b")).expect("agency pattern is valid");
        (name, re)
    })
    .collect()
});

/// Generic staffing words in a company name.
static STAFFING_COMPANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:staffing|recruitment|recruiting|recruiters|talent\s+solutions|search\s+partners|headhunters?|personnel\s+services|employment\s+agency)\b",
    )
    .expect("valid regex")
});

/// Phrases an agency uses when posting for someone else.
static THIRD_PARTY_POSTING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:on\s+behalf\s+of\s+(?:our|a)\s+client|our\s+client\s+is|recruitment\s+agency|recruiting\s+firm|staffing\s+agency|staffing\s+firm|executive\s+search\s+firm)\b",
    )
    .expect("valid regex")
});

/// Agency behind a posting, if it looks like one. Never used to exclude.
///
/// Returns the agency's canonical name when a known one is mentioned,
/// otherwise the company name when it or the text reads like an agency.
pub fn detect_recruiter(company: &str, title: &str, excerpt: &str) -> Option<String> {
    for text in [company, title, excerpt] {
        if let Some((name, _)) = AGENCIES.iter().find(|(_, re)| re.is_match(text)) {
            return Some((*name).to_string());
        }
    }

    let company = company.trim();
    let agency_like = STAFFING_COMPANY.is_match(company)
        || THIRD_PARTY_POSTING.is_match(title)
        || THIRD_PARTY_POSTING.is_match(excerpt);
    if agency_like && !company.is_empty() {
        return Some(company.to_string());
    }
    None
}
