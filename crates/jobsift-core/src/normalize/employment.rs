use std::sync::LazyLock;

use regex::Regex;

use crate::models::EmploymentType;

/// Text rules, most specific first. First match wins.
static RULES: LazyLock<Vec<(EmploymentType, Regex)>> = LazyLock::new(|| {
    [
        (
            EmploymentType::Contract,
            r"\b(?:contract|contractor|freelance|freelancer|temporary|temp|fixed[- ]term|c2c|1099)\b",
        ),
        (
            EmploymentType::Internship,
            r"\b(?:intern|interns|internship|co-op|apprentice|apprenticeship|trainee)\b",
        ),
        (EmploymentType::PartTime, r"\bpart[- ]?time\b"),
        (
            EmploymentType::Seasonal,
            r"\b(?:seasonal|summer job|holiday season|winter season)\b",
        ),
        (EmploymentType::FullTime, r"\b(?:full[- ]?time|permanent)\b"),
    ]
    .into_iter()
    .map(|(ty, pattern)| {
        let re = Regex::new(&format!("(?i){pattern}")).expect("employment pattern is valid");
        (ty, re)
    })
    .collect()
});

/// Maps a structured employment string (`FULL_TIME`, `Part-time`, ...).
pub fn from_structured(raw: &str) -> Option<EmploymentType> {
    let key: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase();
    match key.as_str() {
        "FULLTIME" | "PERMANENT" => Some(EmploymentType::FullTime),
        "PARTTIME" => Some(EmploymentType::PartTime),
        "CONTRACT" | "CONTRACTOR" | "TEMPORARY" | "FREELANCE" => Some(EmploymentType::Contract),
        "INTERN" | "INTERNSHIP" => Some(EmploymentType::Internship),
        "SEASONAL" => Some(EmploymentType::Seasonal),
        _ => None,
    }
}

/// Structured field first, then the rule list over `text`.
pub fn classify_employment(structured: Option<&str>, text: &str) -> EmploymentType {
    if let Some(ty) = structured.and_then(from_structured) {
        return ty;
    }
    RULES
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(ty, _)| *ty)
        .unwrap_or_default()
}
