//! Slide-text heuristics: plain text of a one-slide CV into a profile.
//!
//! Every extractor scans the same line list. Sections are found by keyword containment,
//! captured until another section's keyword appears, and cleaned with regexes. The
//! result is best-effort: fields the heuristics cannot find stay empty.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::profile::{Education, Experience, Profile};

const NAME_SCAN_LINES: usize = 5;
const SUMMARY_MAX_LINES: usize = 5;
const EDUCATION_MAX_LINES: usize = 3;

const NAME_STOPWORDS: &[&str] = &["curriculum", "profilo", "competenze", "profile"];

const TITLE_KEYWORDS: &[&str] = &["job title", "posizione", "position", "ruolo", "title", "role"];
const SUMMARY_KEYWORDS: &[&str] = &[
    "presentazione",
    "descrizione",
    "chi sono",
    "profilo",
    "profile",
    "summary",
    "about",
    "bio",
];
const SUMMARY_STOP: &[&str] = &[
    "competenze",
    "formazione",
    "esperienza",
    "certificazioni",
    "skills",
    "education",
    "experience",
];

const SKILL_KEYWORDS: &[&str] = &["competenze", "skills", "abilità", "capacità"];
const TECHNOLOGY_KEYWORDS: &[&str] = &["tecnologie", "technologies", "tech stack", "strumenti", "tools"];
const CERTIFICATION_KEYWORDS: &[&str] = &["certificazioni", "certifications", "certificati"];
const LIST_STOP: &[&str] = &[
    "formazione",
    "esperienza",
    "certificazioni",
    "competenze",
    "education",
    "experience",
    "certifications",
    "skills",
    "tecnologie",
];

const EDUCATION_KEYWORDS: &[&str] = &["formazione", "istruzione", "education", "laurea", "degree", "studi"];
const EDUCATION_STOP: &[&str] = &["esperienza", "competenze", "certificazioni", "experience", "skills"];

const EXPERIENCE_KEYWORDS: &[&str] = &["esperienza", "experience", "lavoro", "work", "carriera", "employment"];
const EXPERIENCE_STOP: &[&str] = &["formazione", "competenze", "certificazioni", "education", "skills"];

static NAME_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)").expect("valid regex"),
        Regex::new(r"(?:Nome|Name)[:\s]+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)").expect("valid regex"),
        Regex::new(r"([A-Z][A-Z\s]+)").expect("valid regex"),
    ]
});

static SENIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:senior|junior|lead|manager|developer|engineer|analyst|consultant|specialist)\b")
        .expect("valid regex")
});

static BULLET_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-•*\d.)]+\s*").expect("valid regex"));

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));

/// A year or a month name/abbreviation (Italian or English) as a whole word.
static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:19|20)\d{2}\b|\b(?:",
        r"gen|feb|mar|apr|mag|giu|lug|ago|set|ott|nov|dic|jan|may|jun|jul|aug|sep|oct|dec|",
        r"gennaio|febbraio|marzo|aprile|maggio|giugno|luglio|agosto|settembre|ottobre|novembre|dicembre|",
        r"january|february|march|april|june|july|august|september|october|november|december",
        r")\b"
    ))
    .expect("valid regex")
});

static DEGREE_PATTERNS: LazyLock<[Regex; 5]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)Laurea(?:\s+(?:Magistrale|Triennale))?(?:\s+in\s+[^,.\n]+)?").expect("valid regex"),
        Regex::new(r"(?i)Master(?:\s+of\s+Science|\s+in\s+[^,.\n]+)?").expect("valid regex"),
        Regex::new(r"(?i)Bachelor(?:\s+of\s+Science|\s+in\s+[^,.\n]+)?").expect("valid regex"),
        Regex::new(r"(?i)Diploma\s+[^,.\n]+").expect("valid regex"),
        Regex::new(r"(?i)(?:PhD|Dottorato)(?:\s+in\s+[^,.\n]+)?").expect("valid regex"),
    ]
});

static PROGRAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:in|corso)\s+([A-Z][^,.\n]{5,})").expect("valid regex"));

static PERIOD_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    const MONTH: &str = "(?:gen|feb|mar|apr|mag|giu|lug|ago|set|ott|nov|dic)";
    [
        Regex::new(r"\d{4}\s*[-–]\s*\d{4}").expect("valid regex"),
        Regex::new(r"(?i)\d{4}\s*[-–]\s*(?:Presente|Present|oggi|today)").expect("valid regex"),
        Regex::new(&format!(r"(?i){MONTH}\s+\d{{4}}\s*[-–]\s*{MONTH}\s+\d{{4}}")).expect("valid regex"),
    ]
});

/// Builds a profile from the text of a CV slide. Never fails.
pub fn parse_slide_text(text: &str) -> Profile {
    let lines: Vec<&str> = text.lines().collect();
    Profile {
        name: extract_name(&lines),
        title: extract_title(&lines),
        summary: extract_summary(&lines),
        skills: extract_list(&lines, SKILL_KEYWORDS),
        technologies: extract_list(&lines, TECHNOLOGY_KEYWORDS),
        education: extract_education(&lines),
        certifications: extract_list(&lines, CERTIFICATION_KEYWORDS),
        experience: extract_experience(&lines),
        ..Default::default()
    }
    .normalized()
}

/// Capitalizes the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn contains_any(line_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| line_lower.contains(kw))
}

/// Drops a leading section label ("Competenze:", "Ruolo -") from a line.
fn strip_label(line: &str, keywords: &[&str]) -> String {
    let trimmed = line.trim();
    let lower = trimmed.to_lowercase();
    for kw in keywords {
        if lower.starts_with(kw) && trimmed.is_char_boundary(kw.len()) {
            return trimmed[kw.len()..]
                .trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
                .trim()
                .to_string();
        }
    }
    trimmed.to_string()
}

fn extract_name(lines: &[&str]) -> String {
    for line in lines.iter().take(NAME_SCAN_LINES) {
        for pattern in NAME_PATTERNS.iter() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let name = caps[1].trim();
            let lower = name.to_lowercase();
            if name.split_whitespace().count() >= 2
                && name.chars().count() > 5
                && !contains_any(&lower, NAME_STOPWORDS)
            {
                return title_case(name);
            }
        }
    }
    String::new()
}

fn extract_title(lines: &[&str]) -> String {
    for (i, line) in lines.iter().enumerate() {
        let lower = line.trim().to_lowercase();
        if contains_any(&lower, TITLE_KEYWORDS) {
            let title = strip_label(line, TITLE_KEYWORDS);
            if !title.is_empty() {
                return title;
            }
            if let Some(next) = lines.get(i + 1) {
                return next.trim().to_string();
            }
        }
        if (1..NAME_SCAN_LINES).contains(&i) && SENIORITY.is_match(&lower) {
            return line.trim().to_string();
        }
    }
    String::new()
}

fn extract_summary(lines: &[&str]) -> String {
    let mut collected: Vec<String> = Vec::new();
    let mut capturing = false;

    for line in lines {
        let lower = line.trim().to_lowercase();
        if contains_any(&lower, SUMMARY_KEYWORDS) {
            capturing = true;
            let content = strip_label(line, SUMMARY_KEYWORDS);
            if content.chars().count() > 20 {
                collected.push(content);
            }
            continue;
        }
        if !capturing {
            continue;
        }
        if contains_any(&lower, SUMMARY_STOP) {
            break;
        }
        let trimmed = line.trim();
        if trimmed.chars().count() > 10 {
            collected.push(trimmed.to_string());
        }
        if collected.len() >= SUMMARY_MAX_LINES {
            break;
        }
    }
    collected.join(" ")
}

fn extract_list(lines: &[&str], keywords: &[&str]) -> Vec<String> {
    let mut items = Vec::new();
    let mut capturing = false;

    for line in lines {
        let lower = line.trim().to_lowercase();
        if contains_any(&lower, keywords) {
            capturing = true;
            let content = strip_label(line, keywords);
            if !content.is_empty() {
                items.extend(split_items(&content));
            }
            continue;
        }
        if !capturing {
            continue;
        }
        if contains_any(&lower, LIST_STOP) {
            break;
        }
        if line.trim().chars().count() > 1 {
            items.extend(split_items(line));
        }
    }

    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| item.chars().count() > 1 && seen.insert(item.to_lowercase()))
        .collect()
}

/// Splits one line on list separators, after dropping bullet marks.
fn split_items(text: &str) -> Vec<String> {
    let text = BULLET_PREFIX.replace(text.trim(), "");
    text.split([',', ';', '|', '–', '•'])
        .map(str::trim)
        .filter(|item| item.chars().count() > 1)
        .map(String::from)
        .collect()
}

fn extract_education(lines: &[&str]) -> Education {
    let mut collected: Vec<String> = Vec::new();
    let mut capturing = false;

    for line in lines {
        let lower = line.trim().to_lowercase();
        if contains_any(&lower, EDUCATION_KEYWORDS) {
            capturing = true;
            let content = strip_label(line, &["formazione", "istruzione", "education", "studi"]);
            if !content.is_empty() {
                collected.push(content);
            }
            continue;
        }
        if !capturing {
            continue;
        }
        if contains_any(&lower, EDUCATION_STOP) {
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            collected.push(trimmed.to_string());
        }
        if collected.len() >= EDUCATION_MAX_LINES {
            break;
        }
    }

    let full_text = collected.join(" ");
    let mut education = Education {
        year: YEAR
            .find(&full_text)
            .and_then(|m| m.as_str().parse().ok()),
        ..Default::default()
    };

    if let Some(degree) = DEGREE_PATTERNS.iter().find_map(|p| p.find(&full_text)) {
        education.degree = degree.as_str().trim().to_string();
    }

    if education.degree.is_empty() {
        if let Some(first) = collected.first() {
            education.program = first.clone();
        }
    } else if let Some(caps) = PROGRAM.captures(&full_text) {
        education.program = caps[1].trim().to_string();
    }

    education
}

fn extract_experience(lines: &[&str]) -> Vec<Experience> {
    let mut entries = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut capturing = false;

    for line in lines {
        let lower = line.trim().to_lowercase();
        if contains_any(&lower, EXPERIENCE_KEYWORDS) {
            capturing = true;
            continue;
        }
        if !capturing {
            continue;
        }
        if contains_any(&lower, EXPERIENCE_STOP) {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if DATE_TOKEN.is_match(&lower) && !current.is_empty() {
            entries.push(build_experience(&current));
            current.clear();
        }
        current.push(trimmed.to_string());
    }

    if !current.is_empty() {
        entries.push(build_experience(&current));
    }
    entries
}

/// First line is the company; the rest is the description.
fn build_experience(lines: &[String]) -> Experience {
    let full_text = lines.join(" ");
    let period = PERIOD_PATTERNS
        .iter()
        .find_map(|p| p.find(&full_text))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Experience {
        company: lines.first().cloned().unwrap_or_default(),
        period,
        description: lines.get(1..).map(|rest| rest.join(" ")).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = "\
MARIO ROSSI
Senior Data Engineer
Profilo: Ingegnere dei dati specializzato in piattaforme cloud da dieci anni
Competenze: Python, SQL; Spark
- Data modeling
Tecnologie
AWS | Azure | python
Certificazioni: AWS Solutions Architect, PMP
Formazione
Laurea Magistrale in Ingegneria Informatica, 2012
Esperienza
Accenture 2015 - 2020
Progettazione data lake per clienti bancari
Reply 2020 - Presente
Migrazione piattaforme on-premise";

    #[test]
    fn test_full_slide() {
        let profile = parse_slide_text(SLIDE);

        assert_eq!(profile.name, "Mario Rossi");
        assert_eq!(profile.title, "Senior Data Engineer");
        assert_eq!(profile.skills, vec!["Python", "SQL", "Spark", "Data modeling"]);
        assert_eq!(profile.technologies, vec!["AWS", "Azure", "python"]);
        assert_eq!(profile.certifications, vec!["AWS Solutions Architect", "PMP"]);
        assert_eq!(
            profile.education.degree,
            "Laurea Magistrale in Ingegneria Informatica"
        );
        assert_eq!(profile.education.year, Some(2012));
        assert_eq!(profile.education.program, "Ingegneria Informatica");

        assert_eq!(profile.experience.len(), 2);
        assert_eq!(profile.experience[0].company, "Accenture 2015 - 2020");
        assert_eq!(profile.experience[0].period, "2015 - 2020");
        assert_eq!(
            profile.experience[0].description,
            "Progettazione data lake per clienti bancari"
        );
        assert_eq!(profile.experience[1].period, "2020 - Presente");
    }

    #[test]
    fn test_summary_keeps_label_content() {
        let profile = parse_slide_text(SLIDE);
        assert_eq!(
            profile.summary,
            "Ingegnere dei dati specializzato in piattaforme cloud da dieci anni"
        );
    }

    #[test]
    fn test_name_from_label() {
        let profile = parse_slide_text("CURRICULUM VITAE\nNome: Giulia Bianchi\nAnalyst");
        assert_eq!(profile.name, "Giulia Bianchi");
    }

    #[test]
    fn test_title_on_following_line() {
        let profile = parse_slide_text("Anna Verdi\nRuolo:\nProject Manager");
        assert_eq!(profile.title, "Project Manager");
    }

    #[test]
    fn test_list_dedup_is_case_insensitive() {
        let profile = parse_slide_text("Skills: Java, java, JAVA, Go");
        assert_eq!(profile.skills, vec!["Java", "Go"]);
    }

    #[test]
    fn test_month_token_needs_word_boundary() {
        let text = "Esperienza\nMarketing Corp\nCampagne digitali\nsettembre 2019 nuova sede";
        let profile = parse_slide_text(text);
        assert_eq!(profile.experience.len(), 2);
        assert_eq!(profile.experience[0].company, "Marketing Corp");
        assert_eq!(profile.experience[0].description, "Campagne digitali");
    }

    #[test]
    fn test_education_without_degree_uses_first_line_as_program() {
        let profile = parse_slide_text("Formazione: Corso executive di data science");
        assert!(profile.education.degree.is_empty());
        assert_eq!(profile.education.program, "Corso executive di data science");
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(parse_slide_text(""), Profile::default());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("MARIO DE ROSSI"), "Mario De Rossi");
        assert_eq!(title_case("anna-maria d'amico"), "Anna-Maria D'Amico");
    }
}
