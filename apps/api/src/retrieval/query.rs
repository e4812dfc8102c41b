//! Query parser: tagged free text into a profile-shaped record.
//!
//! Grammar, one statement per line, case-insensitive:
//!
//! ```text
//! Skills: Python, SQL; Spark | Airflow
//! Ruolo = Data Engineer
//! any other line folds into the summary
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::models::profile::{dedup_ordered, Experience, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryField {
    Skills,
    Technologies,
    Certifications,
    Summary,
    Office,
    Level,
    Title,
    EducationDegree,
    ExperienceDescription,
}

const TAGS: &[(&str, QueryField)] = &[
    ("skills", QueryField::Skills),
    ("competenze", QueryField::Skills),
    ("technologies", QueryField::Technologies),
    ("tecnologie", QueryField::Technologies),
    ("tech", QueryField::Technologies),
    ("industry", QueryField::Summary),
    ("settore", QueryField::Summary),
    ("office", QueryField::Office),
    ("sede", QueryField::Office),
    ("level", QueryField::Level),
    ("livello", QueryField::Level),
    ("seniority", QueryField::Level),
    ("role", QueryField::Title),
    ("ruolo", QueryField::Title),
    ("title", QueryField::Title),
    ("titolo", QueryField::Title),
    ("certifications", QueryField::Certifications),
    ("certificazioni", QueryField::Certifications),
    ("education", QueryField::EducationDegree),
    ("formazione", QueryField::EducationDegree),
    ("experience", QueryField::ExperienceDescription),
    ("esperienza", QueryField::ExperienceDescription),
];

static TAGGED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = TAGS.iter().map(|(tag, _)| regex::escape(tag)).collect();
    Regex::new(&format!(r"(?i)^({})\s*[:=]\s*(.+)$", alternatives.join("|")))
        .expect("tag pattern is valid")
});

static LIST_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;|]").expect("separator pattern is valid"));

fn field_for(tag: &str) -> Option<QueryField> {
    let tag = tag.to_lowercase();
    TAGS.iter().find(|(t, _)| *t == tag).map(|(_, f)| *f)
}

fn split_list(value: &str) -> Vec<String> {
    LIST_SEPARATOR
        .split(value)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn append_summary(summary: &mut String, text: &str) {
    if summary.is_empty() {
        summary.push_str(text);
    } else {
        summary.push_str(" | ");
        summary.push_str(text);
    }
}

/// Parses a free-text query. Never fails: unrecognized lines become summary text.
pub fn parse_query(text: &str) -> Profile {
    let mut profile = Profile::default();
    let mut unmatched: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(caps) = TAGGED_LINE.captures(line) else {
            unmatched.push(line);
            continue;
        };
        let (Some(field), Some(value)) = (field_for(&caps[1]), caps.get(2)) else {
            unmatched.push(line);
            continue;
        };
        let value = value.as_str().trim();

        match field {
            QueryField::Skills => profile.skills.extend(split_list(value)),
            QueryField::Technologies => profile.technologies.extend(split_list(value)),
            QueryField::Certifications => profile.certifications.extend(split_list(value)),
            QueryField::Summary => append_summary(&mut profile.summary, value),
            QueryField::Office => profile.office = value.to_string(),
            QueryField::Level => profile.level = value.to_string(),
            QueryField::Title => profile.title = value.to_string(),
            QueryField::EducationDegree => profile.education.degree = value.to_string(),
            QueryField::ExperienceDescription => profile.experience.push(Experience {
                description: value.to_string(),
                ..Default::default()
            }),
        }
    }

    if !unmatched.is_empty() {
        append_summary(&mut profile.summary, &unmatched.join(" "));
    }

    profile.skills = dedup_ordered(profile.skills);
    profile.technologies = dedup_ordered(profile.technologies);
    profile.certifications = dedup_ordered(profile.certifications);
    profile
}
