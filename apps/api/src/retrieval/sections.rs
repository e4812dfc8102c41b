//! Section composer: maps a profile into the four weighted text blocks that get embedded.
//!
//! Documents and queries both go through [`compose_sections`]; keeping a single composer
//! is what keeps query and document composites in the same embedding space.

use serde::{Deserialize, Serialize};

use crate::models::profile::Profile;

/// Summary text beyond this many characters is dropped before embedding.
pub const SUMMARY_CHAR_BUDGET: usize = 150;

pub const NO_SKILLS: &str = "Nessuna competenza specificata";
pub const NO_EXPERIENCE: &str = "Nessuna esperienza specificata";
pub const NO_EDUCATION: &str = "Nessuna formazione specificata";
pub const NO_SUMMARY: &str = "Nessun sommario";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Skills,
    Experience,
    Education,
    Summary,
}

impl Section {
    /// Fixed order used for encoding, accumulation and cache file naming.
    pub const ALL: [Section; 4] = [
        Section::Skills,
        Section::Experience,
        Section::Education,
        Section::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Section::Skills => "skills",
            Section::Experience => "experience",
            Section::Education => "education",
            Section::Summary => "summary",
        }
    }
}

/// Per-section weights of the composite vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionWeights {
    pub skills: f32,
    pub experience: f32,
    pub education: f32,
    pub summary: f32,
}

/// skills 40%, experience 40%, education 15%, summary 5%.
pub const SECTION_WEIGHTS: SectionWeights = SectionWeights {
    skills: 0.40,
    experience: 0.40,
    education: 0.15,
    summary: 0.05,
};

impl Default for SectionWeights {
    fn default() -> Self {
        SECTION_WEIGHTS
    }
}

impl SectionWeights {
    pub fn get(&self, section: Section) -> f32 {
        match section {
            Section::Skills => self.skills,
            Section::Experience => self.experience,
            Section::Education => self.education,
            Section::Summary => self.summary,
        }
    }

    #[cfg(test)]
    pub fn total(&self) -> f32 {
        Section::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// The four composed texts of one profile. Every field is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTexts {
    pub skills: String,
    pub experience: String,
    pub education: String,
    pub summary: String,
}

impl SectionTexts {
    pub fn get(&self, section: Section) -> &str {
        match section {
            Section::Skills => &self.skills,
            Section::Experience => &self.experience,
            Section::Education => &self.education,
            Section::Summary => &self.summary,
        }
    }

    /// Space-joined texts in section order, kept in the cache for inspection.
    pub fn joined(&self) -> String {
        Section::ALL
            .iter()
            .map(|s| self.get(*s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn compose_sections(profile: &Profile) -> SectionTexts {
    SectionTexts {
        skills: compose_skills(profile),
        experience: compose_experience(profile),
        education: compose_education(profile),
        summary: compose_summary(profile),
    }
}

fn compose_skills(profile: &Profile) -> String {
    let mut parts = Vec::new();
    let skills = non_blank(&profile.skills);
    if !skills.is_empty() {
        parts.push(format!("Competenze tecniche: {}", skills.join(", ")));
    }
    let technologies = non_blank(&profile.technologies);
    if !technologies.is_empty() {
        parts.push(format!("Tecnologie: {}", technologies.join(", ")));
    }
    join_or(parts, NO_SKILLS)
}

fn compose_experience(profile: &Profile) -> String {
    let parts = profile
        .experience
        .iter()
        .filter(|e| !(is_blank(&e.company) && is_blank(&e.period) && is_blank(&e.description)))
        .map(|e| {
            let mut text = if is_blank(&e.company) {
                "Esperienza".to_string()
            } else {
                format!("Esperienza presso {}", e.company.trim())
            };
            if !is_blank(&e.period) {
                text.push_str(&format!(" ({})", e.period.trim()));
            }
            if !is_blank(&e.description) {
                text.push_str(&format!(": {}", e.description.trim()));
            }
            text
        })
        .collect();
    join_or(parts, NO_EXPERIENCE)
}

fn compose_education(profile: &Profile) -> String {
    let mut parts = Vec::new();
    let education = &profile.education;
    if !is_blank(&education.degree) {
        let mut text = format!("Formazione: {}", education.degree.trim());
        if !is_blank(&education.program) {
            text.push_str(&format!(" in {}", education.program.trim()));
        }
        if let Some(year) = education.year {
            text.push_str(&format!(" ({year})"));
        }
        parts.push(text);
    }
    let certifications = non_blank(&profile.certifications);
    if !certifications.is_empty() {
        parts.push(format!("Certificazioni: {}", certifications.join(", ")));
    }
    join_or(parts, NO_EDUCATION)
}

fn compose_summary(profile: &Profile) -> String {
    let mut parts = Vec::new();
    if !is_blank(&profile.name) {
        parts.push(format!("Nome: {}", profile.name.trim()));
    }
    if !is_blank(&profile.title) {
        parts.push(format!("Ruolo: {}", profile.title.trim()));
    }
    if !is_blank(&profile.summary) {
        let truncated: String = profile.summary.trim().chars().take(SUMMARY_CHAR_BUDGET).collect();
        parts.push(format!("Profilo: {truncated}"));
    }
    join_or(parts, NO_SUMMARY)
}

fn join_or(parts: Vec<String>, placeholder: &str) -> String {
    if parts.is_empty() {
        placeholder.to_string()
    } else {
        parts.join(". ")
    }
}

fn non_blank(items: &[String]) -> Vec<&str> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
