//! Structured résumé record, as stored one-per-file in the profile folder.
//!
//! Producers are hand-written forms, LLM output and slide heuristics, so reading is
//! lenient: missing fields and JSON `null` both read as empty, and `education.year`
//! accepts either a number or a numeric string.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable", alias = "Office")]
    pub office: String,
    #[serde(default, deserialize_with = "nullable", alias = "Level")]
    pub level: String,
    #[serde(default, deserialize_with = "nullable")]
    pub summary: String,
    #[serde(default, deserialize_with = "nullable")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub technologies: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub education: Education,
    #[serde(default, deserialize_with = "nullable")]
    pub certifications: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub experience: Vec<Experience>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    #[serde(default, deserialize_with = "nullable")]
    pub degree: String,
    #[serde(default, deserialize_with = "nullable")]
    pub program: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub institution: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    #[serde(default, deserialize_with = "nullable")]
    pub company: String,
    #[serde(default, deserialize_with = "nullable")]
    pub period: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
}

impl Profile {
    /// Trims every string, drops empty list items and duplicate list items
    /// (first occurrence wins), and drops experience entries with no content.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.title = self.title.trim().to_string();
        self.office = self.office.trim().to_string();
        self.level = self.level.trim().to_string();
        self.summary = self.summary.trim().to_string();
        self.skills = dedup_ordered(self.skills);
        self.technologies = dedup_ordered(self.technologies);
        self.certifications = dedup_ordered(self.certifications);

        self.education.degree = self.education.degree.trim().to_string();
        self.education.program = self.education.program.trim().to_string();
        self.education.institution = self.education.institution.trim().to_string();

        self.experience = self
            .experience
            .into_iter()
            .map(|e| Experience {
                company: e.company.trim().to_string(),
                period: e.period.trim().to_string(),
                description: e.description.trim().to_string(),
            })
            .filter(|e| !(e.company.is_empty() && e.period.is_empty() && e.description.is_empty()))
            .collect();
        self
    }

    /// Display label used in rankings: the profile name, or the fallback when unnamed.
    pub fn label_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.name.trim().is_empty() {
            fallback
        } else {
            self.name.trim()
        }
    }
}

/// Removes blank and repeated items while keeping the original order.
pub fn dedup_ordered(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() || out.iter().any(|seen| seen == item) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .filter(|y| *y > 0),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i32>().ok().filter(|y| *y > 0),
        _ => None,
    })
}
