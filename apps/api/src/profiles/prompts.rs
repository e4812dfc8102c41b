// Prompts for profile extraction and candidate assessment.

use crate::llm_client::prompts::{clip, JSON_ONLY_INSTRUCTION, NO_INVENTION_INSTRUCTION};
use crate::models::profile::Profile;

const QUERY_PROMPT_CHARS: usize = 200;
const LIST_PROMPT_ITEMS: usize = 8;

/// Free-text CV → profile JSON.
pub fn extraction_prompt(cv_text: &str) -> String {
    format!(
        r#"Sei un assistente che estrae informazioni da CV in formato JSON.

TESTO CV:
{cv_text}

Estrai le seguenti informazioni con questa struttura:

{{
  "name": "Nome Cognome completo",
  "title": "Ruolo/Job Title principale",
  "summary": "Breve summary professionale (2-3 frasi)",
  "skills": ["skill1", "skill2"],
  "technologies": ["tech1", "tech2"],
  "experience": [
    {{
      "company": "Nome azienda",
      "period": "YYYY-YYYY o YYYY-present",
      "description": "Descrizione ruolo/progetto"
    }}
  ],
  "education": {{
    "degree": "Titolo di studio",
    "program": "Corso di laurea",
    "institution": "Università",
    "year": 2020
  }},
  "certifications": ["Cert1", "Cert2"]
}}

REGOLE:
1. {NO_INVENTION_INSTRUCTION}
2. Per skills: competenze (anche soft skill); per technologies: solo tecnologie e tool specifici (Python, AWS, Docker).
3. Per experience: se mancano le date usa "N/A", descrizione dettagliata.
4. {JSON_ONLY_INSTRUCTION}

JSON:"#
    )
}

/// One retrieved candidate against the search text.
pub fn assessment_prompt(profile: &Profile, query: &str, similarity: f32) -> String {
    let or_na = |s: &str| if s.trim().is_empty() { "N/A".to_string() } else { s.to_string() };
    let first = |items: &[String]| {
        items
            .iter()
            .take(LIST_PROMPT_ITEMS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"Analizza questo CV per la gara.

GARA: {query}

CV:
- Nome: {name}
- Ruolo: {title}
- Skills: {skills}
- Tech: {technologies}
- Score: {similarity:.2}

Fornisci (max 200 parole):
1. VALUTAZIONE: <punteggio 0-100>
2. PUNTI FORZA: <2-3 bullet points>
3. GAP: <eventuali lacune>
4. ESITO: IDONEO/DA_VALUTARE/NON_IDONEO

Rispondi in italiano, formato chiaro."#,
        query = clip(query, QUERY_PROMPT_CHARS),
        name = or_na(&profile.name),
        title = or_na(&profile.title),
        skills = first(&profile.skills),
        technologies = first(&profile.technologies),
    )
}
