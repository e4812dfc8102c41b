//! Embedding combiner: section texts in, one composite vector per profile out.
//!
//! Each section is encoded separately (all profiles' texts of that section in chunks),
//! then the four section vectors are summed with the fixed weights. Documents and
//! queries share this path; a query is a batch of one.

use crate::retrieval::encoder::{check_batch, Encoder, EncoderError};
use crate::retrieval::sections::{Section, SectionTexts, SectionWeights};

pub const ENCODE_CHUNK_SIZE: usize = 32;

/// Vectors for a batch of profiles, row `i` belonging to input `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedBatch {
    pub dimension: usize,
    pub skills: Vec<Vec<f32>>,
    pub experience: Vec<Vec<f32>>,
    pub education: Vec<Vec<f32>>,
    pub summary: Vec<Vec<f32>>,
    pub composite: Vec<Vec<f32>>,
}

impl EmbeddedBatch {
    fn empty() -> Self {
        Self {
            dimension: 0,
            skills: Vec::new(),
            experience: Vec::new(),
            education: Vec::new(),
            summary: Vec::new(),
            composite: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.composite.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composite.is_empty()
    }

    pub fn section(&self, section: Section) -> &[Vec<f32>] {
        match section {
            Section::Skills => &self.skills,
            Section::Experience => &self.experience,
            Section::Education => &self.education,
            Section::Summary => &self.summary,
        }
    }
}

/// Encodes every section of every profile and builds the composites.
///
/// Any encoder failure fails the whole batch; no partial vectors are returned.
pub async fn embed_batch(
    encoder: &dyn Encoder,
    batch: &[SectionTexts],
    weights: &SectionWeights,
) -> Result<EmbeddedBatch, EncoderError> {
    if batch.is_empty() {
        return Ok(EmbeddedBatch::empty());
    }

    let mut dimension: Option<usize> = None;
    let mut per_section: Vec<Vec<Vec<f32>>> = Vec::with_capacity(Section::ALL.len());

    for section in Section::ALL {
        let texts: Vec<String> = batch.iter().map(|s| s.get(section).to_string()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(ENCODE_CHUNK_SIZE) {
            let encoded = encoder.encode(chunk).await?;
            dimension = Some(check_batch(chunk.len(), &encoded, dimension)?);
            vectors.extend(encoded);
        }
        per_section.push(vectors);
    }

    let dimension = dimension.unwrap_or(0);
    let composite = (0..batch.len())
        .map(|row| {
            let mut acc = vec![0.0f32; dimension];
            for (section, vectors) in Section::ALL.iter().zip(per_section.iter()) {
                let weight = weights.get(*section);
                for (a, v) in acc.iter_mut().zip(vectors[row].iter()) {
                    *a += v * weight;
                }
            }
            acc
        })
        .collect();

    let mut sections = per_section.into_iter();
    Ok(EmbeddedBatch {
        dimension,
        skills: sections.next().unwrap_or_default(),
        experience: sections.next().unwrap_or_default(),
        education: sections.next().unwrap_or_default(),
        summary: sections.next().unwrap_or_default(),
        composite,
    })
}

/// Composite vector of a single set of section texts.
pub async fn embed_one(
    encoder: &dyn Encoder,
    sections: &SectionTexts,
    weights: &SectionWeights,
) -> Result<Vec<f32>, EncoderError> {
    let batch = embed_batch(encoder, std::slice::from_ref(sections), weights).await?;
    Ok(batch.composite.into_iter().next().unwrap_or_default())
}
