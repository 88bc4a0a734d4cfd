//! Audience-specific prompt assembly.
//!
//! Both prompts are composed from the same extraction record and retrieved
//! support, which is what keeps factual values consistent between the two
//! summaries: the generator is never shown audience-divergent facts.

use crate::pipeline::types::{Audience, ExtractionRecord, RetrievalUnit};
use std::fmt::Write as _;

/// Seed query embedded to rank supporting units for an audience.
pub(crate) fn seed_query(audience: Audience) -> &'static str {
    match audience {
        Audience::Doctor => "clinical dosage, diagnosis, and medication terminology",
        Audience::Patient => "plain-language medication instructions and advice",
    }
}

/// Build the generation prompt for one audience.
pub(crate) fn build_prompt(
    audience: Audience,
    record: &ExtractionRecord,
    retrieved: &[RetrievalUnit],
) -> String {
    let mut prompt = String::new();

    match audience {
        Audience::Doctor => {
            prompt.push_str(
                "You are a medical assistant helping doctors. Create a clinical summary of \
                 this prescription in the third person (\"This patient is...\"). Keep medical \
                 terminology and be precise about every dosage. Use numbered points, no \
                 markdown headers.\n",
            );
        }
        Audience::Patient => {
            prompt.push_str(
                "You are a medical assistant helping a patient understand their prescription. \
                 Write in the first person (\"You are...\") using simple, non-medical language; \
                 explain medical terms in brackets. State exactly what to take, how much, and \
                 when, keeping every number unchanged. Use numbered points, no markdown \
                 headers.\n",
            );
        }
    }

    prompt.push_str(
        "\nUse only the facts below. Do not invent medications, dosages, or diagnoses.\n",
    );

    prompt.push_str("\nExtracted prescription data:\n");
    for field in &record.fields {
        let _ = writeln!(prompt, "- {}: {}", field.name, field.value);
    }
    if let Some(notes) = record.raw_text.as_deref() {
        let _ = writeln!(prompt, "- notes: {notes}");
    }

    if !retrieved.is_empty() {
        prompt.push_str("\nSupporting context, most relevant first:\n");
        for unit in retrieved {
            let _ = writeln!(prompt, "[{}] {}", unit.unit_id, unit.text);
        }
    }

    prompt
}
