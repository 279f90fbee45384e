//! Grounding context for the remote service
//!
//! The marketplace directory hands the session a read-only consultant catalog
//! at start. It is embedded, as JSON, in the system instruction of the setup
//! message so the remote assistant can answer questions about real experts.

use serde::Serialize;

/// One entry of the consultant catalog. Supplied by the directory collaborator;
/// never mutated by the session.
#[derive(Debug, Clone, Serialize)]
pub struct Consultant {
    pub id: String,
    pub name: String,
    pub title: String,
    pub category: String,
    pub languages: Vec<String>,
    pub bio: String,
    pub rate: f64,
}

/// Ordered, immutable consultant catalog passed once at session start.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ConsultantContext {
    consultants: Vec<Consultant>,
}

impl ConsultantContext {
    pub fn new(consultants: Vec<Consultant>) -> Self {
        Self { consultants }
    }

    pub fn len(&self) -> usize {
        self.consultants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consultants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Consultant> {
        self.consultants.iter()
    }

    /// Build the system instruction grounding the assistant in the catalog.
    pub fn system_instruction(&self) -> String {
        let catalog = serde_json::to_string(&self.consultants).unwrap_or_else(|_| "[]".to_string());
        format!(
            "You are the Tattaunawa360 Voice Assistant. \
             Your goal is to help users find the perfect expert consultant by voice. \
             Speak naturally, concisely, and helpfully.\n\n\
             Here is the list of available verified consultants:\n{catalog}\n\n\
             If asked about specific experts, use the provided list. \
             If the user speaks another language (French, Hausa, Arabic, Spanish), reply in that language."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> ConsultantContext {
        ConsultantContext::new(vec![
            Consultant {
                id: "c-1".into(),
                name: "Amina Bello".into(),
                title: "Cardiologist".into(),
                category: "Health & Medicine".into(),
                languages: vec!["English".into(), "Hausa".into()],
                bio: "20 years of clinical practice.".into(),
                rate: 120.0,
            },
            Consultant {
                id: "c-2".into(),
                name: "Kwame Mensah".into(),
                title: "Solutions Architect".into(),
                category: "Programming & Tech".into(),
                languages: vec!["English".into(), "French".into()],
                bio: "Distributed systems and cloud migrations.".into(),
                rate: 95.0,
            },
        ])
    }

    #[test]
    fn instruction_embeds_catalog() {
        let ctx = sample_context();
        let instruction = ctx.system_instruction();
        assert!(instruction.contains("Amina Bello"));
        assert!(instruction.contains("Kwame Mensah"));
        assert!(instruction.contains("\"rate\":120.0") || instruction.contains("\"rate\":120"));
        assert!(instruction.contains("Voice Assistant"));
    }

    #[test]
    fn empty_catalog_still_builds() {
        let ctx = ConsultantContext::default();
        assert!(ctx.is_empty());
        let instruction = ctx.system_instruction();
        assert!(instruction.contains("[]"));
    }
}
