//! Role presets and the fixed prompt texts used by chat and the workflows.

use strsim::jaro_winkler;

/// A named behaviour preset.
#[derive(Clone, Debug, PartialEq)]
pub struct Role {
    pub name: &'static str,
    pub icon: &'static str,
    pub instruction: &'static str,
}

pub const DEFAULT_ROLE: &str = "General Assistant";

pub static ROLES: [Role; 5] = [
    Role {
        name: "General Assistant",
        icon: "🤖",
        instruction: "You are a helpful AI assistant. Be friendly, informative, and professional.",
    },
    Role {
        name: "Customer Service",
        icon: "📞",
        instruction: r#"You are a professional customer service representative. You should:
- Be polite, empathetic, and patient
- Focus on solving customer problems
- Ask clarifying questions when needed
- Offer alternatives and solutions
- Maintain a helpful and positive tone
- If you can't solve something, explain how to escalate"#,
    },
    Role {
        name: "Technical Support",
        icon: "⚙️",
        instruction: r#"You are a technical support specialist. You should:
- Provide clear, step-by-step technical solutions
- Ask about system specifications and error messages
- Suggest troubleshooting steps in logical order
- Explain technical concepts in simple terms
- Be patient with non-technical users"#,
    },
    Role {
        name: "Teacher/Tutor",
        icon: "📚",
        instruction: r#"You are an educational tutor. You should:
- Explain concepts clearly and simply
- Use examples and analogies to aid understanding
- Encourage learning and curiosity
- Break down complex topics into manageable parts
- Provide practice questions or exercises when appropriate"#,
    },
    Role {
        name: "Consultative Selling",
        icon: "💼",
        instruction: CONSULTATIVE_SELLING_PROMPT,
    },
];

/// Below this similarity a query does not select a role.
const MATCH_THRESHOLD: f64 = 0.85;

pub fn default_role() -> &'static Role {
    &ROLES[0]
}

/// Look a role up by name. Exact (case-insensitive) names win; otherwise the
/// closest name or name part above the similarity threshold is used.
pub fn find_role(query: &str) -> Option<&'static Role> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    if let Some(role) = ROLES.iter().find(|r| r.name.to_lowercase() == query) {
        return Some(role);
    }

    ROLES
        .iter()
        .map(|role| (role, similarity(role.name, &query)))
        .filter(|(_, score)| *score >= MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(role, _)| role)
}

fn similarity(name: &str, query: &str) -> f64 {
    let name = name.to_lowercase();
    // "Teacher/Tutor" answers to either half
    std::iter::once(name.as_str())
        .chain(name.split('/'))
        .map(|candidate| jaro_winkler(candidate, query))
        .fold(0.0, f64::max)
}

/// Assistant reply used to prime a fresh conversation.
pub const PRIMING_ACK: &str =
    "I understand. I'll act according to my role and use the knowledge base when relevant. How can I help you?";

/// The knowledge-base section appended to a role instruction.
pub fn knowledge_base_guidance(knowledge_base: &str) -> String {
    format!(
        r#"

IMPORTANT: You have access to the following knowledge base from uploaded documents. Use this information to answer questions when relevant:

{knowledge_base}

When answering questions, prioritize information from the knowledge base when applicable. If the answer is found in the uploaded documents, mention which document it came from."#
    )
}

pub const CONSULTATIVE_SELLING_PROMPT: &str = r#"You are a consultative selling assistant for enterprise connectivity. Answer concisely, make it actionable and grounded in data. Format results with the following blocks where relevant:

[Profile]
[Pain Points]
[90-Day Opportunity]
[Risks]
[Next Best Action]
[30-Second Talk Track]
[Data to Verify]
If the user uploads documents or photos, analyse them in context."#;

pub const TENDER_ANALYST_PROMPT: &str =
    "You are a meticulous tender analyst. Be concise and follow procurement standards.";

pub const NETWORK_ENGINEER_PROMPT: &str =
    "You are a network engineer who gives practical and safe installation advice.";

pub const SALES_CONSULTANT_PROMPT: &str =
    "You are a sales consultant. Answer briefly and practically, with a clear call to action.";

pub const TENDER_TASK: &str = "Analyse the following tender text. Produce a summary, a requirements table (mandatory/optional), the timeline, evaluation criteria, required documents, and a go/no-go recommendation with the main risks.";

pub const SITE_PHOTO_TASK: &str = "Analyse the installation risk in the following photo. Highlight hazards and mitigation recommendations in 3 short points.";

pub const FILE_ANALYSIS_TASK: &str =
    "Describe the attached file and point out anything relevant to a telecom sales or network engagement.";

pub const SITE_SUMMARY_TASK: &str =
    "Summarise the following results into practical technical recommendations for the installation team (max 7 points):";

pub const VOICE_BRIEF_TASK: &str =
    "Turn this into a 30-second account manager briefing: key points, next step, call to action.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_case_insensitive_lookup() {
        assert_eq!(find_role("Customer Service").unwrap().icon, "📞");
        assert_eq!(find_role("customer service").unwrap().name, "Customer Service");
        assert_eq!(find_role("  GENERAL ASSISTANT ").unwrap().name, DEFAULT_ROLE);
    }

    #[test]
    fn test_fuzzy_lookup() {
        assert_eq!(find_role("tech support").unwrap().name, "Technical Support");
        assert_eq!(find_role("tutor").unwrap().name, "Teacher/Tutor");
        assert_eq!(find_role("consultative seling").unwrap().name, "Consultative Selling");
    }

    #[test]
    fn test_unrelated_query_matches_nothing() {
        assert!(find_role("astronaut").is_none());
        assert!(find_role("").is_none());
    }

    #[test]
    fn test_guidance_wraps_knowledge_base() {
        let guidance = knowledge_base_guidance("=== DOCUMENT: a.pdf ===\nfacts");
        assert!(guidance.starts_with("\n\nIMPORTANT: You have access"));
        assert!(guidance.contains("=== DOCUMENT: a.pdf ===\nfacts"));
        assert!(guidance.ends_with("mention which document it came from."));
    }

    #[test]
    fn test_role_names_are_unique() {
        for (i, a) in ROLES.iter().enumerate() {
            for b in &ROLES[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
        assert_eq!(default_role().name, DEFAULT_ROLE);
    }
}
