//! Persona and event configuration, and the role-play system prompt
//!
//! The prompt is rendered once per session. Conversation history is sent
//! as the message list on every request and is never folded into it.

use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::Path;

/// Line the professor uses to steer off-topic questions back to the talk
pub const OFF_TOPIC_REDIRECT: &str =
    "Let's focus on today's presentation. Do you have any questions about my current research?";

/// Who the professor is and what event they are attending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub institution: String,
    pub research_area: String,
    pub personal_background: String,
    pub hobbies: String,
    pub event_description: String,
    pub event_details: String,
    pub event_date_time: String,
    pub event_location: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Dr. Sarah Mitchell".to_string(),
            institution: "UTRGV".to_string(),
            research_area: "Specializes in Quantum Computing and Machine Learning, with a focus on developing quantum algorithms for AI applications".to_string(),
            personal_background: "Originally from Boston, completed PhD at MIT, has been teaching for 15 years and mentored over 50 graduate students".to_string(),
            hobbies: "Enjoys hiking, playing classical piano, and participating in science outreach programs for high school students".to_string(),
            event_description: "Annual Department Research Symposium".to_string(),
            event_details: "Presenting latest findings in quantum machine learning algorithms, followed by a Q&A session and networking reception".to_string(),
            event_date_time: "March 15th, 2024 at 2:00 PM".to_string(),
            event_location: "Science Building, Room 305".to_string(),
        }
    }
}

/// Failure to load a persona file
#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    #[error("failed to read persona file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid persona file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersonaConfig {
    /// Load a persona from a JSON file. Missing fields fall back to the
    /// default persona.
    pub fn load(path: &Path) -> Result<Self, PersonaError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PersonaError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| PersonaError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Name the persona answers to in first person.
    ///
    /// "Dr. Sarah Mitchell" becomes "Sarah"; single-word names are used as is.
    pub fn addressed_as(&self) -> &str {
        let mut words = self.name.split_whitespace();
        let first = words.next().unwrap_or(self.name.as_str());
        words.next().unwrap_or(first)
    }
}

/// Render the role-play system prompt for a persona
pub fn build_context(config: &PersonaConfig) -> String {
    let mut prompt = String::with_capacity(2048);
    let name = &config.name;
    let event = &config.event_description;

    let _ = writeln!(prompt, "You are {name}, a Professor at {}.", config.institution);
    prompt.push('\n');

    prompt.push_str("Background Information (Only use when relevant to event questions):\n");
    let _ = writeln!(prompt, "- Research Focus: {}", config.research_area);
    let _ = writeln!(prompt, "- Academic Background: {}", config.personal_background);
    let _ = writeln!(prompt, "- Personal Interests: {}", config.hobbies);
    prompt.push('\n');

    prompt.push_str("Current Situation:\n");
    let _ = writeln!(prompt, "- You are actively at: {event}");
    let _ = writeln!(prompt, "- Current Activity: {}", config.event_details);
    let _ = writeln!(
        prompt,
        "- Time and Location: {} at {}",
        config.event_date_time, config.event_location
    );
    prompt.push_str("- You are taking questions during this presentation\n\n");

    prompt.push_str("Role-Playing Instructions:\n");
    let _ = writeln!(prompt, "1. Respond as {} in first person", config.addressed_as());
    prompt.push_str("2. You are currently AT the event, speaking in present tense\n");
    prompt.push_str("3. Keep all responses brief and concise (2-3 sentences maximum)\n");
    prompt.push_str("4. Focus ONLY on questions related to:\n");
    prompt.push_str("   - Your current research presentation\n");
    let _ = writeln!(prompt, "   - The ongoing {event}");
    prompt.push_str("   - Technical questions about your research\n");
    prompt.push_str("5. For off-topic questions:\n");
    let _ = writeln!(prompt, "   - Briefly redirect: '{OFF_TOPIC_REDIRECT}'");
    prompt.push_str(
        "6. Be professional but engaging as an in person professor, not an email, chatbot or assistant. \
         Never refer to yourself as an assistant or say 'Speaking as Professor'\n\n",
    );

    prompt.push_str("Remember:\n");
    let _ = writeln!(prompt, "- You are actively presenting at {event}");
    prompt.push_str("- Keep responses short and to the point around 2 sentences\n");
    let _ = write!(prompt, "- Stay focused on {}", config.research_area);

    prompt
}
