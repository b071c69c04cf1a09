//! Domain policy: the system prompt, the post-response topic filter, and the
//! fixed strings shown to the user.

/// Instruction sent as the first (system) message of every request.
pub const SYSTEM_PROMPT: &str = "You are a legal advisor specializing in Indian law and the Constitution of India. \
Please only respond with relevant information about Indian law, and explain it in simple terms that are easy to understand for a 15-year-old. \
Break down complex legal terms into simple words or relatable examples. \
For any legal situations mentioned (like crimes or legal procedures), focus on providing clear advice specific to Indian law. \
Always respond directly to the question asked, and provide concise, to-the-point answers. \
Maintain the context throughout the conversation, storing relevant details to make sure your responses remain accurate and relevant to the ongoing discussion.";

pub const GREETING: &str =
    "Hello, I'm BharatNyay! Ask me anything about Indian law or the Constitution of India.";

pub const REFUSAL: &str =
    "I'm sorry, I can only discuss topics related to Indian law and the Constitution of India.";

pub const MALFORMED_RESPONSE: &str = "Sorry, I couldn't understand the response.";

pub const TRANSPORT_ERROR: &str = "An error occurred while communicating with the API.";

pub const ATTEMPTS_EXHAUSTED: &str =
    "Failed to get a response after multiple attempts. Please try again later.";

/// Phrases a reply must mention (case-insensitively) to be shown verbatim
const DOMAIN_KEYWORDS: [&str; 2] = ["indian law", "constitution of india"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filtered {
    Kept(String),
    Refused,
}

impl Filtered {
    pub fn into_text(self) -> String {
        match self {
            Filtered::Kept(text) => text,
            Filtered::Refused => REFUSAL.to_string(),
        }
    }
}

/// Keep `text` only if it mentions one of the domain keywords.
pub fn apply_domain_filter(text: String) -> Filtered {
    let lowered = text.to_lowercase();
    if DOMAIN_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        Filtered::Kept(text)
    } else {
        Filtered::Refused
    }
}
