//! Auto-response policy: decides which canned replies an inbound text earns.
//!
//! Pure: no I/O. The handler reads suppression state, calls [`decide`], sends
//! the replies in order and sets the flags the decision names.

use crate::config::Phrases;
use crate::suppression::Category;

/// Phrases that count as opening a conversation.
pub const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "how are you",
    "how are you doing",
    "alright",
    "yo",
    "whats up",
    "good morning",
    "morning",
    "good afternoon",
    "afternoon",
    "good evening",
    "evening",
    "can you help",
    "help me",
    "can you help me",
    "i need help",
    "sup",
];

/// Max edit distance to a catalog phrase for text to count as a greeting.
pub const GREETING_MAX_DISTANCE: usize = 5;

/// Edit distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Fuzzy greeting check on the lowercased text.
pub fn is_maybe_greeting(text: &str) -> bool {
    let text = text.to_lowercase();
    GREETINGS
        .iter()
        .any(|greeting| levenshtein(greeting, &text) <= GREETING_MAX_DISTANCE)
}

/// Kind of canned reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Greeting,
    ThankYou,
    Disclaimer,
}

impl ReplyKind {
    /// The suppression category a successful send marks, if any.
    /// Greetings are never rate-limited.
    pub fn suppression(self) -> Option<Category> {
        match self {
            ReplyKind::Greeting => None,
            ReplyKind::ThankYou => Some(Category::ThankYou),
            ReplyKind::Disclaimer => Some(Category::Disclaimer),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReplyKind::Greeting => "greeting",
            ReplyKind::ThankYou => "thank_you",
            ReplyKind::Disclaimer => "disclaimer",
        }
    }
}

/// One reply to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoReply {
    pub kind: ReplyKind,
    pub text: String,
}

/// Ordered replies for one inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub replies: Vec<AutoReply>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    /// Flags to set once every reply has been sent.
    pub fn flags(&self) -> Vec<Category> {
        self.replies
            .iter()
            .filter_map(|r| r.kind.suppression())
            .collect()
    }

    fn push(&mut self, kind: ReplyKind, text: &str) {
        self.replies.push(AutoReply {
            kind,
            text: text.to_string(),
        });
    }
}

/// Decide the replies for `text`.
///
/// Greeting or thank-you (never both) comes first. The disclaimer check is
/// independent and always runs last.
pub fn decide(
    text: &str,
    thank_you_eligible: bool,
    disclaimer_eligible: bool,
    phrases: &Phrases,
) -> Decision {
    let mut decision = Decision::default();
    if text.is_empty() {
        return decision;
    }

    if is_maybe_greeting(text) {
        decision.push(ReplyKind::Greeting, &phrases.greeting);
    } else if thank_you_eligible {
        decision.push(ReplyKind::ThankYou, &phrases.thank_you);
    }

    if disclaimer_eligible {
        decision.push(ReplyKind::Disclaimer, &phrases.disclaimer);
    }

    decision
}
