//! Pull feed URLs and `@channel` mentions out of inbound messages.
//!
//! Absence is an empty string, never an error.

use std::sync::OnceLock;

use regex::Regex;

use crate::messaging::types::{EntityKind, InboundMessage, MessageEntity};

fn payload_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(https?://.*?)(?:$| )").expect("valid regex"))
}

/// Substring covered by an entity. Offsets count UTF-16 code units.
fn entity_text(text: &str, entity: &MessageEntity) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let Some(end) = entity.offset.checked_add(entity.length) else {
        return String::new();
    };
    match units.get(entity.offset..end) {
        Some(span) => String::from_utf16_lossy(span),
        None => String::new(),
    }
}

fn first_of(text: &str, entities: &[MessageEntity], kind: EntityKind) -> String {
    entities
        .iter()
        .find(|e| e.kind == kind)
        .map(|e| entity_text(text, e))
        .unwrap_or_default()
}

/// First mention of the message text, or of the caption when there is no text.
pub fn extract_mention(msg: &InboundMessage) -> String {
    if !msg.text.is_empty() {
        first_of(&msg.text, &msg.entities, EntityKind::Mention)
    } else {
        first_of(&msg.caption, &msg.caption_entities, EntityKind::Mention)
    }
}

/// First URL and first mention of the message text.
///
/// Without a URL entity, a leading `http(s)://` token of the command payload is used.
pub fn extract_url_and_mention(msg: &InboundMessage) -> (String, String) {
    let mention = first_of(&msg.text, &msg.entities, EntityKind::Mention);
    let mut url = first_of(&msg.text, &msg.entities, EntityKind::Url);

    if url.is_empty() {
        if let Some(m) = payload_url_re()
            .captures(msg.payload())
            .and_then(|c| c.get(1))
        {
            url = m.as_str().to_string();
        }
    }

    (url, mention)
}
