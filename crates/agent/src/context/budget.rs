//! Character budgets for tool results and conversation history.
//!
//! Small local models lose the thread long before they hit their nominal
//! context window, so both limits are enforced eagerly rather than left to
//! the backend.

use pixelforge_core::error::ConversationError;
use pixelforge_core::message::Conversation;

/// What a history trim removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimReport {
    pub removed_turns: usize,
    pub remaining_chars: usize,
}

/// Cap a tool result at `cap` characters, notice included.
///
/// Results at or under the cap pass through unchanged.
pub fn cap_result(text: &str, cap: usize) -> String {
    let original = text.chars().count();
    if original <= cap {
        return text.to_string();
    }

    let notice = truncation_notice(original);
    let notice_len = notice.chars().count();
    if notice_len >= cap {
        return notice.chars().take(cap).collect();
    }

    let keep = cap - notice_len;
    let mut capped: String = text.chars().take(keep).collect();
    capped.push_str(&notice);
    capped
}

fn truncation_notice(original: usize) -> String {
    format!(
        "\n\n[TRUNCATED: the full result was {original} characters. \
         Work with the data above and do not request it again.]"
    )
}

/// Trim whole turn pairs after the task turn until the history fits.
///
/// Turn 0 and the last two turns are never removed, and the number of
/// removed turns is always even so requests leave with their results.
/// Returns `None` when nothing was removed.
pub fn trim_history(
    conversation: &mut Conversation,
    max_chars: usize,
) -> Result<Option<TrimReport>, ConversationError> {
    let total = conversation.estimated_chars();
    if total <= max_chars {
        return Ok(None);
    }

    let turns = conversation.turns();
    if turns.len() <= 3 {
        return Ok(None);
    }
    let max_drop = turns.len() - 3;

    let mut remaining = total;
    let mut drop = 0;
    while drop < max_drop && remaining > max_chars {
        remaining -= turns[1 + drop].size_chars();
        drop += 1;
    }

    if drop % 2 == 1 {
        if drop < max_drop {
            drop += 1;
        } else {
            drop -= 1;
        }
    }

    if drop == 0 {
        return Ok(None);
    }

    conversation.trim_front(drop)?;
    Ok(Some(TrimReport {
        removed_turns: drop,
        remaining_chars: conversation.estimated_chars(),
    }))
}
