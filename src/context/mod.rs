//! Context window management for the agent loop
//!
//! Two defenses against unbounded conversation growth: per-tool-output
//! truncation applied as results enter the history, and whole-conversation
//! compaction once the estimated token count crosses a threshold. Token
//! estimation is a chars/4 heuristic; the contract is only that the
//! estimate is at or below the threshold after compaction.

use tracing::debug;

use crate::config::ContextConfig;
use crate::llm::{ContentBlock, Message, MessageContent, Role};

/// Conservative token estimate for a conversation
pub fn estimate_tokens(system_prompt: &str, messages: &[Message]) -> usize {
    let chars: usize = system_prompt.len() + messages.iter().map(Message::char_len).sum::<usize>();
    chars / 4
}

/// Truncate one tool output according to its family's strategy
///
/// Bash keeps head and tail because errors and summaries cluster at both
/// ends; read cuts the middle because the model already chose the file;
/// grep and glob keep the first matches.
pub fn truncate_tool_output(tool_name: &str, output: &str, config: &ContextConfig) -> String {
    match tool_name {
        "bash" => head_tail(output, config.bash_output_cap),
        "read" => middle_cut(output, config.read_output_cap),
        "grep" => first_chars(output, config.grep_output_cap),
        "glob" => first_lines(output, config.glob_max_paths),
        _ => head_tail(output, config.bash_output_cap),
    }
}

fn head_tail(output: &str, cap: usize) -> String {
    if output.len() <= cap {
        return output.to_string();
    }

    let head_len = cap * 2 / 3;
    let tail_len = cap - head_len;
    let head = slice_at_char_boundary(output, head_len);
    let tail = slice_tail_at_char_boundary(output, tail_len);
    format!(
        "{}\n... [{} chars elided] ...\n{}",
        head,
        output.len() - head.len() - tail.len(),
        tail
    )
}

fn middle_cut(output: &str, cap: usize) -> String {
    if output.len() <= cap {
        return output.to_string();
    }

    let half = cap / 2;
    let head = slice_at_char_boundary(output, half);
    let tail = slice_tail_at_char_boundary(output, half);
    format!(
        "{}\n... [middle {} chars elided] ...\n{}",
        head,
        output.len() - head.len() - tail.len(),
        tail
    )
}

fn first_chars(output: &str, cap: usize) -> String {
    if output.len() <= cap {
        return output.to_string();
    }

    // Cut at the last full line inside the cap
    let head = slice_at_char_boundary(output, cap);
    let head = match head.rfind('\n') {
        Some(idx) => &head[..idx],
        None => head,
    };
    format!("{}\n... [{} chars elided]", head, output.len() - head.len())
}

fn first_lines(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= max_lines {
        return output.to_string();
    }

    let mut result = lines[..max_lines].join("\n");
    result.push_str(&format!("\n... [{} more lines elided]", lines.len() - max_lines));
    result
}

fn slice_at_char_boundary(s: &str, mut idx: usize) -> &str {
    if idx >= s.len() {
        return s;
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    &s[..idx]
}

fn slice_tail_at_char_boundary(s: &str, len: usize) -> &str {
    if len >= s.len() {
        return s;
    }
    let mut idx = s.len() - len;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    &s[idx..]
}

/// Conversation compactor for one agent phase
#[derive(Debug, Clone)]
pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Compact the conversation if the estimate crosses the threshold
    ///
    /// Replaces everything before the most recent K turn pairs with a
    /// single summary message. The retained window always starts at an
    /// assistant message so tool_use/tool_result pairs stay together, and
    /// the window shrinks further if one pass is not enough to get the
    /// estimate under the threshold. Returns true if compaction ran.
    pub fn compact_if_needed(&self, system_prompt: &str, messages: &mut Vec<Message>) -> bool {
        if estimate_tokens(system_prompt, messages) <= self.config.compaction_threshold_tokens {
            return false;
        }

        let mut keep_pairs = self.config.keep_recent_pairs;
        let mut compacted = false;

        loop {
            let cut = self.find_cut(messages, keep_pairs);
            if cut == 0 {
                break;
            }

            let summary = summarize(&messages[..cut]);
            let mut rebuilt = vec![Message::user(summary)];
            rebuilt.extend_from_slice(&messages[cut..]);
            *messages = rebuilt;
            compacted = true;

            if estimate_tokens(system_prompt, messages) <= self.config.compaction_threshold_tokens || keep_pairs <= 1 {
                break;
            }
            keep_pairs -= 1;
        }

        if compacted {
            debug!(
                messages = messages.len(),
                estimate = estimate_tokens(system_prompt, messages),
                "conversation compacted"
            );
        }
        compacted
    }

    /// Index where the retained window begins
    ///
    /// Walks back from `len - 2 * keep_pairs` until the window starts at an
    /// assistant message (so a retained tool_result is never orphaned from
    /// its tool_use).
    fn find_cut(&self, messages: &[Message], keep_pairs: usize) -> usize {
        let mut cut = messages.len().saturating_sub(keep_pairs * 2);
        while cut > 0 && messages[cut].role != Role::Assistant {
            cut -= 1;
        }
        cut
    }
}

/// Deterministic local summary of dropped messages
fn summarize(dropped: &[Message]) -> String {
    let mut tool_counts: Vec<(String, usize)> = Vec::new();
    let mut notes: Vec<String> = Vec::new();

    for msg in dropped {
        match &msg.content {
            MessageContent::Text(text) => {
                if msg.role == Role::Assistant && notes.len() < 3 {
                    notes.push(snippet(text, 200));
                }
            }
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ContentBlock::ToolUse { name, .. } => match tool_counts.iter_mut().find(|(n, _)| n == name) {
                            Some((_, count)) => *count += 1,
                            None => tool_counts.push((name.clone(), 1)),
                        },
                        ContentBlock::Text { text } => {
                            if msg.role == Role::Assistant && notes.len() < 3 {
                                notes.push(snippet(text, 200));
                            }
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }
            }
        }
    }

    let mut summary = format!(
        "[Conversation compacted: {} earlier messages replaced by this summary]",
        dropped.len()
    );

    if !tool_counts.is_empty() {
        let calls: Vec<String> = tool_counts.iter().map(|(name, count)| format!("{} x{}", name, count)).collect();
        summary.push_str(&format!("\nTools called so far: {}", calls.join(", ")));
    }

    if !notes.is_empty() {
        summary.push_str("\nEarlier assistant notes:");
        for note in notes {
            summary.push_str(&format!("\n- {}", note));
        }
    }

    summary.push_str("\nContinue the task; do not repeat completed work.");
    summary
}

fn snippet(text: &str, max: usize) -> String {
    let trimmed = text.trim().replace('\n', " ");
    if trimmed.len() <= max {
        trimmed
    } else {
        format!("{}...", slice_at_char_boundary(&trimmed, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ContextConfig {
        ContextConfig {
            compaction_threshold_tokens: 200,
            keep_recent_pairs: 2,
            bash_output_cap: 60,
            read_output_cap: 60,
            grep_output_cap: 60,
            glob_max_paths: 5,
        }
    }

    #[test]
    fn test_estimate_tokens_quarter_of_chars() {
        let messages = vec![Message::user("a".repeat(400))];
        assert_eq!(estimate_tokens("", &messages), 100);
    }

    #[test]
    fn test_bash_truncation_keeps_head_and_tail() {
        let config = small_config();
        let output = format!("START{}END", "x".repeat(500));

        let truncated = truncate_tool_output("bash", &output, &config);

        assert!(truncated.starts_with("START"));
        assert!(truncated.ends_with("END"));
        assert!(truncated.contains("elided"));
        assert!(truncated.len() < output.len());
    }

    #[test]
    fn test_read_truncation_cuts_middle() {
        let config = small_config();
        let output = format!("HEAD{}TAIL", "m".repeat(500));

        let truncated = truncate_tool_output("read", &output, &config);

        assert!(truncated.starts_with("HEAD"));
        assert!(truncated.ends_with("TAIL"));
        assert!(truncated.contains("middle"));
    }

    #[test]
    fn test_grep_truncation_keeps_first_matches() {
        let config = small_config();
        let lines: Vec<String> = (0..20).map(|i| format!("file.rs:{}:match", i)).collect();
        let output = lines.join("\n");

        let truncated = truncate_tool_output("grep", &output, &config);

        assert!(truncated.starts_with("file.rs:0:match"));
        assert!(truncated.contains("elided"));
    }

    #[test]
    fn test_glob_truncation_caps_paths() {
        let config = small_config();
        let lines: Vec<String> = (0..20).map(|i| format!("src/file{}.rs", i)).collect();
        let output = lines.join("\n");

        let truncated = truncate_tool_output("glob", &output, &config);

        assert!(truncated.contains("src/file0.rs"));
        assert!(truncated.contains("src/file4.rs"));
        assert!(!truncated.contains("src/file5.rs\n"));
        assert!(truncated.contains("15 more lines elided"));
    }

    #[test]
    fn test_short_output_untouched() {
        let config = small_config();
        assert_eq!(truncate_tool_output("bash", "short", &config), "short");
        assert_eq!(truncate_tool_output("read", "short", &config), "short");
    }

    #[test]
    fn test_no_compaction_below_threshold() {
        let manager = ContextManager::new(small_config());
        let mut messages = vec![Message::user("hi"), Message::assistant("hello")];

        assert!(!manager.compact_if_needed("system", &mut messages));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_compaction_replaces_old_turns() {
        let manager = ContextManager::new(small_config());

        // 10 turn pairs of ~50 chars each, well over the 100-token threshold
        let mut messages = Vec::new();
        for i in 0..10 {
            messages.push(Message::user(format!("question {} {}", i, "q".repeat(40))));
            messages.push(Message::assistant(format!("answer {} {}", i, "a".repeat(40))));
        }

        let before = messages.len();
        assert!(manager.compact_if_needed("system", &mut messages));
        assert!(messages.len() < before);

        // First message is the summary
        let summary = messages[0].content.as_text().unwrap();
        assert!(summary.contains("compacted"));

        // Most recent pair survives verbatim
        let last = messages.last().unwrap();
        assert!(matches!(&last.content, MessageContent::Text(t) if t.starts_with("answer 9")));
    }

    #[test]
    fn test_compaction_gets_under_threshold() {
        let manager = ContextManager::new(small_config());

        let mut messages = Vec::new();
        for i in 0..20 {
            messages.push(Message::user(format!("q{} {}", i, "q".repeat(100))));
            messages.push(Message::assistant(format!("a{} {}", i, "a".repeat(100))));
        }

        manager.compact_if_needed("", &mut messages);
        assert!(estimate_tokens("", &messages) <= manager.config().compaction_threshold_tokens);
    }

    #[test]
    fn test_compaction_keeps_tool_pairs_together() {
        let manager = ContextManager::new(small_config());

        let mut messages = Vec::new();
        for i in 0..10 {
            messages.push(Message::user(format!("turn {} {}", i, "x".repeat(60))));
            messages.push(Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: format!("toolu_{}", i),
                name: "read".to_string(),
                input: serde_json::json!({"file_path": "f.rs"}),
            }]));
            messages.push(Message::user_blocks(vec![ContentBlock::tool_result(
                format!("toolu_{}", i),
                "contents",
                false,
            )]));
            messages.push(Message::assistant(format!("done {}", i)));
        }

        manager.compact_if_needed("", &mut messages);

        // Every retained tool_result has its tool_use earlier in the window
        let mut seen_tool_use: Vec<String> = Vec::new();
        for msg in messages.iter().skip(1) {
            if let MessageContent::Blocks(blocks) = &msg.content {
                for block in blocks {
                    match block {
                        ContentBlock::ToolUse { id, .. } => seen_tool_use.push(id.clone()),
                        ContentBlock::ToolResult { tool_use_id, .. } => {
                            assert!(seen_tool_use.contains(tool_use_id), "orphaned tool_result");
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    #[test]
    fn test_summary_counts_tool_calls() {
        let dropped = vec![
            Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "1".to_string(),
                name: "read".to_string(),
                input: serde_json::json!({}),
            }]),
            Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "2".to_string(),
                name: "read".to_string(),
                input: serde_json::json!({}),
            }]),
        ];

        let summary = summarize(&dropped);
        assert!(summary.contains("read x2"));
    }

    #[test]
    fn test_compaction_idempotent_output() {
        let manager = ContextManager::new(small_config());

        let mut a = Vec::new();
        for i in 0..10 {
            a.push(Message::user(format!("q{} {}", i, "q".repeat(60))));
            a.push(Message::assistant(format!("a{} {}", i, "a".repeat(60))));
        }
        let mut b = a.clone();

        manager.compact_if_needed("", &mut a);
        manager.compact_if_needed("", &mut b);

        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].content.as_text(), b[0].content.as_text());
    }
}
