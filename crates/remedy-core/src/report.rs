//! Rendering of tracker comments. Pure functions, no tracker access.

use crate::executor::{CommandOutcome, Phase};
use crate::scraper::ScrapedIssue;

const MAX_DETAIL_CHARS: usize = 2000;
const MIN_DETAIL_CHARS: usize = 200;
/// Shared by all phase outputs of one comment.
const DETAIL_BUDGET_CHARS: usize = 40_000;
/// GitHub rejects comment bodies over 65536 characters.
pub const MAX_COMMENT_CHARS: usize = 60_000;

/// Render the remediation comment for a processed ticket.
///
/// Commands appear in extraction order, phases always as unlock, command,
/// relock. The same ticket state always renders the same text. The result
/// never exceeds [`MAX_COMMENT_CHARS`]: phase output is shortened first,
/// then dropped, and as a last resort the command list is cut while the
/// closing verdict is kept.
pub fn format(issue: &ScrapedIssue) -> String {
    let details = issue
        .outcomes()
        .iter()
        .flat_map(|o| o.results.iter())
        .filter(|r| !r.detail.trim().is_empty())
        .count();
    let detail_cap = match details {
        0 => MAX_DETAIL_CHARS,
        n => (DETAIL_BUDGET_CHARS / n).clamp(MIN_DETAIL_CHARS, MAX_DETAIL_CHARS),
    };

    let (body, footer) = render(issue, Some(detail_cap));
    if body.chars().count() + footer.chars().count() <= MAX_COMMENT_CHARS {
        return body + &footer;
    }
    let (body, footer) = render(issue, None);
    if body.chars().count() + footer.chars().count() <= MAX_COMMENT_CHARS {
        return body + &footer;
    }

    let note = "\n... (comment truncated to fit the size limit)\n";
    let keep = MAX_COMMENT_CHARS - footer.chars().count() - note.chars().count();
    let mut out: String = body.chars().take(keep).collect();
    out.push_str(note);
    out.push_str(&footer);
    out
}

/// Body and closing verdict. `detail_cap` of `None` leaves out phase output.
fn render(issue: &ScrapedIssue, detail_cap: Option<usize>) -> (String, String) {
    let mut out = String::new();
    let status = if issue.resolved() {
        "resolved"
    } else {
        "unresolved"
    };
    out.push_str(&format!("## Batch remediation: {status}\n\n"));
    out.push_str(&format!("Operation: `{}`\n", issue.label));

    if !issue.is_actionable() {
        out.push_str(
            "\nNo remediation commands could be parsed from this ticket \
             (expected `subject=<id> form=<name>` or `subject=<id> field=<name>`).\n",
        );
    }

    for (i, outcome) in issue.outcomes().iter().enumerate() {
        out.push('\n');
        push_outcome(&mut out, i + 1, outcome, detail_cap);
    }
    if detail_cap.is_none() && !issue.outcomes().is_empty() {
        out.push_str("\nPhase output omitted to fit the comment size limit.\n");
    }

    let unattempted = &issue.commands()[issue.outcomes().len().min(issue.commands().len())..];
    if !unattempted.is_empty() {
        out.push_str("\n### Not attempted\n");
        for cmd in unattempted {
            out.push_str(&format!("- {cmd}\n"));
        }
    }

    if !issue.warnings().is_empty() {
        out.push_str("\n### Parse warnings\n");
        for w in issue.warnings() {
            out.push_str(&format!("- {w}\n"));
        }
    }

    let footer = if issue.resolved() {
        "\nAll commands replayed successfully. Closing.\n"
    } else if issue.relock_failures().next().is_some() {
        "\n**Relock failed for at least one form. Lock it manually before anything else.**\n"
    } else {
        "\nManual follow-up needed.\n"
    };
    (out, footer.to_string())
}

fn push_outcome(out: &mut String, index: usize, outcome: &CommandOutcome, detail_cap: Option<usize>) {
    let verdict = if outcome.succeeded() { "ok" } else { "failed" };
    out.push_str(&format!("### {index}. {} ({verdict})\n", outcome.command));
    for phase in Phase::all() {
        let r = outcome.result(*phase);
        let mark = match (r.success, phase) {
            (true, _) => "success",
            (false, Phase::Relock) => "**FAILED: form may still be unlocked**",
            (false, _) => "failed",
        };
        out.push_str(&format!("- {phase}: {mark}\n"));
    }

    let Some(cap) = detail_cap else {
        return;
    };
    for phase in Phase::all() {
        let detail = outcome.result(*phase).detail.trim();
        if detail.is_empty() {
            continue;
        }
        out.push_str(&format!("\n<details><summary>{phase} output</summary>\n\n"));
        out.push_str(&format!("```\n{}\n```\n</details>\n", truncate(detail, cap)));
    }
}

/// Pre-execution summary of a scraped ticket, for dry runs and confirmation.
pub fn format_scraped(issue: &ScrapedIssue) -> String {
    let mut out = format!("#{} [{}] {}\n", issue.number, issue.label, issue.title);
    if issue.commands().is_empty() {
        out.push_str("  (no commands)\n");
    }
    for cmd in issue.commands() {
        out.push_str(&format!("  {cmd}\n"));
    }
    for w in issue.warnings() {
        out.push_str(&format!("  warning: {w}\n"));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}\n... (truncated)")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionResult;
    use crate::forms::{FormsTable, MetadataRow};
    use crate::tracker::{IssueState, RawIssue};

    fn issue(body: &str) -> ScrapedIssue {
        let forms = FormsTable::from_metadata(["clinical", "demographics"].iter().map(|f| {
            MetadataRow {
                form_name: f.to_string(),
                field_name: format!("{f}_x"),
            }
        }));
        ScrapedIssue::from_raw(
            RawIssue {
                number: 101,
                title: "failed".into(),
                body: body.into(),
                labels: vec!["uvd".into()],
                state: IssueState::Open,
                pull_request: false,
            },
            "uvd",
            &forms,
        )
    }

    fn record(issue: &mut ScrapedIssue, idx: usize, ok: [bool; 3]) {
        let cmd = issue.commands()[idx].clone();
        let r = |phase: Phase, success| ExecutionResult {
            phase,
            success,
            detail: format!("{phase} says {}", if success { "yes" } else { "no" }),
        };
        issue.record(CommandOutcome {
            command: cmd,
            results: [
                r(Phase::Unlock, ok[0]),
                r(Phase::Command, ok[1]),
                r(Phase::Relock, ok[2]),
            ],
        });
    }

    #[test]
    fn resolved_ticket_lists_three_successes() {
        let mut i = issue("subject=S001 form=demographics");
        record(&mut i, 0, [true, true, true]);
        i.settle(true);
        let text = format(&i);
        assert!(text.starts_with("## Batch remediation: resolved"));
        assert!(text.contains("- unlock: success\n- command: success\n- relock: success"));
        assert!(text.contains("Closing."));
    }

    #[test]
    fn relock_failure_is_highlighted() {
        let mut i = issue("subject=S002 form=clinical\nsubject=S002 form=demographics");
        record(&mut i, 0, [true, true, false]);
        record(&mut i, 1, [true, true, true]);
        i.settle(true);
        let text = format(&i);
        assert!(text.contains("unresolved"));
        assert!(text.contains("### 1. S002/clinical (failed)"));
        assert!(text.contains("- relock: **FAILED"));
        assert!(text.contains("### 2. S002/demographics (ok)"));
        assert!(text.contains("Lock it manually"));
        let first = text.find("S002/clinical").unwrap();
        let second = text.find("S002/demographics").unwrap();
        assert!(first < second);
    }

    #[test]
    fn empty_ticket_explains_itself() {
        let i = issue("stack trace only");
        let text = format(&i);
        assert!(text.contains("unresolved"));
        assert!(text.contains("No remediation commands"));
    }

    #[test]
    fn warnings_and_unattempted_commands_are_listed() {
        let mut i = issue("subject=S001 form=clinical\nsubject=S001 form=demographics\nsubject=S001 form=zzz");
        record(&mut i, 0, [true, true, true]);
        let text = format(&i);
        assert!(text.contains("### Not attempted\n- S001/demographics"));
        assert!(text.contains("### Parse warnings"));
        assert!(text.contains("zzz"));
    }

    #[test]
    fn format_is_deterministic() {
        let mut i = issue("subject=S001 form=clinical");
        record(&mut i, 0, [false, true, true]);
        i.settle(true);
        assert_eq!(format(&i), format(&i.clone()));
    }

    #[test]
    fn long_detail_is_truncated() {
        let long = "x".repeat(MAX_DETAIL_CHARS + 10);
        let t = truncate(&long, MAX_DETAIL_CHARS);
        assert!(t.ends_with("(truncated)"));
        assert_eq!(truncate("short", 10), "short");
    }

    fn replay_all(issue: &mut ScrapedIssue, detail: &str) {
        for cmd in issue.commands().to_vec() {
            let r = |phase: Phase| ExecutionResult {
                phase,
                success: true,
                detail: detail.to_string(),
            };
            issue.record(CommandOutcome {
                command: cmd,
                results: [r(Phase::Unlock), r(Phase::Command), r(Phase::Relock)],
            });
        }
        issue.settle(true);
    }

    fn many_commands(n: usize) -> String {
        (0..n)
            .map(|i| format!("subject=S{i:04} form=clinical"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn phase_output_shrinks_to_fit_comment_limit() {
        let mut i = issue(&many_commands(12));
        replay_all(&mut i, &"x".repeat(5000));
        let text = format(&i);
        assert!(text.chars().count() <= MAX_COMMENT_CHARS);
        assert!(text.contains("<details>"));
        assert!(text.contains("### 12. S0011/clinical (ok)"));
        assert!(text.ends_with("All commands replayed successfully. Closing.\n"));
    }

    #[test]
    fn phase_output_dropped_when_shrinking_is_not_enough() {
        let mut i = issue(&many_commands(100));
        replay_all(&mut i, &"x".repeat(5000));
        let text = format(&i);
        assert!(text.chars().count() <= MAX_COMMENT_CHARS);
        assert!(!text.contains("<details>"));
        assert!(text.contains("Phase output omitted"));
        assert!(text.contains("### 100. S0099/clinical (ok)"));
    }

    #[test]
    fn huge_ticket_is_cut_but_keeps_verdict() {
        let mut i = issue(&many_commands(1500));
        replay_all(&mut i, "");
        let text = format(&i);
        assert!(text.chars().count() <= MAX_COMMENT_CHARS);
        assert!(text.contains("comment truncated"));
        assert!(text.starts_with("## Batch remediation: resolved"));
        assert!(text.ends_with("All commands replayed successfully. Closing.\n"));
    }

    #[test]
    fn scraped_summary() {
        let i = issue("subject=S001 form=clinical\nsubject=S001 form=zzz");
        let text = format_scraped(&i);
        assert!(text.starts_with("#101 [uvd] failed"));
        assert!(text.contains("  S001/clinical"));
        assert!(text.contains("warning: unknown form 'zzz'"));
    }
}
