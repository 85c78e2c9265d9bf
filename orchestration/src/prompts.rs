//! Prompt templates for every judge and for reply composition.
//!
//! Each prompt opens with a bracketed prompt-kind header on its own line,
//! e.g. `[fact-extractor]`. Scripted backends route on it. Backends that
//! talk to a real model split it off with [`split_tag`] and send only the
//! body; the tag survives as a log field.

use crate::store::Message;

pub const EXTRACTOR_TAG: &str = "[fact-extractor]";
pub const ARBITRATOR_TAG: &str = "[fact-arbitrator]";
pub const GUARDIAN_TAG: &str = "[contradiction-guardian]";
pub const BLOCK_CHECKER_TAG: &str = "[scenario-block-checker]";
pub const CONDUCT_CHECKER_TAG: &str = "[scenario-conduct-checker]";
pub const QUALITY_TAG: &str = "[answer-quality]";
pub const REPLY_TAG: &str = "[interviewer-reply]";
pub const OPENING_TAG: &str = "[interviewer-opening]";
pub const SCORING_TAG: &str = "[checklist-scoring]";

/// Split the prompt-kind header off a prompt. Untagged prompts come back
/// whole.
pub fn split_tag(prompt: &str) -> (Option<&str>, &str) {
    match prompt.split_once('\n') {
        Some((first, body)) if first.starts_with('[') && first.ends_with(']') => (Some(first), body),
        _ => (None, prompt),
    }
}

/// Render messages as `role: content` lines.
pub fn format_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn fact_extractor(utterance: &str, max_claims: usize) -> String {
    format!(
        r#"{EXTRACTOR_TAG}
You extract factual claims from a candidate's interview answer.
Extract AT MOST {max_claims} key claims and normalize each one briefly.

Answer with a JSON array only, no comments:
[{{"fact": string, "topic": string}}]
Example topics: "experience", "skill", "education".
Return [] when the answer contains no factual claims.

Candidate answer: "{utterance}""#
    )
}

pub fn fact_arbitrator(old_text: &str, old_id: &str, new_text: &str) -> String {
    format!(
        r#"{ARBITRATOR_TAG}
You arbitrate between a previous and a new statement made by a candidate.
Answer with exactly one JSON object:
{{"action":"ADD_NEW"}}
{{"action":"FLAG_CONTRADICTION","note":"string"}}
{{"action":"INVALIDATE_OLD","target_fact_id":"{old_id}"}}

Rules:
- If the new statement refines or corrects the previous one, answer INVALIDATE_OLD with target_fact_id set to the previous statement id.
- If the statements are inconsistent, answer FLAG_CONTRADICTION.
- If the new statement is unrelated to the previous one, answer ADD_NEW.
- JSON only, no explanations.

Example:
Previous statement: Has 5 years of experience with Vue
Previous statement id: f-1
New statement: Wrote the first project 3 years ago
Answer: {{"action":"FLAG_CONTRADICTION","note":"5 years of Vue experience is impossible if the first project was written 3 years ago."}}

Previous statement: {old_text}
Previous statement id: {old_id}
New statement: {new_text}"#
    )
}

pub fn guardian(new_text: &str, neighbors: &[String]) -> String {
    let neighbors_block = neighbors
        .iter()
        .map(|n| format!("- {}", n))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"{GUARDIAN_TAG}
Analyze a new candidate claim against similar claims from the same interview.
Decide whether any of the similar claims contradict the new one.
Answer with a JSON array of items:
[{{"explanation": "string", "conflicting_facts": [{{"fact": "string"}}]}}]
Return [] when nothing contradicts.
In "explanation" describe what the claims are about; never write "the new claim".

New claim: "{new_text}"
Similar claims:
{neighbors_block}"#
    )
}

pub fn block_checker(block_title: &str, key_points: &[String], messages: &str) -> String {
    let key_points = key_points.join("; ");
    format!(
        r#"{BLOCK_CHECKER_TAG}
You moderate an interview. These are the latest messages of the block "{block_title}":

{messages}

Key points of the block: {key_points}

Decide whether the discussion of this block is complete.
Answer with JSON only: {{"is_passed": boolean, "comment": "string"}}"#
    )
}

pub fn conduct_checker(messages: &str) -> String {
    format!(
        r#"{CONDUCT_CHECKER_TAG}
You moderate an interview. These are the latest messages:

{messages}

Decide whether the candidate behaves inappropriately or deliberately derails the interview so that it must be ended now.
Answer with JSON only: {{"is_need_finish": boolean, "reason": "string"}}"#
    )
}

pub fn quality_analyzer(messages: &str) -> String {
    format!(
        r#"{QUALITY_TAG}
You analyze interview answers. Assess the candidate's latest answer to the interviewer's current question.
Canned: generic phrases without specifics. Evasive: avoids the point, no examples or details.

Answer with JSON only:
{{"is_canned_answer": boolean, "is_evasive": boolean, "is_not_full_answer": boolean, "analysis": "string"}}

Latest messages:
{messages}"#
    )
}

pub fn reply(system_prompt: &str, transcript: &str, notes: &str, finish_marker: &str) -> String {
    let notes = if notes.trim().is_empty() {
        "(none)".to_string()
    } else {
        notes.to_string()
    };
    format!(
        r#"{REPLY_TAG}
{system_prompt}

Conversation so far:
{transcript}

Interviewer notes for the next reply (never quote them verbatim):
{notes}

Write the interviewer's next message. When the interview is complete, end the message with {finish_marker}."#
    )
}

pub fn opening(system_prompt: &str, first_block: Option<&str>) -> String {
    let focus = first_block
        .map(|b| format!("Start with the topic \"{}\".", b))
        .unwrap_or_default();
    format!(
        r#"{OPENING_TAG}
{system_prompt}

Write the first message of the interview: greet the candidate and ask the first question. {focus}"#
    )
}

pub fn checklist_scoring(requirement: &str, fragments: &[String]) -> String {
    let fragments = fragments
        .iter()
        .enumerate()
        .map(|(i, f)| format!("Fragment {}: {}", i + 1, f))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        r#"{SCORING_TAG}
Evaluate how well the candidate demonstrated the requirement below, using only the interview fragments.

Requirement: {requirement}

{fragments}

Answer with JSON only: {{"score": number from 0 to 10, "justification": "string"}}"#
    )
}
