//! Prompt templates for the generation and classification collaborators.
//!
//! Placeholders are `{name}` and are filled by [`render`]. The role lines at
//! the top of each template are stable so collaborators can tell requests apart.

pub const PLANNER_ROLE: &str = "You are a senior marketing strategist.";
pub const REWRITER_ROLE: &str = "You are a search query rewriter.";
pub const WRITER_ROLE: &str = "You are a marketing copywriter.";

pub const ROUTER_PROMPT: &str = r#"You are an expert router. Classify the user query into one of the following categories:
- Factual: Queries that require specific facts or data retrieval.
- Analytical: Queries that require analysis, comparisons, or strategic thinking.
- ChitChat: General conversation, greetings, or non-business related queries.
- ClarificationNeeded: Queries that are ambiguous or lack enough information to proceed.

Respond with ONLY valid JSON: {"category": "Factual" | "Analytical" | "ChitChat" | "ClarificationNeeded"}

User Query: {goal}"#;

pub const PLANNER_PROMPT: &str = r#"You are a senior marketing strategist. Given a campaign goal, list the key 3-5 assets needed.
Think about the target audience, channels, and objective before deciding.

Respond with ONLY valid JSON: {"steps": ["Email", "LinkedIn Post"]}

Goal: {goal}"#;

pub const REWRITER_PROMPT: &str = r#"You are a search query rewriter. The query below did not find useful material in the knowledge base.
Rewrite it so a keyword search over marketing guidelines, product information, and brand history finds better matches.

Goal: {goal}
Asset Type: {asset_type}
Previous Query: {query}

Respond with ONLY the rewritten query on a single line."#;

pub const WRITER_PROMPT: &str = r#"You are a marketing copywriter. Write a {asset_type} for this goal.
Use the following context/guidelines:
{context}

Think about the tone, key message, and call to action based on the context.
If the context does not contain enough material to write the asset, say so explicitly.
{feedback}
Goal: {goal}
Asset Type: {asset_type}"#;

pub const FEEDBACK_SECTION: &str = r#"
A reviewer asked for changes to the previous draft. Address this feedback:
{note}
"#;

pub const RETRIEVAL_GRADER_PROMPT: &str = r#"You are a grader assessing relevance of a retrieved document to a user question.
If the document contains keyword(s) or semantic meaning related to the user question, grade it as relevant.
It does not need to be a perfect answer; the goal is to filter out clearly irrelevant documents.

Respond with ONLY valid JSON: {"score": "yes" | "no"}

Retrieved Document:
{document}

User Question: {question}"#;

pub const HALLUCINATION_GRADER_PROMPT: &str = r#"You are a grader assessing whether an LLM generation is grounded in / supported by a set of retrieved facts.
- "grounded": every factual claim in the generation is supported by the facts.
- "hallucinated": the generation makes claims the facts do not support.
- "more_context_needed": the generation says it lacks the material to complete the task.

Respond with ONLY valid JSON: {"verdict": "grounded" | "hallucinated" | "more_context_needed"}

Set of Facts:
{documents}

LLM Generation: {generation}"#;

pub const REVIEWER_PROMPT: &str = r#"You are a brand compliance officer. Review the text below against these guidelines:
{guidelines}

Analyze the text for tone, forbidden words, and alignment with the guidelines.

Respond with ONLY valid JSON: {"passed": true | false, "critique": "brief feedback"}

Asset: {asset}
Content: {content}"#;

/// Fill `{name}` placeholders. Unknown placeholders are left in place.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// Join retrieved chunks the way every prompt presents them.
pub fn join_context(chunks: &[String]) -> String {
    if chunks.is_empty() {
        return "(no context retrieved)".to_string();
    }
    chunks.join("\n\n")
}

/// Pull the JSON object out of a model reply that may wrap it in prose or a
/// fenced code block.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}
