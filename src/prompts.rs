// Fixed system prompts for the structured LLM calls. Placeholders of the
// form {name} are substituted by the callers in `extraction` and
// `summarizer`.

/// Dialogue summarization. The model may answer with the `%None%` or
/// `%Hold%` sentinel instead of a summary.
pub const SUMMARIZE_PROMPT: &str = r#"You are an expert at summarizing multi-turn chats.

You will be given a multi-turn chat between several participants.

You need to summarize the chat, including ALL THE MOST IMPORTANT facts, events, and decisions about the users in the chat.

- Use clear subjects (people/entities) in each sentence.
- Write one or two sentences per actor or action.
- Include any time or scheduling information if available.
- Keep names/entities exactly as written in the chat.
- Use the same language as user's input.
- If the chat contains nothing worth remembering, respond with exactly %None%.
- If the chat is clearly unfinished and needs more context to summarize, respond with exactly %Hold%.
"#;

/// Entity extraction: returns `{"entities": [{"type": ..., "name": ...}]}`.
pub const EXTRACT_ENTITIES_PROMPT: &str = r#"You are an expert at extracting structured entities from text.

You will be given a summary of a multi-turn chat. Your task is to identify and extract the most relevant **entities**.

## Output Format
RETURN A JSON OBJECT with the following structure:
```json
{
  "entities": [
    {
      "type": "",
      "name": ""
    }
  ]
}
```

## Instructions
- Focus only on **explicitly mentioned** entities.
- Do not extract entities representing relationships or actions.
- Do not extract dates, times, or other temporal information.
- Use the literal token `USER_ID` as the name for any self-reference (e.g., "I", "me", "my") in user messages.
- Use the same language as the input.
"#;

/// Relation extraction over a known entity list:
/// returns `{"relations": [{"source", "target", "relation_type", "fact"}]}`.
pub const BUILD_RELATIONS_PROMPT: &str = r#"You are an expert in extracting semantic relations and facts.

You will receive:

1. A list of entities extracted from a summary.
2. The original summary text.

## Task

Extract explicit relations between the entities using only information from the summary.

For each relation, RETURN A JSON OBJECT with the following structure:

- `"source"`: the initiating entity,
- `"target"`: the related entity,
- `"relation_type"`: a concise verb or phrase (e.g., "loves", "works_at"),
- `"fact"`: A sentence that can clearly describe the relation.(I will use this for searching)

## Rules

- `source` and `target` must be in the given entity list.
- If no relations found, return `{ "relations": [] }`.
- Output must use the **same language** as the input.
"#;

/// Conflict/duplicate detection between numbered fact lists. Expects a JSON
/// object keyed by new-fact index with `result` 0 (unrelated), 1 (conflict),
/// or 2 (duplicate).
pub const CONFLICT_CHECK_PROMPT: &str = r#"You are a fact conflict detection assistant for a knowledge graph.

Given a list of new facts and a list of existing facts, check for:
- Semantic duplicates: The facts express the same meaning.
- Semantic conflicts: The facts contradict each other (e.g., "John loves Alice" vs "John hates Alice").
- If neither applies, mark as unrelated.

Respond in the following JSON format:

```json
{
  "0": {
    "reason": "", // a very short reason for the judge
    "result": 1,  // 0 = unrelated, 1 = conflict, 2 = duplicate
    "existing_fact_idx": 0 // if unrelated, set to -1
  },
  ...
}
```

New facts:
{new_facts}

Existing facts:
{existing_facts}
"#;

/// Summary rewrite after a conflict. Expects plain updated summary text.
pub const REWRITE_SUMMARY_PROMPT: &str = r#"Given:
- An **old summary** that describes various facts or events.
- A **conflicting or outdated fact** from the old summary.
- A **new fact** that should be integrated into the summary.

Your task:
1. Carefully update the old summary to incorporate the new fact.
2. You may revise or replace the conflicting facts if needed.
3. Preserve other unrelated information from the old summary.
4. Keep the updated summary coherent and natural.

Respond with ONLY the updated summary text.

Old Summary:
{old_summary}

Conflicting Fact:
{conflicting_fact}

New Fact:
{new_fact}

Updated Summary:
"#;

/// System prompt for the conflict-check call.
pub const CONFLICT_CHECK_SYSTEM: &str = "You are a fact conflict detection expert.";

/// System prompt for the rewrite call.
pub const REWRITE_SUMMARY_SYSTEM: &str =
    "You are an intelligent assistant that helps update personal memory summaries.";
