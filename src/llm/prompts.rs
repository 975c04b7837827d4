//! Prompt builders for the language-model collaborator.
//!
//! Each builder produces the full prompt text for one contract: extraction,
//! classification, summarization, conflict/sufficiency judgments, and
//! predicate/category filtering.

/// Prompt for extracting discrete atomic facts from conversation text.
#[must_use]
pub fn extract_facts(text: &str) -> String {
    format!(
        "Extract discrete, atomic facts explicitly stated in this conversation.\n\
         Focus on: preferences, behaviors, personal details, opinions, goals, and important statements.\n\
         Each fact should stand alone and be meaningful out of context.\n\
         Do NOT infer, assume, or reinterpret; only extract what is explicitly said.\n\n\
         Conversation:\n{text}\n\n\
         Return a JSON array of objects with keys \"content\" and \"category_hint\".\n\
         category_hint should be a short label like \"work\", \"preferences\", \"personal\", \"health\", \"goals\", etc.\n\n\
         Return ONLY valid JSON, no other text."
    )
}

/// Prompt for extracting knowledge-graph triplets from text.
#[must_use]
pub fn extract_triplets(text: &str) -> String {
    format!(
        "Extract knowledge graph triplets (subject, predicate, object) explicitly stated in this text.\n\
         Focus on relationships, attributes, and factual connections.\n\
         Do NOT infer or assume facts beyond the text.\n\
         Keep subjects and objects short and entity-like. If a statement contains\n\
         multiple relations, split into multiple triplets.\n\n\
         Text:\n{text}\n\n\
         Return a JSON array of objects with keys \"subject\", \"predicate\", \"object\", and \"status\".\n\
         status must be one of: \"current\", \"past\", or \"uncertain\".\n\
         Use \"past\" for statements about previous roles/relationships and \"current\"\n\
         for present facts. Use \"uncertain\" if unclear.\n\n\
         Return ONLY valid JSON, no other text."
    )
}

/// Prompt for classifying new facts against the owner's existing categories.
#[must_use]
pub fn classify_facts(categories: &str, items: &str) -> String {
    format!(
        "Classify each memory item into one of the existing categories, or suggest a new short category name.\n\n\
         Existing categories:\n{categories}\n\n\
         Items to classify:\n{items}\n\n\
         Return a JSON array of objects with keys \"content\" and \"category\".\n\
         Use existing category names when appropriate. Only create new categories if none fit.\n\
         Keep category names lowercase, short, and descriptive (e.g., \"work\", \"preferences\", \"health\").\n\n\
         Return ONLY valid JSON, no other text."
    )
}

/// Prompt for evolving a category's general summary with new facts.
#[must_use]
pub fn evolve_summary(category: &str, existing: &str, new_items: &str) -> String {
    format!(
        "You are maintaining a running summary of what is known about a user.\n\n\
         ## Current Summary for \"{category}\"\n{existing}\n\n\
         ## New Memory Items to Integrate\n{new_items}\n\n\
         ## Task\n\
         1. If new items conflict with the current summary, overwrite the old facts with the new ones.\n\
         2. If items are new information, add them logically.\n\
         3. Remove redundant or outdated information.\n\
         4. Preserve exact times/dates/durations, step order, and conditional fallback plans.\n\
         5. Return ONLY the updated markdown summary. No preamble, no explanation."
    )
}

/// Prompt for compressing a cluster of near-duplicate facts into one.
#[must_use]
pub fn compress_facts(items: &str) -> String {
    format!(
        "Compress these memory items into a concise summary.\n\
         Preserve all important facts but eliminate redundancy.\n\
         Preserve exact times/dates/durations, step order, and conditional fallback plans.\n\n\
         Items:\n{items}\n\n\
         Return a markdown summary that captures the essential information.\n\
         No preamble, no explanation."
    )
}

/// Prompt for producing a dated digest block over a window of aging facts.
#[must_use]
pub fn digest_facts(category: &str, items: &str) -> String {
    format!(
        "Produce a compact digest of these \"{category}\" memory items for long-term archival.\n\
         Keep every distinct fact; drop conversational filler and duplicates.\n\n\
         Items:\n{items}\n\n\
         Return ONLY the digest as markdown bullet points. No preamble, no explanation."
    )
}

/// Prompt for the supersession judgment on relational facts.
#[must_use]
pub fn detect_conflict(subject: &str, predicate: &str, new_value: &str, existing: &str) -> String {
    format!(
        "Determine whether the new fact should REPLACE any existing facts about the same subject and predicate.\n\
         Answer YES if the new fact replaces any existing fact (i.e., they cannot both be true now).\n\
         Answer NO if they can coexist or if you are unsure.\n\n\
         Subject: {subject}\n\
         Predicate: {predicate}\n\
         Existing facts:\n{existing}\n\n\
         New fact: {subject} {predicate} {new_value}\n\n\
         Answer with exactly YES or NO. Nothing else."
    )
}

/// Prompt for judging whether category summaries suffice to answer a query.
#[must_use]
pub fn sufficiency_check(query: &str, summaries: &str) -> String {
    format!(
        "Given a user query and retrieved memory summaries, determine if the summaries\n\
         contain enough information to fully answer the query.\n\n\
         Query: {query}\n\n\
         Retrieved summaries:\n{summaries}\n\n\
         Answer with exactly YES or NO. Nothing else."
    )
}

/// Prompt for selecting the categories relevant to a query.
#[must_use]
pub fn select_categories(query: &str, categories: &str) -> String {
    format!(
        "Given a user query, select which memory categories are most likely to contain relevant information.\n\n\
         Query: {query}\n\n\
         Available categories:\n{categories}\n\n\
         Return a JSON array of category name strings that are relevant to this query.\n\
         If unsure, include more rather than fewer.\n\n\
         Return ONLY valid JSON, no other text."
    )
}

/// Prompt for filtering graph predicates down to the query-relevant set.
#[must_use]
pub fn filter_predicates(query: &str, predicates: &str) -> String {
    format!(
        "Given a user query and a list of predicates from a knowledge graph,\n\
         select which predicates are most relevant to answer the query.\n\n\
         Query: {query}\n\
         Available predicates:\n{predicates}\n\n\
         Return a JSON array of predicate strings to include.\n\
         If unsure, include more rather than fewer.\n\n\
         Return ONLY valid JSON, no other text."
    )
}

/// Prompt for resolving query text to a set of entity names.
#[must_use]
pub fn extract_entities(query: &str) -> String {
    format!(
        "Extract entity names from this query. Return a JSON array of strings.\n\n\
         Query: {query}\n\n\
         Return ONLY valid JSON."
    )
}

/// Prompt for rewriting a user message into an optimized search query.
#[must_use]
pub fn generate_query(message: &str) -> String {
    format!(
        "Convert this user message into an optimized search query for retrieving relevant memories.\n\
         Focus on the key concepts, entities, and intent.\n\n\
         User message: {message}\n\n\
         Return ONLY the search query string, no quotes, no explanation."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_inputs() {
        assert!(extract_facts("I like tea").contains("I like tea"));
        assert!(detect_conflict("User", "works_at", "OpenAI", "- User works_at Google")
            .contains("User works_at OpenAI"));
        assert!(filter_predicates("where does she work", "- works_at").contains("- works_at"));
        assert!(digest_facts("work", "- shipped v2").contains("\"work\""));
    }
}
