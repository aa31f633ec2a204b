// Prompt fragments shared by every LLM caller.
// Task-specific prompts live next to the code that sends them.

/// Closing instruction for prompts whose reply is parsed as JSON.
pub const JSON_ONLY_SUFFIX: &str = "Return ONLY the JSON, no additional text.";

/// Closing instruction for prompts whose reply is a JSON array of URLs.
pub const URL_ARRAY_ONLY_SUFFIX: &str =
    "Return ONLY the JSON array, without explanations or additional text.";
