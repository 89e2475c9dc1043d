//! Prompt templates for answering questions over retrieved table rows.

/// Instructions sent with every answer request. The formatting rules keep
/// model output consistent for the dashboard rendering the answers.
pub const SYSTEM_PROMPT: &str = "You are a business intelligence analyst. Use the following context to answer the question.\n- Always reference specific numbers from the data\n- If unsure, say \"I don't have enough data to answer that\"\n- Format numbers with commas (e.g., 15000 → 15,000)\n- For dates, use DD-MM-YYYY format\n- Highlight key trends in bold";

/// Builds the user message for one question: analyst instructions, the
/// retrieved context, then the question itself.
pub fn build_user_prompt(context: &str, query: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\nAnswer (markdown supported):",
        SYSTEM_PROMPT, context, query
    )
}
