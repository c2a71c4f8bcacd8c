//! Prompt builders
//!
//! System prompt embedding the schema text and dialect rules, plus the user
//! message carrying the question and, on retries, the prior execution error
//! as corrective context.

/// System prompt grounding the model in the store schema and dialect.
pub fn build_system_prompt(schema_text: &str) -> String {
    format!(
        r#"You are an expert data analyst. Your task is to translate natural
language questions from managers into valid PostgreSQL SELECT queries.

RULES:
1. Generate only SELECT queries. Never write INSERT, UPDATE, DELETE, ALTER, DROP or TRUNCATE.
2. Use only the tables and columns listed in the schema below.
3. Do not end the query with a semicolon.
4. For row limiting use 'FETCH FIRST n ROWS ONLY'. Never use LIMIT or SELECT TOP.
5. When counting people prefer COUNT or SUM over listing individual names.
6. When grouping is requested, use GROUP BY and order by the aggregate descending.
7. Use UPPER() for case-insensitive text comparisons.

DATABASE SCHEMA:
{schema_text}

OUTPUT FORMAT (JSON):
Return only a JSON object in exactly this form:
{{
  "sql": "SELECT ... FROM ... WHERE ...",
  "explanation": "Briefly explain what the query does."
}}
"#
    )
}

/// User message: the question, plus the prior error when retrying.
pub fn build_user_content(question: &str, prior_error: Option<&str>) -> String {
    let mut content = format!("Question: {question}");
    if let Some(error) = prior_error {
        content.push_str(&format!(
            "\n\nThe previous SQL did not run and failed with this error: {error}. \
             Please correct the query so it is valid PostgreSQL."
        ));
    }
    content
}
