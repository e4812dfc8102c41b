use thiserror::Error;
use tracing::info;

use crate::llm_client::{GenerateOptions, LlmClient, LlmError};
use crate::models::profile::Profile;
use crate::profiles::prompts::extraction_prompt;

/// Shorter inputs are rejected before calling the model.
pub const MIN_INPUT_CHARS: usize = 50;

/// Written into `name` when the model finds none.
pub const UNNAMED_PROFILE: &str = "Nome Non Specificato";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("input too short: {got} characters, at least {min} required")]
    TooShort { min: usize, got: usize },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Asks the LLM to turn free CV text into a profile.
///
/// The result is a preview; nothing is persisted here.
pub async fn extract_profile(llm: &LlmClient, text: &str) -> Result<Profile, ExtractError> {
    let text = text.trim();
    let got = text.chars().count();
    if got < MIN_INPUT_CHARS {
        return Err(ExtractError::TooShort {
            min: MIN_INPUT_CHARS,
            got,
        });
    }

    let mut profile: Profile = llm
        .call_json(&extraction_prompt(text), &GenerateOptions::extraction())
        .await?;
    profile = profile.normalized();
    if profile.name.is_empty() {
        profile.name = UNNAMED_PROFILE.to_string();
    }

    info!(name = %profile.name, input_chars = got, "profile extracted");
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    const CV_TEXT: &str = "Anna Bianchi, data engineer con esperienza in Python, Spark e AWS presso Reply dal 2019.";

    fn client(server: &MockServer) -> LlmClient {
        LlmClient::new(server.base_url(), "llama3.2:3b".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_retry_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_extracts_profile_from_chatty_output() {
        let server = MockServer::start_async().await;
        let answer = r#"Ecco il risultato:
{"name": "Anna Bianchi", "title": "Data Engineer", "skills": ["Python", "Spark", "Python"],
 "technologies": ["AWS"], "experience": [{"company": "Reply", "period": "2019-present",
 "description": "Pipeline dati", "location": "Milano"}],
 "education": {"degree": "", "year": ""}, "languages": ["Italiano"]}"#;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .body_includes("Anna Bianchi, data engineer");
                then.status(200).json_body(json!({ "response": answer }));
            })
            .await;

        let profile = extract_profile(&client(&server), CV_TEXT).await.unwrap();
        assert_eq!(profile.name, "Anna Bianchi");
        assert_eq!(profile.skills, vec!["Python", "Spark"]);
        assert_eq!(profile.experience[0].company, "Reply");
        assert_eq!(profile.education.year, None);
    }

    #[tokio::test]
    async fn test_missing_name_gets_placeholder() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "{\"name\": \"\", \"skills\": [\"SQL\"]}" }));
            })
            .await;

        let profile = extract_profile(&client(&server), CV_TEXT).await.unwrap();
        assert_eq!(profile.name, UNNAMED_PROFILE);
    }

    #[tokio::test]
    async fn test_short_input_never_reaches_the_model() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({ "response": "{}" }));
            })
            .await;

        let err = extract_profile(&client(&server), "troppo corto").await.unwrap_err();
        assert!(matches!(err, ExtractError::TooShort { min: 50, got: 12 }));
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_non_json_answer_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "Non riesco a leggere il CV." }));
            })
            .await;

        let err = extract_profile(&client(&server), CV_TEXT).await.unwrap_err();
        assert!(matches!(err, ExtractError::Llm(LlmError::NoJson)));
    }
}
