use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewLobbySchema {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(range(min = 1, max = 64))]
    pub max_players: u32,
    pub is_public: bool,
    #[validate(length(min = 1, max = 32))]
    pub text_category: String,
    /// Generated from the category if left out
    #[validate(length(max = 4096))]
    pub text: Option<String>,
    /// The host's display name, defaults to the lobby name
    #[validate(length(min = 1, max = 32))]
    pub player_name: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinByCodeSchema {
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    #[validate(length(min = 1, max = 32))]
    pub display_name: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinSchema {
    #[validate(length(min = 1, max = 32))]
    pub display_name: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuickPlaySchema {
    #[validate(length(min = 1, max = 32))]
    pub player_name: String,
    #[validate(length(min = 1, max = 32))]
    pub text_category: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadySchema {
    pub is_ready: bool,
}

/// Progress is clamped to 0..=100, everything else is stored as reported
#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgressSchema {
    pub progress: f64,
    pub wpm: f64,
    pub accuracy: f64,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FinishSchema {
    #[validate(range(min = 0.0))]
    pub wpm: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub accuracy: f64,
    /// In seconds
    #[validate(range(min = 0.0))]
    pub time_taken: f64,
    pub error_count: u32,
    pub total_characters: u32,
    pub consistency: f64,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lobby_schema_reads_camel_case() {
        let schema: NewLobbySchema = serde_json::from_str(
            r#"{"name":"Friday","maxPlayers":4,"isPublic":true,"textCategory":"quotes"}"#,
        )
        .unwrap();

        assert_eq!(schema.max_players, 4);
        assert!(schema.text.is_none());
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let schema: NewLobbySchema = serde_json::from_str(
            r#"{"name":"Friday","maxPlayers":0,"isPublic":true,"textCategory":"quotes"}"#,
        )
        .unwrap();

        assert!(schema.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<JoinSchema>(r#"{"displayName":"Bob","admin":true}"#);
        assert!(result.is_err());
    }
}
