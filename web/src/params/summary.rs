use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct SummarizeParams {
    pub(crate) text: String,
    /// Language code the summary is written in
    #[serde(default = "default_language")]
    #[schema(default = "en")]
    pub(crate) language: String,
}

fn default_language() -> String {
    "en".to_owned()
}
