//! Client for the third-party recipe lookup service.
//!
//! Stateless request/response passthrough: the engine keeps no recipe
//! data, it only forwards lookups and translates errors. The provider
//! wants its API key on every call as a query parameter.

use std::time::Duration;
use std::{env, fmt};

use reqwest::Response;
use serde::Deserialize;

use crate::config::Config;
use crate::constants::{
    HTTP_CLIENT_TIMEOUT_SECS, INGREDIENT_SUGGESTION_LIMIT, PANTRYSYNC_ENV_RECIPE_API_KEY,
};

//------------ RecipeClient --------------------------------------------------

#[derive(Clone, Debug)]
pub struct RecipeClient {
    base_uri: String,
    api_key: String,
    client: reqwest::Client,
}

impl RecipeClient {
    /// Builds a client from the configuration.
    ///
    /// The API key comes from the config file or, failing that, from
    /// the environment. A missing key fails here rather than on every
    /// call.
    pub fn build(config: &Config) -> Result<Self, Error> {
        let api_key = config
            .recipe_api_key
            .clone()
            .or_else(|| env::var(PANTRYSYNC_ENV_RECIPE_API_KEY).ok())
            .ok_or(Error::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::request("<client setup>", e))?;

        Ok(RecipeClient {
            base_uri: config.recipe_api_base_uri.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Finds recipes that can be made from the given ingredients.
    ///
    /// Recipes are ranked to maximize used ingredients, restricted to
    /// openly licensed ones, and typical pantry staples (water, salt,
    /// flour) are ignored by the provider.
    pub async fn find_by_ingredients(&self, ingredients: &[String]) -> Result<Vec<Recipe>, Error> {
        let uri = format!("{}/recipes/findByIngredients", self.base_uri);
        let ingredients = ingredients.join(",");
        let res = self
            .client
            .get(&uri)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("ingredients", ingredients.as_str()),
                ("limitLicense", "true"),
                ("ranking", "1"),
                ("ignorePantry", "true"),
            ])
            .send()
            .await
            .map_err(|e| Error::request(&uri, e))?;

        process_json_response(&uri, res).await
    }

    /// Completes a partial ingredient name into suggestions.
    pub async fn ingredient_suggestions(&self, query: &str) -> Result<Vec<String>, Error> {
        let uri = format!("{}/food/ingredients/autocomplete", self.base_uri);
        let number = INGREDIENT_SUGGESTION_LIMIT.to_string();
        let res = self
            .client
            .get(&uri)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("query", query),
                ("number", number.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::request(&uri, e))?;

        let suggestions: Vec<IngredientSuggestion> = process_json_response(&uri, res).await?;
        Ok(suggestions.into_iter().map(|s| s.name).collect())
    }
}

/// Turns a provider response into the expected type, or into an error
/// carrying the provider's status and body.
async fn process_json_response<T: serde::de::DeserializeOwned>(
    uri: &str,
    res: Response,
) -> Result<T, Error> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(Error::ErrorResponse {
            uri: uri.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    let body = res.text().await.map_err(|e| Error::request(uri, e))?;
    serde_json::from_str(&body).map_err(|e| Error::response(uri, e))
}

//------------ Recipe --------------------------------------------------------

/// One recipe as the provider returns it.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub used_ingredient_count: u32,
    #[serde(default)]
    pub missed_ingredient_count: u32,
}

#[derive(Clone, Debug, Deserialize)]
struct IngredientSuggestion {
    name: String,
}

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    MissingApiKey,
    RequestFailed {
        uri: String,
        error: String,
    },
    ErrorResponse {
        uri: String,
        status: u16,
        body: String,
    },
    InvalidResponse {
        uri: String,
        error: String,
    },
}

impl Error {
    fn request(uri: &str, error: impl fmt::Display) -> Self {
        Error::RequestFailed {
            uri: uri.to_string(),
            error: error.to_string(),
        }
    }

    fn response(uri: &str, error: impl fmt::Display) -> Self {
        Error::InvalidResponse {
            uri: uri.to_string(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingApiKey => {
                write!(
                    f,
                    "no recipe API key configured. Set \"recipe_api_key\" in the config file, \
                     or the {} environment variable.",
                    PANTRYSYNC_ENV_RECIPE_API_KEY
                )
            }
            Error::RequestFailed { uri, error } => {
                write!(f, "request to '{}' failed: {}", uri, error)
            }
            Error::ErrorResponse { uri, status, body } => {
                write!(f, "'{}' answered with status {}: {}", uri, status, body)
            }
            Error::InvalidResponse { uri, error } => {
                write!(f, "cannot parse response from '{}': {}", uri, error)
            }
        }
    }
}

impl std::error::Error for Error {}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_provider_recipe_list() {
        let body = r#"[
            {
                "id": 673463,
                "title": "Slow Cooker Apple Pork Tenderloin",
                "image": "https://img.spoonacular.com/recipes/673463-312x231.jpg",
                "usedIngredientCount": 2,
                "missedIngredientCount": 3
            },
            {
                "id": 633547,
                "title": "Baked Cinnamon Apple Slices",
                "usedIngredientCount": 1,
                "missedIngredientCount": 1
            }
        ]"#;

        let recipes: Vec<Recipe> = serde_json::from_str(body).unwrap();
        assert_eq!(recipes.len(), 2);
        assert_eq!(recipes[0].id, 673463);
        assert_eq!(recipes[0].used_ingredient_count, 2);
        assert!(recipes[1].image.is_none());
    }

    #[test]
    fn decodes_ingredient_suggestions() {
        let body = r#"[{"name": "apple"}, {"name": "applesauce"}]"#;
        let suggestions: Vec<IngredientSuggestion> = serde_json::from_str(body).unwrap();
        assert_eq!(suggestions[0].name, "apple");
        assert_eq!(suggestions[1].name, "applesauce");
    }
}
