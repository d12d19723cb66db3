//! Fixed names and limits.

//------------ Collection layout ---------------------------------------------

pub const COL_USERS: &str = "users";
pub const COL_SOCIAL: &str = "social";
pub const COL_PANTRY: &str = "pantry";
pub const DOC_FRIENDS: &str = "friends";
pub const DOC_REQUESTS: &str = "requests";
pub const DOC_ITEMS: &str = "items";
pub const DOC_CACHE: &str = "cache";

//------------ Storage -------------------------------------------------------

/// Attempts before an optimistic transaction gives up on conflicts.
pub const TXN_MAX_ATTEMPTS: usize = 10;

/// Documents deleted per batch during a subtree walk.
pub const SUBTREE_DELETE_BATCH: usize = 250;

//------------ Recipe lookup -------------------------------------------------

pub const RECIPE_API_BASE_URI: &str = "https://api.spoonacular.com";

pub const INGREDIENT_SUGGESTION_LIMIT: u32 = 10;

pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 120;

//------------ Environment variables -----------------------------------------

pub const PANTRYSYNC_ENV_LOG_LEVEL: &str = "PANTRYSYNC_LOG_LEVEL";
pub const PANTRYSYNC_ENV_RECIPE_API_KEY: &str = "PANTRYSYNC_RECIPE_API_KEY";
