//! The programmatic entry point: the `action=favorite` API module.
//! Validates identity and parameters, resolves the title, drives the page
//! action, and shapes the module payload or a coded error.

use std::fmt;

use rusqlite::Connection;
use serde_json::{Map, Value, json};

use crate::action::{PageAction, PageOutput};
use crate::messages;
use crate::session::UserContext;
use crate::store::Direction;
use crate::title::Title;

pub const MODULE_NAME: &str = "favorite";
pub const HELP_URL: &str = "https://www.mediawiki.org/wiki/Special:MyLanguage/Extension:Favorites";

/// Incoming request parameters, already extracted from the transport.
#[derive(Debug, Clone, Default)]
pub struct FavoriteRequest {
    pub title: Option<String>,
    pub unfavorite: bool,
}

impl FavoriteRequest {
    /// Whether a declared parameter was supplied. Presence, not validity:
    /// the boolean flag counts as present only when set, matching how the
    /// wire form omits unset flags.
    fn has_param(&self, name: &str) -> bool {
        match name {
            "title" => self.title.is_some(),
            "unfavorite" => self.unfavorite,
            _ => false,
        }
    }
}

/// Errors the module surfaces to callers, each with a stable code.
#[derive(Debug)]
pub enum ApiError {
    NotLoggedIn,
    MissingParam(&'static str),
    InvalidTitle(String),
    HookAborted,
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotLoggedIn => "notloggedin",
            Self::MissingParam(_) => "missingparam",
            Self::InvalidTitle(_) => "invalidtitle",
            Self::HookAborted => "hookaborted",
            Self::Internal(_) => "internal_api_error",
        }
    }

    pub fn info(&self) -> String {
        match self {
            Self::NotLoggedIn => messages::render("notloggedin-favorites", &[]),
            Self::MissingParam(name) => format!("The \"{name}\" parameter must be set."),
            Self::InvalidTitle(title) => format!("Bad title \"{title}\"."),
            Self::HookAborted => {
                "The modification you tried to make was aborted by an extension.".to_string()
            }
            Self::Internal(source) => format!("Internal error: {source:#}"),
        }
    }

    /// The MediaWiki-style error envelope: `{"error": {"code", "info"}}`.
    pub fn envelope(&self) -> Value {
        json!({ "error": { "code": self.code(), "info": self.info() } })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.info())
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Internal(source) => source.source(),
            _ => None,
        }
    }
}

/// This module writes the database: callers must submit it over a
/// state-changing transport, not a read-only fetch.
pub fn must_be_posted() -> bool {
    true
}

pub fn is_write_mode() -> bool {
    true
}

// TODO: require a csrf token for write requests; token validation has
// never been wired up for this module.
pub fn needs_token() -> bool {
    false
}

/// Parameter surface for help output and validation.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

pub fn allowed_params() -> &'static [ParamSpec] {
    &[
        ParamSpec {
            name: "title",
            required: true,
            description: "The page to (un)favorite",
        },
        ParamSpec {
            name: "unfavorite",
            required: false,
            description: "If set the page will be unfavorited rather than favorited",
        },
    ]
}

pub fn examples() -> &'static [(&'static str, &'static str)] {
    &[
        (
            "api.php?action=favorite&title=Main_Page",
            "Favorite the page \"Main Page\"",
        ),
        (
            "api.php?action=favorite&title=Main_Page&unfavorite=",
            "Unfavorite the page \"Main Page\"",
        ),
    ]
}

/// The module described as structured data, the way the host's help
/// subsystem introspects modules.
pub fn module_metadata() -> Value {
    let parameters: Vec<Value> = allowed_params()
        .iter()
        .map(|param| {
            json!({
                "name": param.name,
                "required": param.required,
                "description": param.description,
            })
        })
        .collect();
    let examples: Vec<Value> = examples()
        .iter()
        .map(|(query, description)| json!({ "query": query, "description": description }))
        .collect();
    json!({
        "name": MODULE_NAME,
        "mustbeposted": must_be_posted(),
        "writemode": is_write_mode(),
        "needstoken": needs_token(),
        "helpurls": [HELP_URL],
        "parameters": parameters,
        "examples": examples,
    })
}

/// Execute the module for the acting user.
///
/// Ordering is part of the contract: the identity check comes first, then
/// parameter validation against the declared parameter surface, then title
/// resolution; the store is only reached by a fully validated request. The
/// success payload carries the prefixed title, a presence flag named after
/// the action label, and the confirmation message as block-level markup.
pub fn execute(
    connection: &Connection,
    user: &UserContext,
    request: &FavoriteRequest,
) -> Result<Value, ApiError> {
    if !user.is_registered() {
        return Err(ApiError::NotLoggedIn);
    }

    for param in allowed_params() {
        if param.required && !request.has_param(param.name) {
            return Err(ApiError::MissingParam(param.name));
        }
    }
    let raw_title = request
        .title
        .as_deref()
        .ok_or(ApiError::MissingParam("title"))?;
    let title = Title::parse(raw_title)
        .map_err(|_| ApiError::InvalidTitle(raw_title.to_string()))?;
    if title.is_virtual() {
        return Err(ApiError::InvalidTitle(raw_title.to_string()));
    }

    let direction = if request.unfavorite {
        Direction::Unfavorite
    } else {
        Direction::Favorite
    };
    let action = PageAction::new(direction);
    let mut output = PageOutput::new();
    let outcome = action
        .run(connection, user, &title, &mut output)
        .map_err(ApiError::Internal)?;
    if !outcome.changed {
        return Err(ApiError::HookAborted);
    }

    let mut payload = Map::new();
    payload.insert("title".to_string(), json!(title.prefixed_text()));
    payload.insert(action.action_label().to_string(), json!(""));
    payload.insert(
        "message".to_string(),
        json!(messages::parse_as_block(&outcome.rendered_message)),
    );
    Ok(Value::Object(payload))
}

/// Wrap a module payload under the module name, the way the host API
/// frames its result body.
pub fn wrap_module(payload: Value) -> Value {
    json!({ MODULE_NAME: payload })
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{
        ApiError, FavoriteRequest, execute, is_write_mode, module_metadata, must_be_posted,
        needs_token, wrap_module,
    };
    use crate::session::UserContext;
    use crate::store::{Direction, count_favorites, is_favorited, run_migrations, toggle};

    fn memory_store() -> Connection {
        let connection = Connection::open_in_memory().expect("open in-memory db");
        run_migrations(&connection).expect("migrate");
        connection
    }

    fn request(title: &str, unfavorite: bool) -> FavoriteRequest {
        FavoriteRequest {
            title: Some(title.to_string()),
            unfavorite,
        }
    }

    #[test]
    fn favorite_main_page_returns_presence_flag_and_message() {
        let connection = memory_store();
        let user = UserContext::registered(7, "Alice");

        let payload = execute(&connection, &user, &request("Main_Page", false)).expect("execute");
        assert_eq!(payload["title"], "Main Page");
        assert_eq!(payload["favorited"], "");
        assert!(payload.get("unfavorited").is_none());
        let message = payload["message"].as_str().expect("message");
        assert!(message.starts_with("<p>"));
        assert!(message.contains("added to your favorites"));

        assert!(is_favorited(&connection, 7, 0, "Main_Page").expect("row"));
    }

    #[test]
    fn unfavorite_after_favorite_removes_row() {
        let connection = memory_store();
        let user = UserContext::registered(7, "Alice");
        toggle(&connection, 0, "Main_Page", 7, Direction::Favorite).expect("seed");

        let payload = execute(&connection, &user, &request("Main_Page", true)).expect("execute");
        assert_eq!(payload["unfavorited"], "");
        assert!(payload.get("favorited").is_none());
        assert_eq!(count_favorites(&connection, 7).expect("count"), 0);
    }

    #[test]
    fn unfavorite_of_never_favorited_page_aborts() {
        let connection = memory_store();
        let user = UserContext::registered(7, "Alice");

        let error = execute(&connection, &user, &request("Main_Page", true)).expect_err("abort");
        assert!(matches!(error, ApiError::HookAborted));
        assert_eq!(error.code(), "hookaborted");
        assert_eq!(count_favorites(&connection, 7).expect("count"), 0);
    }

    #[test]
    fn anonymous_caller_is_rejected_before_the_store() {
        // No schema at all: a store access would fail loudly, so getting
        // NotLoggedIn back proves the store was never reached.
        let connection = Connection::open_in_memory().expect("open");
        let user = UserContext::anonymous();

        let error = execute(&connection, &user, &request("Main_Page", false)).expect_err("reject");
        assert!(matches!(error, ApiError::NotLoggedIn));
        assert_eq!(error.code(), "notloggedin");
    }

    #[test]
    fn missing_title_parameter_fails_before_the_store() {
        let connection = Connection::open_in_memory().expect("open");
        let user = UserContext::registered(7, "Alice");

        let error = execute(&connection, &user, &FavoriteRequest::default()).expect_err("reject");
        assert!(matches!(error, ApiError::MissingParam("title")));
        assert_eq!(error.code(), "missingparam");
    }

    #[test]
    fn unparsable_and_virtual_titles_are_invalid() {
        let connection = Connection::open_in_memory().expect("open");
        let user = UserContext::registered(7, "Alice");

        let error =
            execute(&connection, &user, &request("Main#Page", false)).expect_err("bad chars");
        assert!(matches!(error, ApiError::InvalidTitle(_)));

        let error = execute(&connection, &user, &request("Special:RecentChanges", false))
            .expect_err("virtual namespace");
        assert!(matches!(error, ApiError::InvalidTitle(_)));
        assert_eq!(error.code(), "invalidtitle");
    }

    #[test]
    fn talk_title_favorites_the_subject_page() {
        let connection = memory_store();
        let user = UserContext::registered(7, "Alice");

        execute(&connection, &user, &request("Talk:Main Page", false)).expect("execute");
        assert!(is_favorited(&connection, 7, 0, "Main_Page").expect("subject row"));
        assert_eq!(count_favorites(&connection, 7).expect("count"), 1);
    }

    #[test]
    fn storage_failure_maps_to_internal_error() {
        // Registered user, valid title, but no schema behind the
        // connection: the toggle itself fails.
        let connection = Connection::open_in_memory().expect("open");
        let user = UserContext::registered(7, "Alice");

        let error = execute(&connection, &user, &request("Main_Page", false)).expect_err("fail");
        assert!(matches!(error, ApiError::Internal(_)));
        assert_eq!(error.code(), "internal_api_error");
    }

    #[test]
    fn wrap_module_frames_payload_under_module_name() {
        let connection = memory_store();
        let user = UserContext::registered(7, "Alice");
        let payload = execute(&connection, &user, &request("Main_Page", false)).expect("execute");

        let body = wrap_module(payload);
        assert_eq!(body["favorite"]["title"], "Main Page");
        assert_eq!(body["favorite"]["favorited"], "");
    }

    #[test]
    fn module_is_a_post_only_write_module_without_a_token() {
        assert!(must_be_posted());
        assert!(is_write_mode());
        // Token validation is still unwired; pin the gap so closing it is
        // a deliberate contract change.
        assert!(!needs_token());
    }

    #[test]
    fn metadata_describes_the_parameter_surface() {
        let metadata = module_metadata();
        assert_eq!(metadata["name"], "favorite");
        assert_eq!(metadata["mustbeposted"], true);
        assert_eq!(metadata["writemode"], true);
        assert_eq!(metadata["needstoken"], false);

        let parameters = metadata["parameters"].as_array().expect("parameters");
        let title = parameters
            .iter()
            .find(|param| param["name"] == "title")
            .expect("title parameter");
        assert_eq!(title["required"], true);
        let unfavorite = parameters
            .iter()
            .find(|param| param["name"] == "unfavorite")
            .expect("unfavorite parameter");
        assert_eq!(unfavorite["required"], false);

        assert!(!metadata["examples"].as_array().expect("examples").is_empty());
        assert!(!metadata["helpurls"].as_array().expect("helpurls").is_empty());
    }

    #[test]
    fn required_parameter_check_follows_the_declared_surface() {
        // The only required parameter is the title; a request carrying it
        // and nothing else passes validation all the way to the store.
        let connection = memory_store();
        let user = UserContext::registered(7, "Alice");

        let error = execute(&connection, &user, &FavoriteRequest::default()).expect_err("reject");
        assert!(matches!(error, ApiError::MissingParam("title")));

        execute(&connection, &user, &request("Main_Page", false)).expect("title alone suffices");
    }

    #[test]
    fn error_envelope_is_machine_readable() {
        let envelope = ApiError::NotLoggedIn.envelope();
        assert_eq!(envelope["error"]["code"], "notloggedin");
        assert!(
            envelope["error"]["info"]
                .as_str()
                .expect("info")
                .contains("logged in")
        );
    }
}
