//! The page-bound entry point for favoriting and unfavoriting. A single
//! component parameterized by direction; the direction fixes the action
//! name, the machine-readable label, and the confirmation message key.

use anyhow::Result;
use rusqlite::Connection;

use crate::cache;
use crate::messages;
use crate::session::UserContext;
use crate::store::{self, Direction};
use crate::title::Title;

/// Render target the host hands to an action; collects the localized
/// messages the action emits during `run`.
#[derive(Debug, Default)]
pub struct PageOutput {
    blocks: Vec<String>,
}

impl PageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a message key into the output, returning the rendered text.
    pub fn add_wiki_msg(&mut self, key: &str, args: &[&str]) -> String {
        let rendered = messages::render(key, args);
        self.blocks.push(rendered.clone());
        rendered
    }

    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }
}

/// Outcome of one action invocation. `changed` is the exact affected-row
/// signal from the store; the rendered message is whatever `run` emitted,
/// confirmation or error.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub changed: bool,
    pub message_key: &'static str,
    pub rendered_message: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PageAction {
    direction: Direction,
}

impl PageAction {
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }

    /// Action name as the host addresses it.
    pub fn name(&self) -> &'static str {
        match self.direction {
            Direction::Favorite => "favorite",
            Direction::Unfavorite => "unfavorite",
        }
    }

    /// Stable past-tense tag for downstream consumers; also the presence
    /// key in the API payload.
    pub fn action_label(&self) -> &'static str {
        match self.direction {
            Direction::Favorite => "favorited",
            Direction::Unfavorite => "unfavorited",
        }
    }

    pub fn confirmation_message_key(&self) -> &'static str {
        match self.direction {
            Direction::Favorite => "addedfavoritetext",
            Direction::Unfavorite => "removedfavoritetext",
        }
    }

    /// Run the toggle against the resolved page for the acting user.
    ///
    /// The title's talk variant normalizes to its subject namespace
    /// before the store is touched, so toggling `Talk:X` and `X` are the
    /// same operation. On an actual state change the confirmation message
    /// goes to the output and the user's favorites cache is invalidated;
    /// on no change the generic error message goes to the output instead.
    /// Store failures propagate as errors.
    pub fn run(
        &self,
        connection: &Connection,
        user: &UserContext,
        title: &Title,
        output: &mut PageOutput,
    ) -> Result<ActionOutcome> {
        let subject = title.subject_namespace();
        let changed = store::toggle(
            connection,
            subject.id(),
            &title.db_key(),
            user.id,
            self.direction,
        )?;

        let prefixed = title.prefixed_text();
        let (message_key, rendered_message) = if changed {
            let key = self.confirmation_message_key();
            let rendered = output.add_wiki_msg(key, &[&prefixed]);
            cache::invalidate_user(user.id);
            (key, rendered)
        } else {
            let rendered = output.add_wiki_msg("favoriteerrortext", &[&prefixed]);
            ("favoriteerrortext", rendered)
        };

        Ok(ActionOutcome {
            changed,
            message_key,
            rendered_message,
        })
    }
}
