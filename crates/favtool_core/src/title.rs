use anyhow::{Result, bail};

/// Characters that can never appear in a page title.
const FORBIDDEN_TITLE_CHARS: &[char] = &['#', '<', '>', '[', ']', '|', '{', '}'];

/// Canonical namespaces with their MediaWiki numeric ids. Talk namespaces
/// sit at subject id + 1; virtual namespaces have negative ids and never
/// correspond to stored pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Media,
    Special,
    Main,
    Talk,
    User,
    UserTalk,
    Project,
    ProjectTalk,
    File,
    FileTalk,
    MediaWiki,
    MediaWikiTalk,
    Template,
    TemplateTalk,
    Help,
    HelpTalk,
    Category,
    CategoryTalk,
}

const ALL_NAMESPACES: &[Namespace] = &[
    Namespace::Media,
    Namespace::Special,
    Namespace::Main,
    Namespace::Talk,
    Namespace::User,
    Namespace::UserTalk,
    Namespace::Project,
    Namespace::ProjectTalk,
    Namespace::File,
    Namespace::FileTalk,
    Namespace::MediaWiki,
    Namespace::MediaWikiTalk,
    Namespace::Template,
    Namespace::TemplateTalk,
    Namespace::Help,
    Namespace::HelpTalk,
    Namespace::Category,
    Namespace::CategoryTalk,
];

impl Namespace {
    pub fn id(self) -> i32 {
        match self {
            Self::Media => -2,
            Self::Special => -1,
            Self::Main => 0,
            Self::Talk => 1,
            Self::User => 2,
            Self::UserTalk => 3,
            Self::Project => 4,
            Self::ProjectTalk => 5,
            Self::File => 6,
            Self::FileTalk => 7,
            Self::MediaWiki => 8,
            Self::MediaWikiTalk => 9,
            Self::Template => 10,
            Self::TemplateTalk => 11,
            Self::Help => 12,
            Self::HelpTalk => 13,
            Self::Category => 14,
            Self::CategoryTalk => 15,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        ALL_NAMESPACES
            .iter()
            .copied()
            .find(|namespace| namespace.id() == id)
    }

    /// Canonical prefix text without the trailing colon. Main is unprefixed.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Media => "Media",
            Self::Special => "Special",
            Self::Main => "",
            Self::Talk => "Talk",
            Self::User => "User",
            Self::UserTalk => "User talk",
            Self::Project => "Project",
            Self::ProjectTalk => "Project talk",
            Self::File => "File",
            Self::FileTalk => "File talk",
            Self::MediaWiki => "MediaWiki",
            Self::MediaWikiTalk => "MediaWiki talk",
            Self::Template => "Template",
            Self::TemplateTalk => "Template talk",
            Self::Help => "Help",
            Self::HelpTalk => "Help talk",
            Self::Category => "Category",
            Self::CategoryTalk => "Category talk",
        }
    }

    /// Resolve a namespace from prefix text. Matching is case-insensitive
    /// and treats underscores as spaces; legacy aliases are accepted.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        let normalized = prefix.trim().replace('_', " ");
        for namespace in ALL_NAMESPACES {
            if !namespace.canonical_name().is_empty()
                && normalized.eq_ignore_ascii_case(namespace.canonical_name())
            {
                return Some(*namespace);
            }
        }
        if normalized.eq_ignore_ascii_case("Image") {
            return Some(Self::File);
        }
        if normalized.eq_ignore_ascii_case("Image talk") {
            return Some(Self::FileTalk);
        }
        None
    }

    pub fn is_talk(self) -> bool {
        self.id() >= 0 && self.id() % 2 == 1
    }

    /// Virtual namespaces (Special, Media) never have stored pages.
    pub fn is_virtual(self) -> bool {
        self.id() < 0
    }

    /// The subject namespace: talk maps to subject - 1, everything else to
    /// itself. Virtual namespaces have no talk pages and return themselves.
    pub fn subject(self) -> Self {
        if self.is_talk() {
            Self::from_id(self.id() - 1).unwrap_or(self)
        } else {
            self
        }
    }
}

/// A parsed, normalized page title: a namespace plus display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    namespace: Namespace,
    text: String,
}

impl Title {
    /// Parse user input into a normalized title. Underscores become spaces,
    /// repeated whitespace collapses, the first letter of the page text is
    /// capitalized, and a recognized namespace prefix is split off. Unknown
    /// prefixes stay part of a main-namespace title.
    pub fn parse(input: &str) -> Result<Self> {
        let spaced = input.replace('_', " ");
        let mut candidate = spaced.trim();
        // A single leading colon forces the main-namespace reading.
        let forced_main = candidate.starts_with(':');
        if forced_main {
            candidate = candidate[1..].trim_start();
        }
        if candidate.is_empty() {
            bail!("title is empty");
        }
        if let Some(bad) = candidate.chars().find(|ch| FORBIDDEN_TITLE_CHARS.contains(ch)) {
            bail!("title contains forbidden character {bad:?}: {input}");
        }

        let (namespace, rest) = match candidate.split_once(':') {
            Some((prefix, rest)) if !forced_main => match Namespace::from_prefix(prefix) {
                Some(namespace) => (namespace, rest),
                None => (Namespace::Main, candidate),
            },
            _ => (Namespace::Main, candidate),
        };

        let text = normalize_page_text(rest);
        if text.is_empty() {
            bail!("title has no page text: {input}");
        }
        Ok(Self { namespace, text })
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Display text without the namespace prefix.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Storage key form: page text with spaces replaced by underscores.
    pub fn db_key(&self) -> String {
        self.text.replace(' ', "_")
    }

    /// Display form including the canonical namespace prefix.
    pub fn prefixed_text(&self) -> String {
        if self.namespace == Namespace::Main {
            self.text.clone()
        } else {
            format!("{}:{}", self.namespace.canonical_name(), self.text)
        }
    }

    pub fn subject_namespace(&self) -> Namespace {
        self.namespace.subject()
    }

    pub fn is_virtual(&self) -> bool {
        self.namespace.is_virtual()
    }
}

fn normalize_page_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
