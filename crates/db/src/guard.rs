//! Read-only query guard.
//!
//! Queries proposed by the data-fetch agent pass through [`QueryGuard::validate`]
//! and [`QueryGuard::enforce_row_cap`] before they reach the pool. The keyword
//! check is a denylist over the raw text, not a SQL parser: comment tricks,
//! encoded keywords, or dialect-specific side-effecting functions are not caught
//! here. The pool's `query_only` pragma is the backstop.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use copilot_core::config::{GuardConfig, RowCapStyle, DEFAULT_ROW_LIMIT};
use regex::{NoExpand, Regex};
use thiserror::Error;

pub const DENYLISTED_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "truncate", "merge", "exec", "execute", "grant",
    "revoke", "create",
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RejectedQuery {
    #[error("query text is empty")]
    Empty,
    #[error("multiple SQL statements are not allowed")]
    MultipleStatements,
    #[error("only SELECT queries are allowed")]
    NotReadOnly,
    #[error("disallowed SQL keyword `{keyword}`")]
    DisallowedKeyword { keyword: String },
    #[error("access to object `{object}` is not allowed")]
    DisallowedObject { object: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardPolicy {
    allowed_objects: BTreeSet<String>,
    default_row_limit: u32,
    row_cap_style: RowCapStyle,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), DEFAULT_ROW_LIMIT, RowCapStyle::Limit)
    }
}

impl GuardPolicy {
    pub fn new<I, S>(allowed_objects: I, default_row_limit: u32, row_cap_style: RowCapStyle) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_objects = allowed_objects
            .into_iter()
            .map(|object| strip_decoration(object.as_ref().trim()).to_ascii_lowercase())
            .filter(|object| !object.is_empty())
            .collect();
        Self { allowed_objects, default_row_limit: default_row_limit.max(1), row_cap_style }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(&config.allowed_objects, config.default_row_limit, config.row_cap_style)
    }

    pub fn default_row_limit(&self) -> u32 {
        self.default_row_limit
    }

    pub fn row_cap_style(&self) -> RowCapStyle {
        self.row_cap_style
    }

    pub fn restricts_objects(&self) -> bool {
        !self.allowed_objects.is_empty()
    }

    fn allows(&self, object: &str) -> bool {
        let object = object.to_ascii_lowercase();
        let base = object.rsplit('.').next().unwrap_or(object.as_str());
        self.allowed_objects.contains(&object) || self.allowed_objects.contains(base)
    }
}

#[derive(Clone, Debug, Default)]
pub struct QueryGuard {
    policy: GuardPolicy,
}

impl QueryGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    pub fn validate(&self, sql: &str) -> Result<(), RejectedQuery> {
        let text = sql.trim();

        if text.contains(';') {
            return Err(RejectedQuery::MultipleStatements);
        }
        if text.is_empty() {
            return Err(RejectedQuery::Empty);
        }
        if !read_only_prefix().is_match(text) {
            return Err(RejectedQuery::NotReadOnly);
        }
        if let Some(found) = denylisted_keyword().find(text) {
            return Err(RejectedQuery::DisallowedKeyword {
                keyword: found.as_str().to_ascii_lowercase(),
            });
        }

        if self.policy.restricts_objects() {
            for captures in referenced_object().captures_iter(text) {
                let Some(raw) = captures.get(1) else {
                    continue;
                };
                let object = strip_decoration(raw.as_str());
                if !self.policy.allows(&object) {
                    return Err(RejectedQuery::DisallowedObject { object });
                }
            }
        }

        Ok(())
    }

    /// Caps the number of returned rows unless the query already carries a
    /// `TOP`/`LIMIT` clause, whether literal (`LIMIT 10`), bound (`LIMIT :n`,
    /// `LIMIT ?`) or parenthesized (`TOP (10)`). Applying it twice changes nothing.
    pub fn enforce_row_cap(&self, sql: &str, limit: u32) -> String {
        let text = sql.trim();
        if existing_row_cap().is_match(text) {
            return text.to_string();
        }

        let limit = limit.max(1);
        match self.policy.row_cap_style {
            RowCapStyle::Top => {
                let replacement = format!("SELECT TOP {limit}");
                leading_select().replace(text, NoExpand(&replacement)).into_owned()
            }
            // Own line so a trailing `--` comment cannot swallow the clause.
            RowCapStyle::Limit => format!("{text}\nLIMIT {limit}"),
        }
    }
}

fn strip_decoration(object: &str) -> String {
    object.chars().filter(|ch| !matches!(ch, '[' | ']' | '"' | '`')).collect()
}

fn read_only_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^(with\s+.+?\)\s*select|select)\b").expect("read-only prefix regex")
    })
}

fn denylisted_keyword() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b({})\b", DENYLISTED_KEYWORDS.join("|")))
            .expect("denylist regex")
    })
}

fn referenced_object() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:from|join)\s+([a-z0-9_.\[\]"`]+)"#).expect("object regex")
    })
}

fn existing_row_cap() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:top|limit)\s*(?:\d+\b|\(|\?|[:@$][a-z_])").expect("row cap regex")
    })
}

fn leading_select() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^select\b").expect("leading select regex"))
}
