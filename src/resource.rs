use std::fmt;

pub const CONTENT_SCHEME: &str = "content://";
pub const DEFAULT_AUTHORITY: &str = "com.google.developer.taskmaker";
pub const TASKS_PATH: &str = "tasks";

/// An addressable target of a provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// `content://<authority>/tasks`
    Tasks,
    /// `content://<authority>/tasks/{id}`
    Task(i64),
}

impl Resource {
    /// True when `other` is this resource or lives beneath it.
    pub fn contains(self, other: Resource) -> bool {
        match (self, other) {
            (Resource::Tasks, _) => true,
            (Resource::Task(a), Resource::Task(b)) => a == b,
            (Resource::Task(_), Resource::Tasks) => false,
        }
    }
}

/// Maps URIs of a single authority onto [`Resource`]s and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriRouter {
    authority: String,
}

impl Default for UriRouter {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORITY)
    }
}

impl UriRouter {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }

    pub fn match_uri(&self, uri: &str) -> Option<Resource> {
        let rest = uri.strip_prefix(CONTENT_SCHEME)?;
        let (authority, path) = rest.split_once('/')?;
        if authority != self.authority {
            return None;
        }

        match path.split_once('/') {
            None if path == TASKS_PATH => Some(Resource::Tasks),
            Some((TASKS_PATH, id)) => parse_id_segment(id).map(Resource::Task),
            _ => None,
        }
    }

    pub fn uri_for(&self, resource: Resource) -> String {
        format!("{CONTENT_SCHEME}{}/{resource}", self.authority)
    }

    pub fn collection_uri(&self) -> String {
        self.uri_for(Resource::Tasks)
    }

    pub fn task_uri(&self, id: i64) -> String {
        self.uri_for(Resource::Task(id))
    }
}

fn parse_id_segment(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Tasks => f.write_str(TASKS_PATH),
            Resource::Task(id) => write!(f, "{TASKS_PATH}/{id}"),
        }
    }
}
