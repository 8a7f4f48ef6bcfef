use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::messaging::domain::messages::StreamId;
use crate::session::domain::session_error::SessionError;

/// Identity of the surface a session analyzes (a tab, a window, a file).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the coordinator knows about a start target.
///
/// `stream_id` is opaque to the coordinator; only the pipeline resolves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub id: TargetId,
    pub url: String,
    pub stream_id: StreamId,
}

impl TargetDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            id: TargetId(id.into()),
            url: url.into(),
            stream_id: StreamId(stream_id.into()),
        }
    }

    /// A local media source: the URL doubles as id and stream reference.
    pub fn local(source: impl Into<String>) -> Self {
        let source = source.into();
        Self::new(source.clone(), source.clone(), source)
    }
}

/// Domain precondition a target must meet before a session may start on it.
pub trait TargetValidator: Send {
    fn validate(&self, target: &TargetDescriptor) -> Result<(), SessionError>;
}

pub const DEFAULT_MEETING_HOSTS: &[&str] = &[
    "meet.google.com",
    "zoom.us",
    "teams.microsoft.com",
    "teams.live.com",
    "whereby.com",
];

/// Accepts video-meeting pages by host, and optionally local media sources.
#[derive(Clone, Debug)]
pub struct MeetingHostValidator {
    hosts: Vec<String>,
    allow_local_media: bool,
}

impl MeetingHostValidator {
    pub fn new(hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
            allow_local_media: false,
        }
    }

    /// Also accept `file://` URLs, bare paths and capture devices.
    pub fn allowing_local_media(mut self) -> Self {
        self.allow_local_media = true;
        self
    }

    fn host_matches(&self, host: &str) -> bool {
        self.hosts
            .iter()
            .any(|h| host == h || host.ends_with(&format!(".{h}")))
    }
}

impl Default for MeetingHostValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MEETING_HOSTS.iter().copied())
    }
}

impl TargetValidator for MeetingHostValidator {
    fn validate(&self, target: &TargetDescriptor) -> Result<(), SessionError> {
        let unsupported = |reason: &str| SessionError::TargetUnsupported {
            target: target.id.to_string(),
            reason: reason.to_string(),
        };
        match Url::parse(&target.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let host = url
                    .host_str()
                    .unwrap_or("")
                    .trim_end_matches('.')
                    .to_ascii_lowercase();
                if host.is_empty() {
                    Err(unsupported("URL has no host"))
                } else if self.host_matches(&host) {
                    Ok(())
                } else {
                    Err(unsupported(&format!("{host} is not a supported meeting page")))
                }
            }
            Ok(url) if self.allow_local_media && is_local_scheme(url.scheme()) => Ok(()),
            // Bare paths and device names have no scheme.
            Err(_) if self.allow_local_media => Ok(()),
            Ok(url) => Err(unsupported(&format!("unsupported scheme {}", url.scheme()))),
            Err(_) => Err(unsupported("not a web page")),
        }
    }
}

/// `file`, or a single letter, which is a Windows drive rather than a scheme.
fn is_local_scheme(scheme: &str) -> bool {
    scheme == "file" || scheme.len() == 1
}
