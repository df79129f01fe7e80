use std::sync::Arc;

use tracing::{debug, warn};

use crate::platform::EntityDirectory;

/// Name shown when an origin cannot be resolved.
pub const UNKNOWN_ORIGIN: &str = "Unknown";

/// Where a forwarded message originally came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginRef {
    /// Name already supplied by the platform
    Named(String),
    /// Identifier that has to be looked up
    Id(i64),
}

/// Result of a directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Channel {
        title: String,
    },
    User {
        first_name: String,
        last_name: Option<String>,
    },
    Unresolved,
}

impl Entity {
    pub fn display_name(&self) -> Option<String> {
        match self {
            Entity::Channel { title } if !title.trim().is_empty() => Some(title.clone()),
            Entity::User {
                first_name,
                last_name,
            } if !first_name.trim().is_empty() => match last_name.as_deref() {
                Some(last) if !last.trim().is_empty() => Some(format!("{} {}", first_name, last)),
                _ => Some(first_name.clone()),
            },
            _ => None,
        }
    }
}

/// Turns forward metadata into a display name. Never fails: anything that
/// cannot be resolved becomes [`UNKNOWN_ORIGIN`].
#[derive(Clone)]
pub struct OriginResolver {
    directory: Arc<dyn EntityDirectory>,
}

impl OriginResolver {
    pub fn new(directory: Arc<dyn EntityDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, origin: &OriginRef) -> String {
        let id = match origin {
            OriginRef::Named(name) if !name.trim().is_empty() => return name.clone(),
            OriginRef::Named(_) => return UNKNOWN_ORIGIN.to_string(),
            OriginRef::Id(id) => *id,
        };

        match self.directory.lookup(id).await {
            Ok(entity) => entity.display_name().unwrap_or_else(|| {
                debug!("Origin {} has no usable name", id);
                UNKNOWN_ORIGIN.to_string()
            }),
            Err(e) => {
                warn!("Failed to resolve forward origin {}: {}", id, e);
                UNKNOWN_ORIGIN.to_string()
            }
        }
    }
}
