use board_shared::ArticleStatus;

/// Listing visibility. Without the override only moderated articles are shown.
///
/// The override comes straight from the `is_admin` query parameter and is not
/// checked against the caller's permissions. That is inherited behaviour; any
/// client can see new and rejected articles by setting the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationFilter {
    show_all: bool,
}

impl ModerationFilter {
    /// Any non-empty flag value enables the override.
    pub fn from_flag(flag: Option<&str>) -> Self {
        let show_all = flag.is_some_and(|v| !v.is_empty());
        if show_all {
            tracing::info!("moderation override requested via is_admin flag");
        }
        Self { show_all }
    }

    /// Status a listed article must have, or `None` when everything is listed.
    pub fn required_status(&self) -> Option<ArticleStatus> {
        if self.show_all {
            None
        } else {
            Some(ArticleStatus::Moderated)
        }
    }
}
