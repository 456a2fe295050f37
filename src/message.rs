use crate::io::ops::OperationKind;
use crate::io::provider::Prompt;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// What the user picked in a dialog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Choice {
    Primary,
    Secondary,
    Dismissed,
}

/// A dialog as handed to the [`Prompt`] collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialog {
    pub title: String,
    pub body: String,
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

impl Dialog {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            primary: Some("OK".to_string()),
            secondary: None,
        }
    }

    pub fn question(
        title: impl Into<String>,
        body: impl Into<String>,
        primary: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            primary: Some(primary.into()),
            secondary: Some(secondary.into()),
        }
    }
}

/// Every user-visible failure or question raised by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    ItemHidden(PathBuf),
    /// Target lies under a hidden folder while hidden items are off.
    NeedOpenHiddenSwitch(PathBuf),
    LocateFolderFailure(PathBuf),
    LocatePathFailure(String),
    AccessFolderFailure(PathBuf),
    /// Offer to retry with elevated rights.
    Unauthorized { kind: OperationKind, path: PathBuf },
    DenyElevation(String),
    ItemInUse(PathBuf),
    AlreadyExists(PathBuf),
    OperationFailed { kind: OperationKind, message: String },
    ConfirmDelete { path: PathBuf, permanent: bool },
    /// Drop target is one of the dragged folders or lies inside one.
    DropIntoSource(PathBuf),
    InvalidName(String),
    UnexpectedError(String),
}

fn verb(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Delete => "delete",
        OperationKind::Move => "move",
        OperationKind::Copy => "copy",
        OperationKind::Rename => "rename",
        OperationKind::Create => "create",
        OperationKind::Launch => "launch",
        OperationKind::Open => "open",
    }
}

impl Notice {
    pub fn title(&self) -> String {
        match self {
            Notice::ItemHidden(_) => "Item is hidden".to_string(),
            Notice::NeedOpenHiddenSwitch(_) => "Hidden items are not shown".to_string(),
            Notice::LocateFolderFailure(_) => "Could not locate folder".to_string(),
            Notice::LocatePathFailure(_) => "Path not found".to_string(),
            Notice::AccessFolderFailure(_) => "Access denied".to_string(),
            Notice::Unauthorized { kind, .. } => format!("Permission needed to {}", verb(*kind)),
            Notice::DenyElevation(_) => "Elevation denied".to_string(),
            Notice::ItemInUse(_) => "Item in use".to_string(),
            Notice::AlreadyExists(_) => "Item already exists".to_string(),
            Notice::OperationFailed { kind, .. } => format!("Could not {}", verb(*kind)),
            Notice::ConfirmDelete { permanent: true, .. } => "Delete permanently".to_string(),
            Notice::ConfirmDelete { .. } => "Move to trash".to_string(),
            Notice::UnexpectedError(_) => "Unexpected error".to_string(),
            Notice::DropIntoSource(_) => "Cannot drop here".to_string(),
            Notice::InvalidName(_) => "Invalid name".to_string(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notice::ItemHidden(path) => format!(
                "{} is hidden. Enable hidden items to open it.",
                path.display()
            ),
            Notice::NeedOpenHiddenSwitch(path) => format!(
                "{} lies inside a hidden folder. Enable hidden items to open it.",
                path.display()
            ),
            Notice::LocateFolderFailure(path) => format!(
                "{} no longer exists. It may have been moved or deleted.",
                path.display()
            ),
            Notice::LocatePathFailure(text) => format!("Cannot find \"{}\".", text),
            Notice::AccessFolderFailure(path) => {
                format!("You do not have permission to open {}.", path.display())
            }
            Notice::Unauthorized { path, .. } => format!(
                "Additional rights are needed for {}. Try again as administrator?",
                path.display()
            ),
            Notice::DenyElevation(reason) => format!("Elevation was refused: {}", reason),
            Notice::ItemInUse(path) => format!(
                "{} is open in another program. Close it and try again.",
                path.display()
            ),
            Notice::AlreadyExists(path) => format!("{} already exists.", path.display()),
            Notice::OperationFailed { message, .. } => message.clone(),
            Notice::ConfirmDelete { path, permanent } => {
                if *permanent {
                    format!("Permanently delete {}? This cannot be undone.", path.display())
                } else {
                    format!("Move {} to the trash?", path.display())
                }
            }
            Notice::UnexpectedError(message) => message.clone(),
            Notice::DropIntoSource(path) => format!(
                "{} is inside the folder being dropped.",
                path.display()
            ),
            Notice::InvalidName(name) => format!(
                "\"{}\" is not a valid folder name. Names cannot contain / or \\.",
                name
            ),
        }
    }

    pub fn dialog(&self) -> Dialog {
        match self {
            Notice::Unauthorized { .. } => {
                Dialog::question(self.title(), self.body(), "Continue", "Cancel")
            }
            Notice::ConfirmDelete { .. } => {
                Dialog::question(self.title(), self.body(), "Delete", "Cancel")
            }
            _ => Dialog::info(self.title(), self.body()),
        }
    }
}

/// Presenter for a headless session: logs each dialog and gives a fixed
/// answer.
#[derive(Clone, Debug)]
pub struct LogPrompt {
    answer: Choice,
}

impl LogPrompt {
    pub fn new(answer: Choice) -> Self {
        Self { answer }
    }
}

impl Default for LogPrompt {
    fn default() -> Self {
        Self::new(Choice::Dismissed)
    }
}

#[async_trait]
impl Prompt for LogPrompt {
    async fn confirm(&self, dialog: &Dialog) -> Choice {
        info!(title = %dialog.title, "{}", dialog.body);
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_carry_two_buttons() {
        let dialog = Notice::Unauthorized {
            kind: OperationKind::Delete,
            path: PathBuf::from("/sys/x"),
        }
        .dialog();
        assert_eq!(dialog.title, "Permission needed to delete");
        assert_eq!(dialog.secondary.as_deref(), Some("Cancel"));

        let info = Notice::LocatePathFailure("nowhere".into()).dialog();
        assert!(info.secondary.is_none());
        assert!(info.body.contains("nowhere"));
    }

    #[tokio::test]
    async fn log_prompt_answers_fixed_choice() {
        let prompt = LogPrompt::new(Choice::Primary);
        let choice = prompt.confirm(&Notice::ItemHidden("/a/.b".into()).dialog()).await;
        assert_eq!(choice, Choice::Primary);
    }
}
