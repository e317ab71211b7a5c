//! Modes, steps and the forward transition table.

use std::fmt;

use crate::session::{SessionFlags, Selection};

/// What the user is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Browse,
    AddMaterial,
    DeleteFile,
    DeletePublisher,
    DeleteSubject,
    AddSubject,
    AddSubfolder,
    Broadcast,
}

/// Where the user is within a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ChooseExam,
    ChooseSubject,
    ChoosePublisher,
    AskPublisherName,
    ChooseFolder,
    AskFolderName,
    AskSubjectName,
    ChooseFile,
    AwaitUploads,
    AwaitFileNumber,
    ConfirmDelete,
    AwaitBroadcast,
}

impl Mode {
    /// Every mode, in main-menu order.
    pub const ALL: [Self; 8] = [
        Self::Browse,
        Self::AddMaterial,
        Self::DeleteFile,
        Self::AddSubfolder,
        Self::AddSubject,
        Self::DeletePublisher,
        Self::DeleteSubject,
        Self::Broadcast,
    ];

    /// Forward step sequence. The last step is where the mode's action runs;
    /// back navigation is derived from this table.
    #[must_use]
    pub const fn steps(self) -> &'static [Step] {
        use Step::{
            AskFolderName, AskPublisherName, AskSubjectName, AwaitBroadcast, AwaitFileNumber,
            AwaitUploads, ChooseExam, ChooseFile, ChooseFolder, ChoosePublisher, ChooseSubject,
            ConfirmDelete,
        };

        match self {
            Self::Browse => &[ChooseExam, ChooseSubject, ChoosePublisher, ChooseFolder, ChooseFile],
            Self::AddMaterial => &[
                ChooseExam,
                ChooseSubject,
                ChoosePublisher,
                AskPublisherName,
                ChooseFolder,
                AwaitUploads,
            ],
            Self::DeleteFile => &[
                ChooseExam,
                ChooseSubject,
                ChoosePublisher,
                ChooseFolder,
                AwaitFileNumber,
            ],
            Self::DeletePublisher => &[ChooseExam, ChooseSubject, ChoosePublisher, ConfirmDelete],
            Self::DeleteSubject => &[ChooseExam, ChooseSubject, ConfirmDelete],
            Self::AddSubject => &[ChooseExam, AskSubjectName],
            Self::AddSubfolder => &[ChooseExam, ChooseSubject, ChoosePublisher, AskFolderName],
            Self::Broadcast => &[AwaitBroadcast],
        }
    }

    #[must_use]
    pub fn first_step(self) -> Step {
        self.steps()[0]
    }

    /// Main-menu button that starts the mode.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Browse => "📚 Browse Materials",
            Self::AddMaterial => "➕ Add Material",
            Self::DeleteFile => "🗑 Delete File",
            Self::DeletePublisher => "🗑 Delete Publisher",
            Self::DeleteSubject => "🗑 Delete Subject",
            Self::AddSubject => "📘 Add Subject",
            Self::AddSubfolder => "📁 Add Subfolder",
            Self::Broadcast => "📢 Broadcast",
        }
    }

    #[must_use]
    pub const fn is_admin_only(self) -> bool {
        !matches!(self, Self::Browse)
    }

    /// Modes that remove catalog content.
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        matches!(
            self,
            Self::DeleteFile | Self::DeletePublisher | Self::DeleteSubject
        )
    }

    /// Whether the publisher step offers the "Add New Publisher" action.
    #[must_use]
    pub const fn can_create_publisher(self) -> bool {
        matches!(self, Self::AddMaterial)
    }

    /// Position of `step` in this mode's table.
    #[must_use]
    pub fn position(self, step: Step) -> Option<usize> {
        self.steps().iter().position(|s| *s == step)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Browse => "browse",
            Self::AddMaterial => "add material",
            Self::DeleteFile => "delete file",
            Self::DeletePublisher => "delete publisher",
            Self::DeleteSubject => "delete subject",
            Self::AddSubject => "add subject",
            Self::AddSubfolder => "add subfolder",
            Self::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

impl Step {
    /// Steps that only collect free text are never returned to with Back.
    #[must_use]
    pub const fn is_back_target(self) -> bool {
        matches!(
            self,
            Self::ChooseExam
                | Self::ChooseSubject
                | Self::ChoosePublisher
                | Self::ChooseFolder
                | Self::ChooseFile
        )
    }

    /// Forgets whatever this step selected.
    pub fn clear(self, selection: &mut Selection, flags: &mut SessionFlags) {
        match self {
            Self::ChooseExam => selection.exam = None,
            Self::ChooseSubject => selection.subject = None,
            Self::ChoosePublisher => {
                selection.publisher = None;
                flags.creating_publisher = false;
            }
            Self::AskPublisherName => selection.publisher = None,
            Self::ChooseFolder | Self::AskFolderName => selection.folder = None,
            Self::ChooseFile => flags.page = 0,
            Self::AwaitUploads => flags.uploaded = 0,
            Self::AskSubjectName
            | Self::AwaitFileNumber
            | Self::ConfirmDelete
            | Self::AwaitBroadcast => {}
        }
    }
}
