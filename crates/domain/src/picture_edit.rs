use lumora_core::UserId;
use serde::{Deserialize, Serialize};

/// Kind of message exchanged on a picture edit connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditMessageType {
    /// Informational notice.
    Info,
    /// Error targeted at one connection.
    Error,
    /// A subject became the editor.
    EnterEdit,
    /// The editor released the picture.
    ExitEdit,
    /// The editor applied an action.
    EditAction,
}

impl EditMessageType {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::EnterEdit => "ENTER_EDIT",
            Self::ExitEdit => "EXIT_EDIT",
            Self::EditAction => "EDIT_ACTION",
        }
    }
}

/// Transform applied by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditAction {
    /// Zoom in.
    ZoomIn,
    /// Zoom out.
    ZoomOut,
    /// Rotate counter-clockwise.
    RotateLeft,
    /// Rotate clockwise.
    RotateRight,
}

impl EditAction {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZoomIn => "ZOOM_IN",
            Self::ZoomOut => "ZOOM_OUT",
            Self::RotateLeft => "ROTATE_LEFT",
            Self::RotateRight => "ROTATE_RIGHT",
        }
    }

    /// Returns the label shown to collaborators.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ZoomIn => "zoom in",
            Self::ZoomOut => "zoom out",
            Self::RotateLeft => "rotate left",
            Self::RotateRight => "rotate right",
        }
    }

    /// Parses a wire value; unknown actions yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ZOOM_IN" => Some(Self::ZoomIn),
            "ZOOM_OUT" => Some(Self::ZoomOut),
            "ROTATE_LEFT" => Some(Self::RotateLeft),
            "ROTATE_RIGHT" => Some(Self::RotateRight),
            _ => None,
        }
    }
}

/// Message sent by a client.
///
/// Fields stay as raw strings so unknown types and actions can be answered
/// with a targeted error instead of dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    /// Requested message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Requested edit action for `EDIT_ACTION` messages.
    #[serde(default)]
    pub edit_action: Option<String>,
}

/// Public profile of the subject a message is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditParticipant {
    /// Account identity.
    pub id: UserId,
    /// Display name.
    pub display_name: String,
}

/// Message sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: EditMessageType,
    /// Human readable text.
    pub message: String,
    /// Applied action for `EDIT_ACTION` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_action: Option<EditAction>,
    /// Subject the message is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<EditParticipant>,
}

impl EditResponse {
    /// Builds an informational notice.
    #[must_use]
    pub fn info(message: impl Into<String>, user: Option<EditParticipant>) -> Self {
        Self {
            message_type: EditMessageType::Info,
            message: message.into(),
            edit_action: None,
            user,
        }
    }

    /// Builds a targeted error.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message_type: EditMessageType::Error,
            message: message.into(),
            edit_action: None,
            user: None,
        }
    }

    /// Announces a new editor.
    #[must_use]
    pub fn enter_edit(user: EditParticipant) -> Self {
        Self {
            message_type: EditMessageType::EnterEdit,
            message: format!("{} started editing", user.display_name),
            edit_action: None,
            user: Some(user),
        }
    }

    /// Announces that the editor left.
    #[must_use]
    pub fn exit_edit(user: EditParticipant) -> Self {
        Self {
            message_type: EditMessageType::ExitEdit,
            message: format!("{} stopped editing", user.display_name),
            edit_action: None,
            user: Some(user),
        }
    }

    /// Relays an editor action.
    #[must_use]
    pub fn edit_action(user: EditParticipant, action: EditAction) -> Self {
        Self {
            message_type: EditMessageType::EditAction,
            message: format!("{} applied {}", user.display_name, action.label()),
            edit_action: Some(action),
            user: Some(user),
        }
    }
}
