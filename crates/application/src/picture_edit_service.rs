use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lumora_core::{AppError, AppResult, PictureId, UserId, UserIdentity};
use lumora_domain::{
    EditAction, EditMessageType, EditParticipant, EditRequest, EditResponse, Permission,
    RoleDomain, SpaceType,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{AuthorizationService, EditConnection, PictureCatalog};

/// Inbound frames a connection may queue before its reader waits.
const INBOUND_QUEUE_CAPACITY: usize = 10;

/// Proof that a caller passed the edit handshake for one picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSessionTicket {
    picture_id: PictureId,
    participant: EditParticipant,
}

impl EditSessionTicket {
    /// Returns the picture the session edits.
    #[must_use]
    pub fn picture_id(&self) -> PictureId {
        self.picture_id
    }

    /// Returns the participant the session belongs to.
    #[must_use]
    pub fn participant(&self) -> &EditParticipant {
        &self.participant
    }
}

struct EditClient {
    id: u64,
    participant: EditParticipant,
    connection: Arc<dyn EditConnection>,
}

#[derive(Default)]
struct SessionBucket {
    clients: Mutex<Vec<Arc<EditClient>>>,
}

/// Registry of live picture edit sessions with single-editor arbitration.
#[derive(Clone)]
pub struct PictureEditSessionManager {
    catalog: Arc<dyn PictureCatalog>,
    authorization_service: AuthorizationService,
    state: Arc<SessionState>,
}

#[derive(Default)]
struct SessionState {
    buckets: Mutex<HashMap<PictureId, Arc<SessionBucket>>>,
    editors: Mutex<HashMap<PictureId, UserId>>,
    next_client_id: AtomicU64,
}

impl PictureEditSessionManager {
    /// Creates an empty session manager.
    #[must_use]
    pub fn new(catalog: Arc<dyn PictureCatalog>, authorization_service: AuthorizationService) -> Self {
        Self {
            catalog,
            authorization_service,
            state: Arc::new(SessionState::default()),
        }
    }

    /// Runs the handshake checks that must pass before a connection is upgraded.
    pub async fn authorize(
        &self,
        picture_id: PictureId,
        user: Option<&UserIdentity>,
    ) -> AppResult<EditSessionTicket> {
        let Some(user) = user else {
            return Err(AppError::Unauthorized("authentication required".to_owned()));
        };

        let picture = self
            .catalog
            .find_picture(picture_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("picture '{picture_id}' does not exist")))?;

        match picture.space_id {
            Some(space_id) => {
                let space = self
                    .catalog
                    .find_space(space_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("space '{space_id}' does not exist")))?;
                if space.space_type != SpaceType::Team {
                    return Err(AppError::Validation(
                        "collaborative editing is only available in team spaces".to_owned(),
                    ));
                }
                self.authorization_service
                    .require_permission(Some(user), RoleDomain::Space(space_id), Permission::PictureEdit)
                    .await?;
            }
            None if user.is_admin() => {}
            None => {
                self.authorization_service
                    .require_permission(Some(user), RoleDomain::Public, Permission::PictureEdit)
                    .await?;
            }
        }

        Ok(EditSessionTicket {
            picture_id,
            participant: EditParticipant {
                id: user.user_id(),
                display_name: user.display_name().to_owned(),
            },
        })
    }

    /// Serves one upgraded connection until the peer disconnects.
    ///
    /// Inbound frames are handled in arrival order by a single task owned by
    /// this call; the task is stopped before the client is unregistered.
    pub async fn run_session(&self, ticket: EditSessionTicket, connection: Arc<dyn EditConnection>) {
        let EditSessionTicket {
            picture_id,
            participant,
        } = ticket;
        let client = Arc::new(EditClient {
            id: self.state.next_client_id.fetch_add(1, Ordering::Relaxed),
            participant,
            connection,
        });

        self.broadcast(
            picture_id,
            &EditResponse::info(
                format!("{} joined the editing session", client.participant.display_name),
                Some(client.participant.clone()),
            ),
            None,
        )
        .await;
        self.add_client(picture_id, Arc::clone(&client));
        info!(
            picture_id = %picture_id,
            user_id = %client.participant.id,
            "picture edit session opened"
        );

        let (sender, mut receiver) = mpsc::channel::<String>(INBOUND_QUEUE_CAPACITY);
        let handler = {
            let manager = self.clone();
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                while let Some(frame) = receiver.recv().await {
                    manager.handle_frame(picture_id, &client, &frame).await;
                }
            })
        };

        while let Some(frame) = client.connection.receive().await {
            if sender.send(frame).await.is_err() {
                break;
            }
        }

        drop(sender);
        if let Err(error) = handler.await {
            warn!(picture_id = %picture_id, error = %error, "picture edit handler task failed");
        }
        self.remove_client(picture_id, &client).await;
        info!(
            picture_id = %picture_id,
            user_id = %client.participant.id,
            "picture edit session closed"
        );
    }

    /// Returns the subject currently holding the editor role for a picture.
    #[must_use]
    pub fn editor_of(&self, picture_id: PictureId) -> Option<UserId> {
        lock(&self.state.editors).get(&picture_id).copied()
    }

    /// Returns how many connections are registered for a picture.
    #[must_use]
    pub fn connected_count(&self, picture_id: PictureId) -> usize {
        let bucket = lock(&self.state.buckets).get(&picture_id).cloned();
        bucket.map_or(0, |bucket| lock(&bucket.clients).len())
    }

    async fn handle_frame(&self, picture_id: PictureId, client: &Arc<EditClient>, frame: &str) {
        let request = match serde_json::from_str::<EditRequest>(frame) {
            Ok(request) => request,
            Err(error) => {
                debug!(picture_id = %picture_id, error = %error, "malformed picture edit message");
                self.reply(client, &EditResponse::error("malformed message")).await;
                return;
            }
        };

        match request.message_type.as_str() {
            value if value == EditMessageType::EnterEdit.as_str() => {
                self.enter_edit(picture_id, client).await;
            }
            value if value == EditMessageType::ExitEdit.as_str() => {
                self.exit_edit(picture_id, client).await;
            }
            value if value == EditMessageType::EditAction.as_str() => {
                self.edit_action(picture_id, client, request.edit_action.as_deref())
                    .await;
            }
            other => {
                debug!(picture_id = %picture_id, message_type = other, "unknown picture edit message type");
                self.reply(client, &EditResponse::error(format!("unknown message type '{other}'")))
                    .await;
            }
        }
    }

    async fn enter_edit(&self, picture_id: PictureId, client: &Arc<EditClient>) {
        let entered = match lock(&self.state.editors).entry(picture_id) {
            Entry::Vacant(entry) => {
                entry.insert(client.participant.id);
                true
            }
            Entry::Occupied(_) => false,
        };

        if entered {
            self.broadcast(
                picture_id,
                &EditResponse::enter_edit(client.participant.clone()),
                None,
            )
            .await;
        }
    }

    async fn exit_edit(&self, picture_id: PictureId, client: &Arc<EditClient>) {
        if self.release_editor(picture_id, client.participant.id) {
            self.broadcast(
                picture_id,
                &EditResponse::exit_edit(client.participant.clone()),
                None,
            )
            .await;
        }
    }

    async fn edit_action(&self, picture_id: PictureId, client: &Arc<EditClient>, action: Option<&str>) {
        if self.editor_of(picture_id) != Some(client.participant.id) {
            self.reply(
                client,
                &EditResponse::error("only the current editor can apply edit actions"),
            )
            .await;
            return;
        }

        let Some(action) = action.and_then(EditAction::parse) else {
            self.reply(client, &EditResponse::error("unknown edit action")).await;
            return;
        };

        self.broadcast(
            picture_id,
            &EditResponse::edit_action(client.participant.clone(), action),
            Some(client.id),
        )
        .await;
    }

    fn add_client(&self, picture_id: PictureId, client: Arc<EditClient>) {
        let mut buckets = lock(&self.state.buckets);
        let bucket = buckets.entry(picture_id).or_default();
        lock(&bucket.clients).push(client);
    }

    async fn remove_client(&self, picture_id: PictureId, client: &Arc<EditClient>) {
        {
            let mut buckets = lock(&self.state.buckets);
            if let Some(bucket) = buckets.get(&picture_id).cloned() {
                let mut clients = lock(&bucket.clients);
                clients.retain(|registered| registered.id != client.id);
                if clients.is_empty() {
                    drop(clients);
                    buckets.remove(&picture_id);
                }
            }
        }

        let response = if self.release_editor(picture_id, client.participant.id) {
            EditResponse::exit_edit(client.participant.clone())
        } else {
            EditResponse::info(
                format!("{} left the editing session", client.participant.display_name),
                Some(client.participant.clone()),
            )
        };
        self.broadcast(picture_id, &response, None).await;
    }

    fn release_editor(&self, picture_id: PictureId, user_id: UserId) -> bool {
        let mut editors = lock(&self.state.editors);
        if editors.get(&picture_id) == Some(&user_id) {
            editors.remove(&picture_id);
            return true;
        }
        false
    }

    /// Sends to every registered client except `exclude`. Clients are
    /// snapshotted under the bucket lock and written to after releasing it.
    async fn broadcast(&self, picture_id: PictureId, response: &EditResponse, exclude: Option<u64>) {
        let Some(payload) = encode(response) else {
            return;
        };
        let bucket = lock(&self.state.buckets).get(&picture_id).cloned();
        let Some(bucket) = bucket else {
            return;
        };
        let recipients: Vec<Arc<EditClient>> = lock(&bucket.clients)
            .iter()
            .filter(|client| Some(client.id) != exclude)
            .cloned()
            .collect();

        for recipient in recipients {
            if let Err(error) = recipient.connection.send(payload.clone()).await {
                warn!(
                    picture_id = %picture_id,
                    user_id = %recipient.participant.id,
                    error = %error,
                    "picture edit broadcast failed; closing connection"
                );
                recipient.connection.close().await;
            }
        }
    }

    async fn reply(&self, client: &EditClient, response: &EditResponse) {
        let Some(payload) = encode(response) else {
            return;
        };
        if let Err(error) = client.connection.send(payload).await {
            warn!(user_id = %client.participant.id, error = %error, "picture edit reply failed");
            client.connection.close().await;
        }
    }
}

fn encode(response: &EditResponse) -> Option<String> {
    serde_json::to_string(response)
        .map_err(|error| warn!(error = %error, "failed to encode picture edit message"))
        .ok()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
