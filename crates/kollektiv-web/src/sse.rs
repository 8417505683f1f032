//! Server-sent event streams for source progress and chat turns, built on
//! `axum::response::sse` so clients can consume `text/event-stream`
//! directly instead of upgrading to a websocket.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use kollektiv_core::models::{ContentBlock, ContentProcessingEvent, ConversationMessage, Role};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{WebError, WebResult};
use crate::schemas::{ChatRequestBody, SourceEvent};
use crate::state::Services;

pub async fn source_events(
    State(services): State<Arc<Services>>,
    Path(source_id): Path<Uuid>,
) -> WebResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let current = services
        .durable
        .find_source(source_id)
        .await?
        .ok_or_else(|| WebError::Core(kollektiv_core::KollektivError::NotFound { entity: "source", id: source_id.to_string() }))?;

    // Replay the source's current stage first so a client that subscribes
    // after the stage already changed (or after the pipeline already
    // finished) doesn't hang waiting for an event that already happened.
    let replayed = stream::once(async move {
        ContentProcessingEvent {
            source_id,
            stage: current.stage,
            error: current.error,
            metadata: Default::default(),
            timestamp: current.updated_at,
        }
    });
    let bus_stream = services.events.bus.subscribe(source_id).await?;

    let events = replayed
        .chain(bus_stream.filter_map(|r| async move { r.ok() }))
        .scan(false, |done, event| {
            if *done {
                return futures::future::ready(None);
            }
            if event.stage.is_terminal() {
                *done = true;
            }
            futures::future::ready(Some(event))
        })
        .map(to_sse_event);

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn to_sse_event(event: ContentProcessingEvent) -> Result<Event, Infallible> {
    let view = SourceEvent::from(&event);
    Ok(Event::default().event("source").json_data(view).unwrap_or_else(|_| Event::default().event("error")))
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatSseEvent {
    MessageAccepted { conversation_id: Uuid, title: String },
    ContentBlockStart { index: u32, block_type: &'static str, id: Option<String>, name: Option<String> },
    ContentBlockDelta { index: u32, text_delta: Option<String>, tool_input_json_delta: Option<String> },
    ContentBlockStop { index: u32 },
    MessageStop,
    AssistantMessage { message: ConversationMessage },
    ToolResultMessage { message: ConversationMessage },
    Error { error_message: String },
}

impl From<kollektiv_chat::FrontendChatEvent> for ChatSseEvent {
    fn from(event: kollektiv_chat::FrontendChatEvent) -> Self {
        use kollektiv_chat::{FrontendChatEvent as E, FrontendContentBlock as B};
        match event {
            E::MessageAccepted { conversation_id, title } => ChatSseEvent::MessageAccepted { conversation_id, title },
            E::ContentBlockStart { index, content_block } => match content_block {
                B::Text { .. } => ChatSseEvent::ContentBlockStart { index, block_type: "text", id: None, name: None },
                B::ToolUse { id, name } => {
                    ChatSseEvent::ContentBlockStart { index, block_type: "tool_use", id: Some(id), name: Some(name) }
                }
            },
            E::ContentBlockDelta { index, text_delta, tool_input_json_delta } => {
                ChatSseEvent::ContentBlockDelta { index, text_delta, tool_input_json_delta }
            }
            E::ContentBlockStop { index } => ChatSseEvent::ContentBlockStop { index },
            E::MessageStop => ChatSseEvent::MessageStop,
            E::AssistantMessage { message } => ChatSseEvent::AssistantMessage { message },
            E::ToolResultMessage { message } => ChatSseEvent::ToolResultMessage { message },
            E::Error { error_message } => ChatSseEvent::Error { error_message },
        }
    }
}

pub async fn chat(
    State(services): State<Arc<Services>>,
    Json(body): Json<ChatRequestBody>,
) -> WebResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let title = kollektiv_chat::conversation::now_title(&body.message);

    let conversation_id = match body.conversation_id {
        Some(id) => id,
        None => services.conversations.create_conversation(body.user_id, title.clone()).await?.conversation_id,
    };

    let user_message = ConversationMessage {
        message_id: Uuid::new_v4(),
        conversation_id,
        role: Role::User,
        content: vec![ContentBlock::Text { text: body.message }],
    };

    let rx = services.chat.get_response(conversation_id, body.user_id, user_message, title);
    let events = rx.map(|event| {
        let sse_event: ChatSseEvent = event.into();
        Ok(Event::default().event("chat").json_data(sse_event).unwrap_or_else(|_| Event::default().event("error")))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
