use crate::domain::ports::PushChannel;
use crate::domain::{ConnectionId, GameId, LiveError, Notification, PointId, UserId};
use crate::frameworks::config::{MAX_INVALID_MESSAGES, OUTBOUND_QUEUE_CAPACITY};
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::protocol::{ClientMessage, ErrorDto, LocationDto, ServerMessage};
use crate::interface_adapters::push::ConnectionHub;
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::next_connection_id;
use crate::use_cases::{Delivery, GameRuntime};

use axum::{
    Error, Json,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug, serde::Deserialize)]
pub struct ConnectQuery {
    // Game the socket follows.
    game: String,
    // Identity of the connecting user; authentication happens upstream.
    user: String,
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    let (game_id, user_id) = match (GameId::parse(&query.game), UserId::parse(&query.user)) {
        (Ok(game), Ok(user)) => (game, user),
        (Err(e), _) | (_, Err(e)) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let Some(runtime) = state.registry.get_game(&game_id).await else {
        return error_response(StatusCode::NOT_FOUND, "game not running");
    };

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| {
        let conn_id = next_connection_id();
        let span = info_span!("conn", conn_id, user_id = %user_id, game_id = %game_id);
        handle_socket(socket, conn_id, runtime, hub, game_id, user_id).instrument(span)
    })
}

struct ConnCtx {
    conn_id: ConnectionId,
    user_id: UserId,
    runtime: Arc<GameRuntime>,
    hub: Arc<ConnectionHub>,
    // Handle to this socket's own outbound queue, used for close frames.
    outbound: mpsc::Sender<Message>,

    msgs_in: u64,
    bytes_in: u64,
    invalid_json: u32,
}

async fn handle_socket(
    socket: WebSocket,
    conn_id: ConnectionId,
    runtime: Arc<GameRuntime>,
    hub: Arc<ConnectionHub>,
    game_id: GameId,
    user_id: UserId,
) {
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);
    let writer = tokio::spawn(write_outbound(sink, outbound_rx).in_current_span());

    hub.register(conn_id, game_id, user_id.clone(), outbound_tx.clone());
    runtime.context().users.get_or_create(&user_id).await;
    info!("client connected");

    let mut ctx = ConnCtx {
        conn_id,
        user_id,
        runtime,
        hub,
        outbound: outbound_tx,
        msgs_in: 0,
        bytes_in: 0,
        invalid_json: 0,
    };

    // Initial snapshot so the client can draw the map before moving.
    if let Err(e) = ctx
        .runtime
        .send_game_data(&ctx.user_id, &Delivery::Connections(vec![conn_id]))
        .await
    {
        warn!(error = %e, "initial game data failed");
    }

    while let Some(incoming) = stream.next().await {
        match handle_incoming_ws(&mut ctx, incoming).await {
            LoopControl::Continue => {}
            LoopControl::Disconnect => break,
        }
    }

    ctx.hub.unregister(ctx.conn_id);
    let ConnCtx {
        outbound,
        msgs_in,
        bytes_in,
        invalid_json,
        ..
    } = ctx;
    // Last sender gone: the writer flushes what is queued and exits.
    drop(outbound);
    if let Err(e) = writer.await {
        debug!(error = ?e, "writer task failed");
    }

    debug!(msgs_in, bytes_in, invalid_json, "connection stats");
    info!("client disconnected");
}

async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Message>,
) {
    while let Some(message) = outbound_rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "socket send failed");
            return;
        }
        if closing {
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "socket close error");
    }
}

async fn close_with_reason(ctx: &ConnCtx, code: u16, reason: &'static str) -> LoopControl {
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    if ctx.outbound.send(frame).await.is_err() {
        debug!("writer already gone");
    }
    LoopControl::Disconnect
}

fn reply_error(ctx: &ConnCtx, message: impl Into<String>) {
    let reply = ServerMessage::Error(ErrorDto {
        message: message.into(),
    });
    if let Err(e) = ctx.hub.send_raw(ctx.conn_id, &reply) {
        debug!(error = %e, "error reply not delivered");
    }
}

async fn handle_incoming_ws(ctx: &mut ConnCtx, incoming: Result<Message, Error>) -> LoopControl {
    let message = match incoming {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "websocket recv error");
            return LoopControl::Disconnect;
        }
    };

    match message {
        Message::Text(text) => {
            ctx.msgs_in += 1;
            ctx.bytes_in += text.len() as u64;

            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_message) => {
                    ctx.invalid_json = 0;
                    dispatch(ctx, client_message).await
                }
                Err(parse_err) => {
                    ctx.invalid_json += 1;
                    warn!(bytes = text.len(), error = %parse_err, "failed to parse client message");
                    if ctx.invalid_json > MAX_INVALID_MESSAGES {
                        return close_with_reason(ctx, close_code::POLICY, "too many invalid messages")
                            .await;
                    }
                    reply_error(ctx, "invalid message");
                    LoopControl::Continue
                }
            }
        }
        Message::Binary(_) => {
            close_with_reason(ctx, close_code::UNSUPPORTED, "binary messages not supported").await
        }
        Message::Ping(_) | Message::Pong(_) => LoopControl::Continue,
        Message::Close(_) => LoopControl::Disconnect,
    }
}

async fn dispatch(ctx: &mut ConnCtx, message: ClientMessage) -> LoopControl {
    let result = match message {
        ClientMessage::Location(location) => handle_location(ctx, location).await,
        ClientMessage::RefreshAssignments => handle_refresh(ctx).await,
        ClientMessage::VisiblePoints => handle_visible_points(ctx).await,
        ClientMessage::RemovePoint(payload) => handle_remove_point(ctx, &payload.point).await,
    };

    match result {
        Ok(()) => LoopControl::Continue,
        Err(LiveError::ShuttingDown(_)) => {
            close_with_reason(ctx, close_code::AWAY, "game stopped").await
        }
        Err(e) => {
            warn!(error = %e, "client request failed");
            reply_error(ctx, e.to_string());
            LoopControl::Continue
        }
    }
}

async fn handle_location(ctx: &ConnCtx, location: LocationDto) -> Result<(), LiveError> {
    let Some(location) = location.validated() else {
        reply_error(ctx, "location out of bounds");
        return Ok(());
    };
    let outcome = ctx
        .runtime
        .update_location(&ctx.user_id, location, Some(ctx.conn_id))
        .await?;
    debug!(changed = outcome.changed_points.len(), "location processed");
    Ok(())
}

async fn handle_refresh(ctx: &ConnCtx) -> Result<(), LiveError> {
    ctx.runtime.refresh_assignments(&ctx.user_id).await?;
    ctx.runtime
        .send_game_data(&ctx.user_id, &Delivery::Connections(vec![ctx.conn_id]))
        .await?;
    Ok(())
}

async fn handle_visible_points(ctx: &ConnCtx) -> Result<(), LiveError> {
    let points = ctx.runtime.visible_points(&ctx.user_id).await?;
    let message = Notification::VisiblePoints {
        game: ctx.runtime.game_id().clone(),
        points,
    };
    if let Err(e) = ctx.hub.send_to_connection(ctx.conn_id, &message) {
        debug!(error = %e, "visible points not delivered");
    }
    Ok(())
}

async fn handle_remove_point(ctx: &ConnCtx, point: &str) -> Result<(), LiveError> {
    let point = PointId::parse(point)?;
    if !ctx.runtime.destroy_point(&ctx.user_id, &point).await? {
        reply_error(ctx, format!("point {point} not found"));
    }
    Ok(())
}
