use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use huddle_db::Database;
use huddle_types::events::{GatewayCommand, GatewayEvent};
use huddle_types::models::{Feedback, Room};

use crate::binder::{LiveView, Signal};
use crate::dispatcher::Dispatcher;
use crate::session::{self, SessionContext};
use crate::view::load_room_view;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket has to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type WsSender = SplitSink<WebSocket, Message>;

/// Handle a single WebSocket connection: Identify handshake, then the live
/// view loop until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with a session token
    let Some(session) = wait_for_identify(&mut receiver, &db, &jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", session.name, session.profile_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        profile_id: session.profile_id,
        name: session.name.clone(),
        role: session.role,
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, session).await;
}

async fn run_connection_loop(
    mut sender: WsSender,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    session: SessionContext,
) {
    let profile_id = session.profile_id;
    let name = session.name.clone();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<GatewayCommand>();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // The send task owns the views: a personal one for ratings of this
    // user that lives as long as the connection, and the watched room's.
    let mut send_task = tokio::spawn(async move {
        let mut personal = LiveView::personal(&dispatcher, session.profile_id);
        let mut room_view: Option<LiveView> = None;
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    let events = handle_command(&dispatcher, &db, &session, &mut room_view, cmd).await;
                    if send_all(&mut sender, &events).await.is_err() {
                        break;
                    }
                }
                signals = personal.next() => {
                    let Some(signals) = signals else { break };
                    let events: Vec<GatewayEvent> = signals.into_iter().map(to_gateway_event).collect();
                    if send_all(&mut sender, &events).await.is_err() {
                        break;
                    }
                }
                signals = next_room_signals(&mut room_view), if room_view.is_some() => {
                    let Some(signals) = signals else {
                        room_view = None;
                        continue;
                    };
                    let closed = signals.iter().any(|s| matches!(s, Signal::SessionClosed(_)));
                    let events: Vec<GatewayEvent> = signals.into_iter().map(to_gateway_event).collect();
                    if send_all(&mut sender, &events).await.is_err() {
                        break;
                    }
                    if closed {
                        room_view = None;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let name_recv = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if cmd_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            profile_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish. Aborting the send task drops its
    // views, which releases their subscriptions.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", name, profile_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    db: &Arc<Database>,
    jwt_secret: &str,
) -> Option<SessionContext> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return match session::resolve(db.clone(), jwt_secret.to_string(), token).await {
                        Ok(session) => session,
                        Err(e) => {
                            error!("Session lookup failed during identify: {}", e);
                            None
                        }
                    };
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn next_room_signals(room_view: &mut Option<LiveView>) -> Option<Vec<Signal>> {
    match room_view {
        Some(view) => view.next().await,
        None => None,
    }
}

/// Apply one client command to the connection's room view and return what
/// the client should receive. Ratings of the user flow through the personal
/// view, which commands never touch.
async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    session: &SessionContext,
    room_view: &mut Option<LiveView>,
    cmd: GatewayCommand,
) -> Vec<GatewayEvent> {
    match cmd {
        GatewayCommand::Identify { .. } => Vec::new(), // Already handled

        GatewayCommand::WatchRoom { room_id } => {
            // Subscribe before loading; replacing the view releases the
            // previous room's subscription.
            let mut view = LiveView::room_only(dispatcher, session.profile_id, room_id);
            *room_view = None;

            match load_off_runtime(db, dispatcher, room_id).await {
                Ok(Some((room, feedback))) => {
                    info!(
                        "{} ({}) watching room {} ({} watching)",
                        session.name,
                        session.profile_id,
                        room_id,
                        dispatcher.watchers(room_id)
                    );
                    let terminal = room.status.is_terminal();
                    view.load(room.clone(), feedback.clone());

                    let mut events = vec![GatewayEvent::RoomSnapshot { room, feedback }];
                    if terminal {
                        events.push(GatewayEvent::SessionClosed { room_id });
                    } else {
                        *room_view = Some(view);
                    }
                    events
                }
                Ok(None) => vec![GatewayEvent::Error {
                    message: "Room not found".into(),
                }],
                Err(e) => {
                    error!("Failed to load room {} for {}: {}", room_id, session.profile_id, e);
                    vec![GatewayEvent::Error {
                        message: "Could not load room".into(),
                    }]
                }
            }
        }

        GatewayCommand::UnwatchRoom => {
            if let Some(room_id) = room_view.take().and_then(|view| view.room_id()) {
                info!("{} ({}) stopped watching room {}", session.name, session.profile_id, room_id);
            }
            Vec::new()
        }
    }
}

async fn load_off_runtime(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    room_id: Uuid,
) -> anyhow::Result<Option<(Room, Vec<Feedback>)>> {
    let db = db.clone();
    let dispatcher = dispatcher.clone();
    tokio::task::spawn_blocking(move || load_room_view(&db, &dispatcher, room_id)).await?
}

pub fn to_gateway_event(signal: Signal) -> GatewayEvent {
    match signal {
        Signal::RoomChanged(room) => GatewayEvent::RoomUpdated { room },
        Signal::FeedbackAdded(feedback) => GatewayEvent::FeedbackCreated { feedback },
        Signal::Notify(message) => GatewayEvent::Notification { message },
        Signal::ProfileRefresh(points) => GatewayEvent::ProfileRefresh { points },
        Signal::SessionClosed(room_id) => GatewayEvent::SessionClosed { room_id },
    }
}

async fn send_event(sender: &mut WsSender, event: &GatewayEvent) -> anyhow::Result<()> {
    let text = serde_json::to_string(event)?;
    sender.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn send_all(sender: &mut WsSender, events: &[GatewayEvent]) -> anyhow::Result<()> {
    for event in events {
        send_event(sender, event).await?;
    }
    Ok(())
}
