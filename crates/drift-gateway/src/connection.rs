use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use drift_core::Engine;
use drift_types::events::{ClientCommand, ClientEvent};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket gets to send its Connect command.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on how much of a malformed frame gets logged.
const MAX_LOGGED_FRAME: usize = 200;

/// Clamp a raw frame to a loggable prefix without splitting a character.
fn frame_preview(text: &str) -> &str {
    if text.len() <= MAX_LOGGED_FRAME {
        return text;
    }
    let mut end = MAX_LOGGED_FRAME;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Handle a single WebSocket connection. The first frame must be a
/// `Connect` command declaring mode and interests; after that the client is
/// registered with the engine and the event/command loops run until either
/// side goes away.
pub async fn handle_connection(socket: WebSocket, engine: Engine) {
    let (mut sender, mut receiver) = socket.split();

    let connect = match wait_for_connect(&mut receiver).await {
        Some(cmd) => cmd,
        None => {
            warn!("WebSocket client failed to send Connect, closing");
            return;
        }
    };
    let ClientCommand::Connect { mode, interests } = connect else {
        return;
    };

    let (client_id, event_rx) = engine.connect(mode, interests).await;
    info!("client {} connected to gateway ({:?})", client_id, mode);

    let ready = ClientEvent::Ready { client_id };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        engine.disconnect(client_id).await;
        return;
    }

    run_connection_loop(sender, receiver, engine, client_id, event_rx).await;
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    engine: Engine,
    client_id: Uuid,
    mut event_rx: mpsc::Receiver<ClientEvent>,
) {
    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward engine events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = event_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
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
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let engine_recv = engine.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        if handle_command(&engine_recv, client_id, cmd).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "client {} bad command: {} -- raw: {}",
                            client_id,
                            e,
                            frame_preview(&text)
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

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    engine.disconnect(client_id).await;
    info!("client {} disconnected from gateway", client_id);
}

/// Run one command against the engine. A failed command is pushed back to
/// the client as an `Error` event on its own delivery channel; the socket
/// stays open. Returns true when the client asked to disconnect.
async fn handle_command(engine: &Engine, client_id: Uuid, cmd: ClientCommand) -> bool {
    let result = match cmd {
        ClientCommand::Connect { .. } => {
            // Already handled during the handshake
            Ok(())
        }
        ClientCommand::SetPreferences { mode, interests } => {
            engine.set_preferences(client_id, mode, interests).await
        }
        ClientCommand::FindPartner => engine.enqueue(client_id).await,
        ClientCommand::SendMessage { text } => engine.send_message(client_id, &text).await,
        ClientCommand::SendSignal { envelope } => engine.send_signal(client_id, envelope).await,
        ClientCommand::Skip => engine.skip(client_id).await,
        ClientCommand::Report { reason } => engine.report(client_id, &reason).await,
        ClientCommand::Disconnect => return true,
    };

    if let Err(e) = result {
        info!("client {} command failed: {}", client_id, e);
        // Best effort: if the client's own queue is full or gone there is
        // nowhere left to surface the error anyway.
        let _ = engine
            .push_error(client_id, e.to_string())
            .await;
    }
    false
}

async fn wait_for_connect(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Option<ClientCommand> {
    let timeout = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(cmd @ ClientCommand::Connect { .. }) =
                    serde_json::from_str::<ClientCommand>(&text)
                {
                    return Some(cmd);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}
