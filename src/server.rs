//! Async lobby: one tick task per room
//!
//! A room task owns its `Room` outright. Commands from player sessions arrive
//! on an mpsc channel and are applied between ticks, so a deploy always lands
//! against a consistent state. Outbound events are serialized to JSON once
//! and fanned out to the seated players.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};

use crate::error::RoomError;
use crate::room::{ConnId, Outbound, Recipient, Room, RoomEvent};
use crate::settings::Settings;
use crate::sim::{CardCatalog, Deployed, Side};

/// How many times a join retries when it races a room teardown
const JOIN_ATTEMPTS: usize = 3;

enum Command {
    Join {
        conn: ConnId,
        outbox: mpsc::UnboundedSender<String>,
        reply: oneshot::Sender<Result<Side, RoomError>>,
    },
    Deploy {
        conn: ConnId,
        card_id: String,
        x: f32,
        z: f32,
        reply: oneshot::Sender<Result<Deployed, RoomError>>,
    },
    Leave {
        conn: ConnId,
    },
}

#[derive(Clone)]
struct RoomHandle {
    serial: u64,
    commands: mpsc::UnboundedSender<Command>,
}

type Rooms = Arc<Mutex<HashMap<String, RoomHandle>>>;

/// Room registry shared by every connection
#[derive(Clone)]
pub struct Lobby {
    settings: Settings,
    catalog: Arc<CardCatalog>,
    rooms: Rooms,
    next_conn: Arc<AtomicU64>,
    next_serial: Arc<AtomicU64>,
}

impl Lobby {
    pub fn new(settings: Settings, catalog: Arc<CardCatalog>) -> Self {
        Self {
            settings,
            catalog,
            rooms: Arc::default(),
            next_conn: Arc::new(AtomicU64::new(1)),
            next_serial: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of rooms with a running task
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Join a room by id, creating it on first use.
    ///
    /// Must be called from inside a tokio runtime.
    pub async fn join_room(&self, room_id: &str) -> Result<PlayerSession, RoomError> {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let mut last_err = RoomError::Closed;

        for _ in 0..JOIN_ATTEMPTS {
            let handle = self.room_handle(room_id).await;
            let (outbox, events) = mpsc::unbounded_channel();
            let (reply, response) = oneshot::channel();
            let sent = handle.commands.send(Command::Join {
                conn,
                outbox,
                reply,
            });
            // A dropped reply means the task shut down under us
            let result = match sent {
                Ok(()) => response.await.unwrap_or(Err(RoomError::Closed)),
                Err(_) => Err(RoomError::Closed),
            };
            match result {
                Ok(side) => {
                    return Ok(PlayerSession {
                        conn,
                        side,
                        room_id: room_id.to_string(),
                        commands: handle.commands,
                        events,
                    });
                }
                Err(RoomError::Closed) => {
                    self.forget(room_id, handle.serial).await;
                    last_err = RoomError::Closed;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    async fn room_handle(&self, room_id: &str) -> RoomHandle {
        let mut rooms = self.rooms.lock().await;
        if let Some(handle) = rooms.get(room_id) {
            if !handle.commands.is_closed() {
                return handle.clone();
            }
        }

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let (commands, inbox) = mpsc::unbounded_channel();
        let room = Room::new(room_id, self.settings.clone(), Arc::clone(&self.catalog));
        tokio::spawn(run_room(room, inbox, Arc::clone(&self.rooms), serial));

        let handle = RoomHandle { serial, commands };
        rooms.insert(room_id.to_string(), handle.clone());
        handle
    }

    async fn forget(&self, room_id: &str, serial: u64) {
        let mut rooms = self.rooms.lock().await;
        if rooms.get(room_id).is_some_and(|h| h.serial == serial) {
            rooms.remove(room_id);
        }
    }
}

/// One seated player. Dropping the session disconnects it.
pub struct PlayerSession {
    conn: ConnId,
    side: Side,
    room_id: String,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<String>,
}

impl PlayerSession {
    pub fn conn(&self) -> ConnId {
        self.conn
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next outbound message as sent over the wire
    pub async fn recv_json(&mut self) -> Option<String> {
        self.events.recv().await
    }

    /// Next outbound message, decoded. `None` once the room is gone.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        loop {
            let json = self.events.recv().await?;
            match serde_json::from_str(&json) {
                Ok(event) => return Some(event),
                Err(err) => log::warn!("Dropping undecodable room message: {err}"),
            }
        }
    }

    /// Deploy a card from this player's hand. Rejections are also sent to
    /// this player as an `error` message.
    pub async fn deploy(&self, card_id: &str, x: f32, z: f32) -> Result<Deployed, RoomError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Deploy {
                conn: self.conn,
                card_id: card_id.to_string(),
                x,
                z,
                reply,
            })
            .map_err(|_| RoomError::Closed)?;
        response.await.unwrap_or(Err(RoomError::Closed))
    }

    /// Leave the room. Leaving a running match forfeits it.
    pub fn leave(self) {}
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        // Room may already be gone
        let _ = self.commands.send(Command::Leave { conn: self.conn });
    }
}

struct RoomTask {
    room: Room,
    outboxes: HashMap<ConnId, mpsc::UnboundedSender<String>>,
}

impl RoomTask {
    fn handle(&mut self, command: Command) {
        match command {
            Command::Join {
                conn,
                outbox,
                reply,
            } => match self.room.join(conn) {
                Ok((side, out)) => {
                    self.outboxes.insert(conn, outbox);
                    let _ = reply.send(Ok(side));
                    self.dispatch(out);
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Command::Deploy {
                conn,
                card_id,
                x,
                z,
                reply,
            } => {
                let result = self.room.deploy(conn, &card_id, x, z);
                match &result {
                    Ok(_) => log::debug!(
                        "Room {}: connection {conn} deployed {card_id}",
                        self.room.id()
                    ),
                    Err(err) => {
                        log::debug!(
                            "Room {}: connection {conn} deploy of {card_id} rejected: {err}",
                            self.room.id()
                        );
                        self.send_to(
                            conn,
                            &RoomEvent::Error {
                                message: err.to_string(),
                            },
                        );
                    }
                }
                let _ = reply.send(result);
            }
            Command::Leave { conn } => {
                self.outboxes.remove(&conn);
                // Sessions dropped after a failed join were never seated
                if let Ok(out) = self.room.leave(conn) {
                    self.dispatch(out);
                }
            }
        }
    }

    fn dispatch(&mut self, out: Vec<Outbound>) {
        for Outbound { to, event } in out {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    log::error!("Room {}: failed to encode event: {err}", self.room.id());
                    continue;
                }
            };
            for (&conn, outbox) in &self.outboxes {
                let wanted = match to {
                    Recipient::All => true,
                    Recipient::Player(side) => self.room.side_of(conn) == Some(side),
                };
                if wanted {
                    // A closed outbox is a session mid-drop; its Leave is queued
                    let _ = outbox.send(json.clone());
                }
            }
        }
    }

    fn send_to(&self, conn: ConnId, event: &RoomEvent) {
        let Some(outbox) = self.outboxes.get(&conn) else {
            return;
        };
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = outbox.send(json);
            }
            Err(err) => log::error!("Room {}: failed to encode event: {err}", self.room.id()),
        }
    }
}

async fn run_room(
    room: Room,
    mut commands: mpsc::UnboundedReceiver<Command>,
    rooms: Rooms,
    serial: u64,
) {
    let period = Duration::from_secs_f64(1.0 / f64::from(room.settings().tick_rate));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut task = RoomTask {
        room,
        outboxes: HashMap::new(),
    };

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let out = task.room.advance();
                task.dispatch(out);
            }
            Some(command) = commands.recv() => task.handle(command),
        }
        if task.room.is_closed() {
            break;
        }
    }

    let id = task.room.id().to_string();
    {
        let mut rooms = rooms.lock().await;
        if rooms.get(&id).is_some_and(|h| h.serial == serial) {
            rooms.remove(&id);
        }
    }
    log::info!("Room {id} task stopped");
}
