//! Match room: two seats, one engine and the phase clock
//!
//! The room is driven by `advance`, called once per simulation tick by its
//! owner. Every phase deadline is a tick count, so the phase clock can
//! never drift from the simulation clock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RoomError;
use crate::settings::Settings;
use crate::sim::{
    CardCatalog, Deployed, EndReason, GameEngine, GameOver, Side, StateSnapshot, TickSnapshot,
};

/// Connection identifier assigned by the transport
pub type ConnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    Waiting,
    Countdown,
    Playing,
    SuddenDeath,
    Finished,
}

/// Messages a room produces for its players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RoomEvent {
    RoomJoined {
        room_id: String,
        player_number: Side,
    },
    Countdown { count: u32 },
    GameStart { state: StateSnapshot },
    Tick(TickSnapshot),
    SuddenDeath,
    GameOver {
        winner: Side,
        reason: EndReason,
        final_state: StateSnapshot,
    },
    Error { message: String },
    PlayerLeft { player_number: Side },
}

/// Who receives an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Player(Side),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Recipient,
    pub event: RoomEvent,
}

impl Outbound {
    fn all(event: RoomEvent) -> Self {
        Self {
            to: Recipient::All,
            event,
        }
    }

    fn player(side: Side, event: RoomEvent) -> Self {
        Self {
            to: Recipient::Player(side),
            event,
        }
    }
}

/// One two-player match room
#[derive(Debug)]
pub struct Room {
    id: String,
    settings: Settings,
    catalog: Arc<CardCatalog>,
    phase: RoomPhase,
    seats: [Option<ConnId>; 2],
    engine: Option<GameEngine>,
    /// Ticks spent in the current phase
    phase_ticks: u64,
    /// Ticks since the match started
    match_ticks: u64,
    countdown_left: u32,
    /// Ticks spent with nobody seated
    idle_ticks: u64,
    closed: bool,
}

impl Room {
    pub fn new(id: impl Into<String>, settings: Settings, catalog: Arc<CardCatalog>) -> Self {
        let id = id.into();
        log::info!("Room {id} created");
        Self {
            id,
            settings,
            catalog,
            phase: RoomPhase::Waiting,
            seats: [None, None],
            engine: None,
            phase_ticks: 0,
            match_ticks: 0,
            countdown_left: 0,
            idle_ticks: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn engine(&self) -> Option<&GameEngine> {
        self.engine.as_ref()
    }

    pub fn player_count(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    pub fn side_of(&self, conn: ConnId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.seats[side.index()] == Some(conn))
    }

    /// Seconds since the match started
    pub fn elapsed(&self) -> f32 {
        self.match_ticks as f32 * self.settings.dt()
    }

    /// Double elixir covers the last stretch of normal time and all of sudden death
    pub fn is_double_elixir(&self) -> bool {
        let window_start = self.settings.match_duration - self.settings.double_elixir_window;
        let from = self.settings.secs_to_ticks(window_start);
        matches!(self.phase, RoomPhase::Playing | RoomPhase::SuddenDeath)
            && self.match_ticks >= from
    }

    /// Seat a connection. Player one is seated first.
    pub fn join(&mut self, conn: ConnId) -> Result<(Side, Vec<Outbound>), RoomError> {
        if self.closed {
            return Err(RoomError::Closed);
        }
        if let Some(side) = self.side_of(conn) {
            return Ok((side, Vec::new()));
        }
        if self.phase != RoomPhase::Waiting {
            return Err(RoomError::RoomFull);
        }
        let side = Side::BOTH
            .into_iter()
            .find(|side| self.seats[side.index()].is_none())
            .ok_or(RoomError::RoomFull)?;
        self.seats[side.index()] = Some(conn);
        self.idle_ticks = 0;
        log::info!(
            "Room {}: connection {conn} joined as player {}",
            self.id,
            side.number()
        );

        let mut out = vec![Outbound::player(
            side,
            RoomEvent::RoomJoined {
                room_id: self.id.clone(),
                player_number: side,
            },
        )];
        if self.player_count() == 2 {
            self.start_countdown(&mut out);
        }
        Ok((side, out))
    }

    /// Remove a connection. Leaving a running match forfeits it.
    pub fn leave(&mut self, conn: ConnId) -> Result<Vec<Outbound>, RoomError> {
        let side = self.side_of(conn).ok_or(RoomError::NotInRoom)?;
        self.seats[side.index()] = None;
        log::info!("Room {}: player {} left", self.id, side.number());

        let mut out = vec![Outbound::all(RoomEvent::PlayerLeft {
            player_number: side,
        })];
        match self.phase {
            RoomPhase::Countdown => {
                log::info!("Room {}: countdown aborted", self.id);
                self.enter(RoomPhase::Waiting);
            }
            RoomPhase::Playing | RoomPhase::SuddenDeath => {
                self.end(
                    GameOver {
                        winner: side.opponent(),
                        reason: EndReason::OpponentLeft,
                    },
                    &mut out,
                );
            }
            RoomPhase::Waiting | RoomPhase::Finished => {}
        }
        Ok(out)
    }

    /// Apply a deploy immediately against the current state
    pub fn deploy(
        &mut self,
        conn: ConnId,
        card_id: &str,
        x: f32,
        z: f32,
    ) -> Result<Deployed, RoomError> {
        let side = self.side_of(conn).ok_or(RoomError::NotInRoom)?;
        if !matches!(self.phase, RoomPhase::Playing | RoomPhase::SuddenDeath) {
            return Err(RoomError::NotInGame);
        }
        let engine = self.engine.as_mut().ok_or(RoomError::NotInGame)?;
        Ok(engine.deploy_card(side, card_id, x, z)?)
    }

    /// Advance the room by one tick
    pub fn advance(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        if self.closed {
            return out;
        }
        self.phase_ticks += 1;
        match self.phase {
            RoomPhase::Waiting => {
                if self.player_count() == 0 {
                    self.idle_ticks += 1;
                    if self.idle_ticks >= self.settings.secs_to_ticks(self.settings.idle_timeout) {
                        log::info!("Room {} idle, closing", self.id);
                        self.close();
                    }
                }
            }
            RoomPhase::Countdown => {
                if self.phase_ticks % self.settings.tick_rate as u64 == 0 {
                    self.countdown_left = self.countdown_left.saturating_sub(1);
                    if self.countdown_left == 0 {
                        self.start_match(&mut out);
                    } else {
                        out.push(Outbound::all(RoomEvent::Countdown {
                            count: self.countdown_left,
                        }));
                    }
                }
            }
            RoomPhase::Playing | RoomPhase::SuddenDeath => self.step(&mut out),
            RoomPhase::Finished => {
                if self.phase_ticks >= self.settings.secs_to_ticks(self.settings.finished_grace) {
                    log::info!("Room {} torn down", self.id);
                    self.close();
                }
            }
        }
        out
    }

    fn enter(&mut self, phase: RoomPhase) {
        log::debug!("Room {}: {:?} -> {:?}", self.id, self.phase, phase);
        self.phase = phase;
        self.phase_ticks = 0;
    }

    fn close(&mut self) {
        self.closed = true;
        self.engine = None;
    }

    fn start_countdown(&mut self, out: &mut Vec<Outbound>) {
        self.enter(RoomPhase::Countdown);
        self.countdown_left = self.settings.countdown_secs;
        if self.countdown_left == 0 {
            self.start_match(out);
            return;
        }
        log::info!("Room {}: countdown started", self.id);
        out.push(Outbound::all(RoomEvent::Countdown {
            count: self.countdown_left,
        }));
    }

    fn start_match(&mut self, out: &mut Vec<Outbound>) {
        let engine = match GameEngine::new(self.settings.clone(), Arc::clone(&self.catalog)) {
            Ok(engine) => engine,
            Err(err) => {
                // Settings were validated at load time
                log::error!("Room {}: cannot start match: {err}", self.id);
                out.push(Outbound::all(RoomEvent::Error {
                    message: err.to_string(),
                }));
                self.close();
                return;
            }
        };
        out.push(Outbound::all(RoomEvent::GameStart {
            state: engine.get_state(),
        }));
        self.engine = Some(engine);
        self.match_ticks = 0;
        self.enter(RoomPhase::Playing);
        log::info!("Room {}: match started", self.id);
    }

    /// One simulation tick plus the match clock checks
    fn step(&mut self, out: &mut Vec<Outbound>) {
        let double = {
            self.match_ticks += 1;
            self.is_double_elixir()
        };
        let elapsed = self.elapsed();
        let Some(engine) = self.engine.as_mut() else {
            debug_assert!(false, "running phase without an engine");
            log::warn!("Room {}: no engine in phase {:?}", self.id, self.phase);
            return;
        };

        let result = engine.update(double);
        out.push(Outbound::all(RoomEvent::Tick(TickSnapshot {
            tick: engine.tick(),
            elapsed,
            is_double_elixir: double,
            state: engine.get_state(),
        })));
        if let Some(over) = result {
            self.end(over, out);
            return;
        }

        let normal = self.settings.secs_to_ticks(self.settings.match_duration);
        let overtime = self
            .settings
            .secs_to_ticks(self.settings.sudden_death_duration);
        match self.phase {
            RoomPhase::Playing if self.match_ticks >= normal => {
                let one = engine.towers_standing(Side::One);
                let two = engine.towers_standing(Side::Two);
                if one != two {
                    let winner = if one > two { Side::One } else { Side::Two };
                    self.end(
                        GameOver {
                            winner,
                            reason: EndReason::TowerCount,
                        },
                        out,
                    );
                } else {
                    log::info!("Room {}: sudden death", self.id);
                    self.enter(RoomPhase::SuddenDeath);
                    out.push(Outbound::all(RoomEvent::SuddenDeath));
                }
            }
            RoomPhase::SuddenDeath if self.match_ticks >= normal + overtime => {
                let winner = engine.tiebreak_winner();
                self.end(
                    GameOver {
                        winner,
                        reason: EndReason::Tiebreak,
                    },
                    out,
                );
            }
            _ => {}
        }
    }

    fn end(&mut self, over: GameOver, out: &mut Vec<Outbound>) {
        let Some(engine) = self.engine.as_mut() else {
            self.enter(RoomPhase::Finished);
            return;
        };
        let over = engine.finish(over);
        out.push(Outbound::all(RoomEvent::GameOver {
            winner: over.winner,
            reason: over.reason,
            final_state: engine.get_state(),
        }));
        log::info!(
            "Room {}: player {} wins ({})",
            self.id,
            over.winner.number(),
            over.reason.as_str()
        );
        self.enter(RoomPhase::Finished);
    }

    #[cfg(test)]
    pub(crate) fn engine_mut(&mut self) -> Option<&mut GameEngine> {
        self.engine.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeployError;
    use crate::sim::TowerSlot;

    fn quick_settings() -> Settings {
        Settings {
            match_duration: 2.0,
            double_elixir_window: 1.0,
            sudden_death_duration: 1.0,
            finished_grace: 0.5,
            idle_timeout: 1.0,
            ..Settings::default()
        }
    }

    fn room(settings: Settings) -> Room {
        Room::new("test", settings, Arc::new(CardCatalog::default()))
    }

    fn events(out: &[Outbound]) -> Vec<&RoomEvent> {
        out.iter().map(|o| &o.event).collect()
    }

    /// Two players seated and the countdown run out
    fn playing(settings: Settings) -> Room {
        let mut room = room(settings);
        room.join(1).unwrap();
        room.join(2).unwrap();
        let ticks = room.settings.tick_rate as u64 * room.settings.countdown_secs as u64;
        for _ in 0..ticks {
            room.advance();
        }
        assert_eq!(room.phase(), RoomPhase::Playing);
        room
    }

    /// Advance until something other than a tick snapshot comes out
    fn run_until_event(room: &mut Room, limit: usize) -> Vec<RoomEvent> {
        for _ in 0..limit {
            let out = room.advance();
            let notable: Vec<RoomEvent> = out
                .into_iter()
                .map(|o| o.event)
                .filter(|e| !matches!(e, RoomEvent::Tick(_)))
                .collect();
            if !notable.is_empty() {
                return notable;
            }
        }
        panic!("no event within {limit} ticks");
    }

    #[test]
    fn seats_two_players_then_counts_down() {
        let mut room = room(Settings::default());
        let (side, out) = room.join(10).unwrap();
        assert_eq!(side, Side::One);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Recipient::Player(Side::One));

        let (side, out) = room.join(20).unwrap();
        assert_eq!(side, Side::Two);
        assert_eq!(
            events(&out),
            vec![
                &RoomEvent::RoomJoined {
                    room_id: "test".into(),
                    player_number: Side::Two,
                },
                &RoomEvent::Countdown { count: 3 },
            ]
        );
        assert_eq!(room.join(30).unwrap_err(), RoomError::RoomFull);
        assert_eq!(room.join(30).unwrap_err().to_string(), "Room is full");

        let mut counts = Vec::new();
        let mut started = false;
        for _ in 0..60 {
            for o in room.advance() {
                match o.event {
                    RoomEvent::Countdown { count } => counts.push(count),
                    RoomEvent::GameStart { .. } => started = true,
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
        assert_eq!(counts, vec![2, 1]);
        assert!(started);
        assert_eq!(room.phase(), RoomPhase::Playing);
    }

    #[test]
    fn deploy_outside_match_is_rejected() {
        let mut room = room(Settings::default());
        assert_eq!(
            room.deploy(1, "knight", 0.0, -8.0).unwrap_err(),
            RoomError::NotInRoom
        );
        room.join(1).unwrap();
        let err = room.deploy(1, "knight", 0.0, -8.0).unwrap_err();
        assert_eq!(err, RoomError::NotInGame);
        assert_eq!(err.to_string(), "Not in a game");
    }

    #[test]
    fn deploy_errors_pass_through() {
        let mut room = playing(Settings::default());
        let err = room.deploy(2, "knight", 0.0, -8.0).unwrap_err();
        assert_eq!(err, RoomError::Deploy(DeployError::InvalidPosition));
        assert_eq!(err.to_string(), "Invalid deploy position");
        assert!(room.deploy(2, "knight", 0.0, 8.0).is_ok());
    }

    #[test]
    fn ticks_are_monotonic_and_double_elixir_kicks_in() {
        let mut room = playing(quick_settings());
        let mut last = 0;
        let mut doubles = Vec::new();
        for _ in 0..30 {
            for o in room.advance() {
                if let RoomEvent::Tick(snap) = o.event {
                    assert!(snap.tick > last);
                    last = snap.tick;
                    doubles.push(snap.is_double_elixir);
                }
            }
        }
        assert_eq!(doubles.len(), 30);
        assert!(!doubles[18]);
        assert!(doubles[19]);
    }

    #[test]
    fn tower_lead_wins_at_time_without_sudden_death() {
        let mut room = playing(quick_settings());
        room.engine_mut()
            .unwrap()
            .field_mut()
            .damage_tower(Side::Two, TowerSlot::Left, 1e6, 0);
        let notable = run_until_event(&mut room, 100);
        let [RoomEvent::GameOver { winner, reason, .. }] = notable.as_slice() else {
            panic!("expected game over, got {notable:?}");
        };
        assert_eq!(*winner, Side::One);
        assert_eq!(*reason, EndReason::TowerCount);
        assert_eq!(room.phase(), RoomPhase::Finished);
        assert_eq!(room.elapsed(), 2.0);
    }

    #[test]
    fn tied_towers_go_to_sudden_death_then_tiebreak() {
        let mut room = playing(quick_settings());
        room.engine_mut()
            .unwrap()
            .field_mut()
            .damage_tower(Side::One, TowerSlot::Left, 100.0, 0);

        let notable = run_until_event(&mut room, 100);
        assert_eq!(notable, vec![RoomEvent::SuddenDeath]);
        assert_eq!(room.phase(), RoomPhase::SuddenDeath);
        assert!(room.is_double_elixir());

        let notable = run_until_event(&mut room, 100);
        let [RoomEvent::GameOver { winner, reason, .. }] = notable.as_slice() else {
            panic!("expected game over, got {notable:?}");
        };
        assert_eq!(*winner, Side::Two);
        assert_eq!(*reason, EndReason::Tiebreak);
        assert_eq!(room.elapsed(), 3.0);
    }

    #[test]
    fn leaving_forfeits_and_room_closes_after_grace() {
        let mut room = playing(quick_settings());
        room.advance();
        let out = room.leave(1).unwrap();
        assert_eq!(
            out[0].event,
            RoomEvent::PlayerLeft {
                player_number: Side::One
            }
        );
        let RoomEvent::GameOver { winner, reason, .. } = &out[1].event else {
            panic!("expected game over");
        };
        assert_eq!(*winner, Side::Two);
        assert_eq!(*reason, EndReason::OpponentLeft);
        assert_eq!(
            room.deploy(2, "knight", 0.0, 8.0).unwrap_err(),
            RoomError::NotInGame
        );
        assert_eq!(room.leave(1).unwrap_err(), RoomError::NotInRoom);

        for _ in 0..9 {
            room.advance();
        }
        assert!(!room.is_closed());
        room.advance();
        assert!(room.is_closed());
        assert!(room.engine().is_none());
    }

    #[test]
    fn leaving_during_countdown_reopens_the_seat() {
        let mut room = room(Settings::default());
        room.join(1).unwrap();
        room.join(2).unwrap();
        room.leave(2).unwrap();
        assert_eq!(room.phase(), RoomPhase::Waiting);
        let (side, _) = room.join(3).unwrap();
        assert_eq!(side, Side::Two);
        assert_eq!(room.phase(), RoomPhase::Countdown);
    }

    #[test]
    fn empty_room_times_out() {
        let mut room = room(quick_settings());
        for _ in 0..19 {
            room.advance();
        }
        assert!(!room.is_closed());
        room.advance();
        assert!(room.is_closed());
        assert_eq!(room.join(1).unwrap_err(), RoomError::Closed);
    }

    #[test]
    fn event_json_uses_kebab_tags() {
        let json = serde_json::to_value(RoomEvent::PlayerLeft {
            player_number: Side::Two,
        })
        .unwrap();
        assert_eq!(json["type"], "player-left");
        assert_eq!(json["playerNumber"], 2);
        let json = serde_json::to_value(RoomEvent::Countdown { count: 2 }).unwrap();
        assert_eq!(json["type"], "countdown");
    }
}
