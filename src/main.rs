//! Tower Duel entry point
//!
//! Runs a headless bot-vs-bot match through the room server and logs the
//! result. Usage: `tower-duel [settings.json] [cards.json]`

use std::path::PathBuf;
use std::sync::Arc;

use tower_duel::room::RoomEvent;
use tower_duel::server::{Lobby, PlayerSession};
use tower_duel::sim::{CardCatalog, CardKind, EndReason, Side, StateSnapshot, TickSnapshot};
use tower_duel::Settings;

/// Where bots drop troops, measured back from the river on their own bank
const DEPLOY_DEPTH: f32 = 8.0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1).map(PathBuf::from);
    let settings = Settings::load(args.next().as_deref())?;
    let catalog = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            log::info!("Loaded cards from {}", path.display());
            CardCatalog::from_json(&json, settings.elixir.max)?
        }
        None => CardCatalog::default(),
    };
    let catalog = Arc::new(catalog);
    let tick_rate = u64::from(settings.tick_rate);

    let lobby = Lobby::new(settings, Arc::clone(&catalog));
    let mut bots = Vec::new();
    for _ in Side::BOTH {
        let session = lobby.join_room("demo").await?;
        bots.push(tokio::spawn(play(session, Arc::clone(&catalog), tick_rate)));
    }

    for bot in bots {
        match bot.await {
            Ok(Some((side, winner, reason))) if side == winner => {
                log::info!("Player {} wins ({})", winner.number(), reason.as_str());
            }
            Ok(_) => {}
            Err(err) => log::error!("Bot task failed: {err}"),
        }
    }
    Ok(())
}

/// Play until the match ends. Returns the bot's side, the winner and why.
async fn play(
    mut session: PlayerSession,
    catalog: Arc<CardCatalog>,
    tick_rate: u64,
) -> Option<(Side, Side, EndReason)> {
    let side = session.side();
    let mut lane = 0usize;

    while let Some(event) = session.recv().await {
        match event {
            RoomEvent::Tick(TickSnapshot { tick, state, .. }) if tick % tick_rate == 0 => {
                let Some((card_id, x, z)) = choose(side, &state, &catalog, lane) else {
                    continue;
                };
                match session.deploy(&card_id, x, z).await {
                    Ok(_) => {
                        log::debug!("Bot {} played {card_id} at ({x:.1}, {z:.1})", side.number());
                        lane += 1;
                    }
                    Err(err) => log::debug!(
                        "Bot {} could not play {card_id}: {err}",
                        side.number()
                    ),
                }
            }
            RoomEvent::SuddenDeath => log::info!("Bot {} entering sudden death", side.number()),
            RoomEvent::GameOver {
                winner,
                reason,
                final_state,
            } => {
                let towers = if side == Side::One {
                    &final_state.towers.player1
                } else {
                    &final_state.towers.player2
                };
                log::info!(
                    "Bot {} finished with towers at {:.0}/{:.0}/{:.0}",
                    side.number(),
                    towers.left.health,
                    towers.main.health,
                    towers.right.health
                );
                return Some((side, winner, reason));
            }
            _ => {}
        }
    }
    None
}

/// First affordable card in hand and where to put it
fn choose(
    side: Side,
    state: &StateSnapshot,
    catalog: &CardCatalog,
    lane: usize,
) -> Option<(String, f32, f32)> {
    let me = if side == Side::One {
        &state.players.one
    } else {
        &state.players.two
    };
    let card = me
        .hand
        .iter()
        .filter_map(|id| catalog.get(id))
        .find(|card| card.cost as f32 <= me.elixir)?;

    let left_lane = lane % 2 == 0;
    let (x, z) = match &card.kind {
        CardKind::Spell(_) => {
            let enemy = if side == Side::One {
                &state.towers.player2
            } else {
                &state.towers.player1
            };
            let tower = if left_lane { &enemy.left } else { &enemy.right };
            let tower = if tower.health > 0.0 {
                tower
            } else {
                &enemy.main
            };
            (tower.position.x, tower.position.z)
        }
        CardKind::Troop { .. } | CardKind::Building { .. } => {
            let x = if left_lane { -5.5 } else { 5.5 };
            (x, -side.forward() * DEPLOY_DEPTH)
        }
    };
    Some((card.id.clone(), x, z))
}
