//! Domain events and the canvas event listener.
//!
//! The canvas publishes named events (`UnitWithTypeDestroyed`,
//! `AllUnitsDestroyed`, ...) into an [`EventQueue`]. Events may carry a
//! delivery delay in ticks. [`CanvasEventListener`] reacts to the events the
//! canvas itself cares about (game over detection) and to user-defined
//! [`Condition`]s restored from the savegame.

use crate::components::{ItemId, Vec3};
use crate::player::{PlayerId, Players};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub data1: String,
    pub data2: String,
    pub player_id: Option<PlayerId>,
    pub unit_id: Option<ItemId>,
    pub location: Option<Vec3>,
    /// Ticks before the event is delivered.
    pub delayed_delivery: u32,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data1: String::new(),
            data2: String::new(),
            player_id: None,
            unit_id: None,
            location: None,
            delayed_delivery: 0,
        }
    }

    pub fn with_data1(mut self, data: impl Into<String>) -> Self {
        self.data1 = data.into();
        self
    }

    pub fn with_player(mut self, player: PlayerId) -> Self {
        self.player_id = Some(player);
        self
    }

    pub fn with_unit(mut self, unit: ItemId) -> Self {
        self.unit_id = Some(unit);
        self
    }

    pub fn with_location(mut self, location: Vec3) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_delay(mut self, ticks: u32) -> Self {
        self.delayed_delivery = ticks;
        self
    }
}

/// Events waiting for delivery, in queue order.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_event(&mut self, event: Event) {
        debug!(name = %event.name, delay = event.delayed_delivery, "event queued");
        self.pending.push_back(event);
    }

    /// Advance delivery delays by one tick and take every event that is due.
    pub fn take_due(&mut self) -> Vec<Event> {
        let mut due = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        for mut event in self.pending.drain(..) {
            if event.delayed_delivery == 0 {
                due.push(event);
            } else {
                event.delayed_delivery -= 1;
                waiting.push_back(event);
            }
        }
        self.pending = waiting;
        due
    }

    pub fn pending(&self) -> impl Iterator<Item = &Event> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of queued events called `name`.
    pub fn count(&self, name: &str) -> usize {
        self.pending.iter().filter(|e| e.name == name).count()
    }
}

/// "When event `event_name` (optionally from `player_id`) arrives, queue
/// `action`". Fires at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub event_name: String,
    pub player_id: Option<PlayerId>,
    pub action: String,
    pub fired: bool,
}

impl Condition {
    pub fn new(event_name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            player_id: None,
            action: action.into(),
            fired: false,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        !self.fired
            && self.event_name == event.name
            && (self.player_id.is_none() || self.player_id == event.player_id)
    }
}

/// Canvas-side event handling: game over detection and scripted conditions.
#[derive(Debug, Default)]
pub struct CanvasEventListener {
    conditions: Vec<Condition>,
    game_over: bool,
}

impl CanvasEventListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.conditions = conditions;
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// React to a delivered event. New events go to `queue`.
    pub fn process_event(
        &mut self,
        event: &Event,
        players: &mut Players,
        queue: &mut EventQueue,
        game_over_delay: u32,
    ) {
        match event.name.as_str() {
            "AllUnitsDestroyed" => self.check_game_over_and_end_game(players, queue, game_over_delay),
            "PlayerLost" => match event.player_id.and_then(|id| players.get_mut(id)) {
                Some(player) => {
                    info!(player = %player.id, "player lost");
                    player.has_lost = true;
                    player.has_won = false;
                }
                None => warn!(player = ?event.player_id, "PlayerLost for unknown player"),
            },
            "PlayerWon" => match event.player_id.and_then(|id| players.get_mut(id)) {
                Some(player) => {
                    info!(player = %player.id, "player won");
                    player.has_lost = false;
                    player.has_won = true;
                }
                None => warn!(player = ?event.player_id, "PlayerWon for unknown player"),
            },
            "GameOver" => {
                info!("game over");
                self.game_over = true;
            }
            _ => {}
        }

        for condition in self.conditions.iter_mut().filter(|c| c.matches(event)) {
            condition.fired = true;
            let mut action = Event::new(condition.action.clone());
            action.player_id = event.player_id;
            queue.queue_event(action);
        }
    }

    /// At most one active player with units left ends the game. Returns the
    /// winner, if there is one.
    pub fn check_game_over(players: &Players) -> Option<Option<PlayerId>> {
        let with_units: Vec<PlayerId> = players
            .active()
            .filter(|p| p.has_units())
            .map(|p| p.id)
            .collect();
        if with_units.len() <= 1 {
            Some(with_units.first().copied())
        } else {
            None
        }
    }

    fn check_game_over_and_end_game(
        &mut self,
        players: &Players,
        queue: &mut EventQueue,
        game_over_delay: u32,
    ) {
        let Some(winner) = Self::check_game_over(players) else {
            return;
        };
        for player in players.active() {
            let name = if Some(player.id) == winner {
                "PlayerWon"
            } else {
                "PlayerLost"
            };
            queue.queue_event(Event::new(name).with_player(player.id));
        }
        // Fade-out so the last explosions are still shown.
        queue.queue_event(Event::new("GameOver").with_delay(game_over_delay));
    }
}
