use serde::Serialize;
use strum_macros::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum GamePhase {
    /// One marble at a time until a marble lands in a cup
    Single,
    /// The closing burst of marbles, no further scoring
    Final,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBoard {
    pub phase: GamePhase,
    pub score: u32,
    pub marbles_spawned: u32,
    /// Left the play area
    pub marbles_lost: u32,
    /// Dropped into a wastebasket
    pub marbles_wasted: u32,
}

impl Default for ScoreBoard {
    fn default() -> Self {
        ScoreBoard {
            phase: GamePhase::Single,
            score: 0,
            marbles_spawned: 0,
            marbles_lost: 0,
            marbles_wasted: 0,
        }
    }
}

impl ScoreBoard {
    pub fn new() -> ScoreBoard {
        ScoreBoard::default()
    }

    /// A marble entered a cup sensor. Only the first entry counts: it scores and switches the
    /// game to the final phase. Returns whether anything changed.
    pub fn on_cup_entry(&mut self) -> bool {
        match self.phase {
            GamePhase::Single => {
                self.score += 1;
                self.phase = GamePhase::Final;
                info!("Marble in cup, score {}, entering final phase", self.score);
                true
            }
            GamePhase::Final => false,
        }
    }

    pub fn on_spawn(&mut self) {
        self.marbles_spawned += 1;
    }

    pub fn on_lost(&mut self) {
        self.marbles_lost += 1;
    }

    pub fn on_wasted(&mut self) {
        self.marbles_wasted += 1;
    }

    pub fn reset(&mut self) {
        *self = ScoreBoard::default();
    }
}
